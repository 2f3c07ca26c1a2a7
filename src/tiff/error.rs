use std::fmt::Display;
use std::io;

use crate::io::ReadError;

#[derive(Debug)]
pub enum TiffError {
    /// First two header bytes were neither `II` nor `MM`.
    InvalidMagic(u16),
    /// Header version word was not 42.
    InvalidVersion(u16),
    /// The document contained no IFDs.
    NoIfds,
    TagNotFound(u16),
    /// A tag was present but its value could not be decoded as requested.
    BadTagValue(u16),
    Read(ReadError),
}

impl Display for TiffError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TiffError::InvalidMagic(magic) => write!(f, "invalid tiff magic: 0x{magic:04x}"),
            TiffError::InvalidVersion(version) => write!(f, "invalid tiff version: {version}"),
            TiffError::NoIfds => write!(f, "tiff contains no image file directories"),
            TiffError::TagNotFound(id) => write!(f, "tag {id} not found"),
            TiffError::BadTagValue(id) => write!(f, "tag {id} has an unusable value"),
            TiffError::Read(e) => write!(f, "read failed: {e}"),
        }
    }
}

impl std::error::Error for TiffError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TiffError::Read(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ReadError> for TiffError {
    fn from(e: ReadError) -> Self {
        TiffError::Read(e)
    }
}

impl From<io::Error> for TiffError {
    fn from(e: io::Error) -> Self {
        TiffError::Read(ReadError::Io(e))
    }
}
