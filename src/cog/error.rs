use std::fmt::Display;
use std::io;

use crate::geotags::GeoTiffError;
use crate::io::ReadError;
use crate::tiff::TiffError;

pub type CogResult<T> = Result<T, CogError>;

#[derive(Debug)]
pub enum CogError {
    Tiff(TiffError),
    GeoTiff(GeoTiffError),
    Read(ReadError),
    Io(io::Error),
    /// Compression tag carried a code the reader does not implement.
    UnsupportedCompression(u16),
    DecompressionFailed {
        kind: &'static str,
        detail: String,
    },
    /// Decompressor finished but produced fewer bytes than the block needs.
    InsufficientDecompressedData {
        got: usize,
        expected: usize,
    },
    /// IFD carries neither tile nor strip index tags.
    NotTiledNorStripped,
    InvalidOverviewIndex(usize),
    InvalidRegion(String),
    UnsupportedCrs(String),
    /// Read or decode failure attributed to one tile.
    TileFailed {
        index: usize,
        source: Box<CogError>,
    },
    /// Read or decode failure attributed to one strip.
    StripFailed {
        index: usize,
        source: Box<CogError>,
    },
}

impl CogError {
    pub(crate) fn for_tile(index: usize) -> impl FnOnce(CogError) -> CogError {
        move |source| CogError::TileFailed {
            index,
            source: Box::new(source),
        }
    }

    pub(crate) fn for_strip(index: usize) -> impl FnOnce(CogError) -> CogError {
        move |source| CogError::StripFailed {
            index,
            source: Box::new(source),
        }
    }
}

impl Display for CogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CogError::Tiff(e) => write!(f, "tiff error: {e}"),
            CogError::GeoTiff(e) => write!(f, "geotiff error: {e}"),
            CogError::Read(e) => write!(f, "read error: {e}"),
            CogError::Io(e) => write!(f, "io error: {e}"),
            CogError::UnsupportedCompression(code) => {
                write!(f, "unsupported compression type: {code}")
            }
            CogError::DecompressionFailed { kind, detail } => {
                write!(f, "{kind} decompression failed: {detail}")
            }
            CogError::InsufficientDecompressedData { got, expected } => write!(
                f,
                "decompression produced insufficient data: got {got} bytes, expected at least {expected}"
            ),
            CogError::NotTiledNorStripped => {
                write!(f, "image is neither tiled nor stripped")
            }
            CogError::InvalidOverviewIndex(index) => {
                write!(f, "invalid overview index: {index}")
            }
            CogError::InvalidRegion(detail) => write!(f, "invalid region: {detail}"),
            CogError::UnsupportedCrs(crs) => write!(
                f,
                "unsupported CRS: {crs} (only EPSG:4326 and EPSG:3857 are supported)"
            ),
            CogError::TileFailed { index, source } => {
                write!(f, "tile {index} failed: {source}")
            }
            CogError::StripFailed { index, source } => {
                write!(f, "strip {index} failed: {source}")
            }
        }
    }
}

impl std::error::Error for CogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CogError::Tiff(e) => Some(e),
            CogError::GeoTiff(e) => Some(e),
            CogError::Read(e) => Some(e),
            CogError::Io(e) => Some(e),
            CogError::TileFailed { source, .. } => Some(source.as_ref()),
            CogError::StripFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<TiffError> for CogError {
    fn from(e: TiffError) -> Self {
        CogError::Tiff(e)
    }
}

impl From<GeoTiffError> for CogError {
    fn from(e: GeoTiffError) -> Self {
        CogError::GeoTiff(e)
    }
}

impl From<ReadError> for CogError {
    fn from(e: ReadError) -> Self {
        CogError::Read(e)
    }
}

impl From<io::Error> for CogError {
    fn from(e: io::Error) -> Self {
        CogError::Io(e)
    }
}
