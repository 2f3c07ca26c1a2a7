use std::fmt::Display;

use crate::tiff::TiffError;

#[derive(Debug)]
pub enum GeoTiffError {
    MissingTag(u16),
    /// GeoKeyDirectory present but malformed (short header, bad key entry,
    /// or an index past the double/ascii parameter blocks).
    InvalidGeoKeyDirectory,
    Tiff(TiffError),
}

impl Display for GeoTiffError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeoTiffError::MissingTag(id) => write!(f, "missing required tag {id}"),
            GeoTiffError::InvalidGeoKeyDirectory => write!(f, "invalid geokey directory"),
            GeoTiffError::Tiff(e) => write!(f, "tiff error: {e}"),
        }
    }
}

impl std::error::Error for GeoTiffError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GeoTiffError::Tiff(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TiffError> for GeoTiffError {
    fn from(e: TiffError) -> Self {
        GeoTiffError::Tiff(e)
    }
}
