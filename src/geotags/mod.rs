// GeoTIFF post-processing of a parsed IFD: image shape, sample type,
// georeferencing model (tiepoint+scale or affine matrix), and the GeoKey
// directory that carries the CRS.

use std::fmt::Display;

mod error;
mod keys;

pub use error::GeoTiffError;
pub use keys::{GeoKeyDirectory, GeoKeyId, GeoKeyValue};

use num_enum::{FromPrimitive, IntoPrimitive};

use crate::cog::Region;
use crate::io::RangeReader;
use crate::raster::DataType;
use crate::tiff::{Ifd, TagId};

#[derive(Debug, PartialEq, Eq, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum PhotometricInterpretation {
    WhiteIsZero = 0,
    BlackIsZero = 1,
    Rgb = 2,
    Palette = 3,
    TransparencyMask = 4,
    Cmyk = 5,
    YCbCr = 6,

    #[num_enum(default)]
    Unknown = 0xFFFF,
}

/// Georeferencing tie point: a pixel position pinned to a model position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TiePoint {
    pub pixel_x: f64,
    pub pixel_y: f64,
    pub pixel_z: f64,
    pub geo_x: f64,
    pub geo_y: f64,
    pub geo_z: f64,
}

/// Everything a read operation needs to know about one IFD.
#[derive(Debug, Clone)]
pub struct GeoMetadata {
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub data_type: DataType,
    pub photometric: PhotometricInterpretation,
    pub pixel_scale: [f64; 3],
    pub tie_points: Vec<TiePoint>,
    pub transformation: [f64; 16],
    pub geo_keys: GeoKeyDirectory,
    pub geo_double_params: Vec<f64>,
    pub geo_ascii_params: String,
    /// `EPSG:<code>`, or empty when the file carries no CRS keys.
    pub crs: String,
}

impl GeoMetadata {
    /// Extract metadata from one IFD, loading any deferred geo tags on
    /// demand through `reader`.
    pub fn from_ifd(reader: &RangeReader, ifd: &mut Ifd) -> Result<Self, GeoTiffError> {
        let width = ifd
            .value_usize(TagId::ImageWidth)
            .ok_or(GeoTiffError::MissingTag(TagId::ImageWidth.into()))?;
        let height = ifd
            .value_usize(TagId::ImageHeight)
            .ok_or(GeoTiffError::MissingTag(TagId::ImageHeight.into()))?;

        let bands = ifd.value_usize(TagId::SamplesPerPixel).unwrap_or(1);
        let photometric = ifd
            .value_u16(TagId::PhotometricInterpretation)
            .map(PhotometricInterpretation::from)
            .unwrap_or(PhotometricInterpretation::Rgb);

        let bits = first_u16(reader, ifd, TagId::BitsPerSample)?.unwrap_or(8);
        let format = first_u16(reader, ifd, TagId::SampleFormat)?.unwrap_or(1);
        let data_type = DataType::from_bits_and_format(bits, format);

        let mut pixel_scale = [0.0; 3];
        if let Some(values) = f64_values(reader, ifd, TagId::ModelPixelScale)? {
            for (slot, value) in pixel_scale.iter_mut().zip(values) {
                *slot = value;
            }
        }

        let tie_points = f64_values(reader, ifd, TagId::ModelTiepoint)?
            .map(|values| parse_tie_points(&values))
            .unwrap_or_default();

        let mut transformation = [0.0; 16];
        if let Some(values) = f64_values(reader, ifd, TagId::ModelTransformation)? {
            for (slot, value) in transformation.iter_mut().zip(values) {
                *slot = value;
            }
        }

        let geo_double_params = f64_values(reader, ifd, TagId::GeoDoubleParams)?.unwrap_or_default();
        let geo_ascii_params = ifd
            .loaded_tag(reader, TagId::GeoAsciiParams)?
            .and_then(|value| value.as_str())
            .unwrap_or_default()
            .to_string();

        let geo_keys = match ifd.loaded_tag(reader, TagId::GeoKeyDirectory)? {
            Some(value) => {
                let directory = value
                    .as_u16_slice()
                    .ok_or(GeoTiffError::InvalidGeoKeyDirectory)?;
                GeoKeyDirectory::parse(directory, &geo_double_params, &geo_ascii_params)?
            }
            None => GeoKeyDirectory::default(),
        };

        let crs = determine_crs(&geo_keys);

        Ok(Self {
            width,
            height,
            bands,
            data_type,
            photometric,
            pixel_scale,
            tie_points,
            transformation,
            geo_keys,
            geo_double_params,
            geo_ascii_params,
            crs,
        })
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.bands * self.data_type.size_in_bytes()
    }

    fn has_transformation(&self) -> bool {
        self.transformation.iter().any(|&v| v != 0.0)
    }

    /// Map a pixel position to model space. The affine matrix wins when
    /// present; otherwise the first tie point plus pixel scale, with the Y
    /// axis pointing down in pixel space and up in model space.
    pub fn pixel_to_geo(&self, pixel_x: f64, pixel_y: f64) -> (f64, f64) {
        if self.has_transformation() {
            let t = &self.transformation;
            let geo_x = t[0] * pixel_x + t[1] * pixel_y + t[3];
            let geo_y = t[4] * pixel_x + t[5] * pixel_y + t[7];
            return (geo_x, geo_y);
        }

        if let Some(tp) = self.tie_points.first() {
            if self.pixel_scale[0] != 0.0 {
                let geo_x = tp.geo_x + (pixel_x - tp.pixel_x) * self.pixel_scale[0];
                let geo_y = tp.geo_y - (pixel_y - tp.pixel_y) * self.pixel_scale[1];
                return (geo_x, geo_y);
            }
        }

        (0.0, 0.0)
    }

    /// Axis-aligned model-space envelope of the four image corners.
    pub fn bounds(&self) -> Region<f64> {
        if self.width == 0 || self.height == 0 {
            return Region::new(0.0, 0.0, 0.0, 0.0);
        }

        let w = self.width as f64;
        let h = self.height as f64;
        let corners = [
            self.pixel_to_geo(0.0, 0.0),
            self.pixel_to_geo(w, 0.0),
            self.pixel_to_geo(0.0, h),
            self.pixel_to_geo(w, h),
        ];

        let min_x = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
        let min_y = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
        let max_y = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);

        Region::new(min_x, min_y, max_x, max_y)
    }
}

impl Display for GeoMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GeoMetadata({}x{}, {} bands, {:?}, crs: {})",
            self.width,
            self.height,
            self.bands,
            self.data_type,
            if self.crs.is_empty() { "none" } else { &self.crs }
        )
    }
}

fn first_u16(
    reader: &RangeReader,
    ifd: &mut Ifd,
    id: TagId,
) -> Result<Option<u16>, GeoTiffError> {
    Ok(ifd
        .loaded_tag(reader, id)?
        .and_then(|value| value.as_u64())
        .map(|v| v as u16))
}

fn f64_values(
    reader: &RangeReader,
    ifd: &mut Ifd,
    id: TagId,
) -> Result<Option<Vec<f64>>, GeoTiffError> {
    Ok(ifd.loaded_tag(reader, id)?.and_then(|value| value.to_f64_vec()))
}

fn parse_tie_points(values: &[f64]) -> Vec<TiePoint> {
    values
        .chunks_exact(6)
        .map(|c| TiePoint {
            pixel_x: c[0],
            pixel_y: c[1],
            pixel_z: c[2],
            geo_x: c[3],
            geo_y: c[4],
            geo_z: c[5],
        })
        .collect()
}

/// ProjectedCSTypeGeoKey wins over GeographicTypeGeoKey; zero codes are
/// treated as unset.
fn determine_crs(keys: &GeoKeyDirectory) -> String {
    if let Some(code) = keys.epsg_code(GeoKeyId::ProjectedCSTypeGeoKey) {
        return format!("EPSG:{code}");
    }
    if let Some(code) = keys.epsg_code(GeoKeyId::GeographicTypeGeoKey) {
        return format!("EPSG:{code}");
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scaled_metadata() -> GeoMetadata {
        GeoMetadata {
            width: 100,
            height: 50,
            bands: 1,
            data_type: DataType::Byte,
            photometric: PhotometricInterpretation::BlackIsZero,
            pixel_scale: [0.1, 0.2, 0.0],
            tie_points: vec![TiePoint {
                pixel_x: 0.0,
                pixel_y: 0.0,
                pixel_z: 0.0,
                geo_x: 10.0,
                geo_y: 60.0,
                geo_z: 0.0,
            }],
            transformation: [0.0; 16],
            geo_keys: GeoKeyDirectory::default(),
            geo_double_params: vec![],
            geo_ascii_params: String::new(),
            crs: String::new(),
        }
    }

    #[test]
    fn tiepoint_scale_transform_inverts_y() {
        let meta = scaled_metadata();
        assert_eq!(meta.pixel_to_geo(0.0, 0.0), (10.0, 60.0));
        assert_eq!(meta.pixel_to_geo(10.0, 10.0), (11.0, 58.0));
    }

    #[test]
    fn matrix_transform_wins_over_tiepoints() {
        let mut meta = scaled_metadata();
        meta.transformation[0] = 2.0;
        meta.transformation[3] = 100.0;
        meta.transformation[5] = -2.0;
        meta.transformation[7] = 500.0;
        assert_eq!(meta.pixel_to_geo(3.0, 4.0), (106.0, 492.0));
    }

    #[test]
    fn bounds_envelope_from_corners() {
        let meta = scaled_metadata();
        let bounds = meta.bounds();
        assert_eq!(bounds.x.min, 10.0);
        assert_eq!(bounds.x.max, 20.0);
        assert_eq!(bounds.y.min, 50.0);
        assert_eq!(bounds.y.max, 60.0);
    }

    #[test]
    fn degenerate_georeferencing_maps_to_origin() {
        let mut meta = scaled_metadata();
        meta.tie_points.clear();
        assert_eq!(meta.pixel_to_geo(5.0, 5.0), (0.0, 0.0));
    }

    #[test]
    fn crs_precedence() {
        let mut keys = GeoKeyDirectory::default();
        keys.keys
            .insert(2048, GeoKeyValue::Short(vec![4326]));
        assert_eq!(determine_crs(&keys), "EPSG:4326");

        keys.keys
            .insert(3072, GeoKeyValue::Short(vec![3857]));
        assert_eq!(determine_crs(&keys), "EPSG:3857");

        let empty = GeoKeyDirectory::default();
        assert_eq!(determine_crs(&empty), "");
    }
}
