// https://docs.ogc.org/is/19-008r4/19-008r4.html#_requirements_class_geokeydirectorytag

use std::collections::HashMap;
use std::fmt::Display;

use num_enum::{FromPrimitive, IntoPrimitive};

use super::GeoTiffError;

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum GeoKeyId {
    GTModelTypeGeoKey = 1024,
    GTRasterTypeGeoKey = 1025,
    GTCitationGeoKey = 1026,
    GeographicTypeGeoKey = 2048,
    GeogCitationGeoKey = 2049,
    GeogGeodeticDatumGeoKey = 2050,
    GeogPrimeMeridianGeoKey = 2051,
    GeogLinearUnitsGeoKey = 2052,
    GeogAngularUnitsGeoKey = 2053,
    GeogSemiMajorAxisGeoKey = 2057,
    GeogSemiMinorAxisGeoKey = 2058,
    GeogInvFlatteningGeoKey = 2059,
    ProjectedCSTypeGeoKey = 3072,
    PCSCitationGeoKey = 3073,
    ProjectionGeoKey = 3074,
    ProjCoordTransGeoKey = 3075,
    ProjLinearUnitsGeoKey = 3076,
    ProjStdParallel1GeoKey = 3078,
    ProjStdParallel2GeoKey = 3079,
    ProjNatOriginLongGeoKey = 3080,
    ProjNatOriginLatGeoKey = 3081,
    ProjFalseEastingGeoKey = 3082,
    ProjFalseNorthingGeoKey = 3083,
    ProjCenterLongGeoKey = 3088,
    ProjCenterLatGeoKey = 3089,
    ProjScaleAtNatOriginGeoKey = 3092,
    VerticalCSTypeGeoKey = 4096,
    VerticalUnitsGeoKey = 4099,

    #[num_enum(default)]
    Unknown = 0xFFFF,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeoKeyValue {
    Short(Vec<u16>),
    Double(Vec<f64>),
    Ascii(String),
}

impl GeoKeyValue {
    pub fn as_u16(&self) -> Option<u16> {
        match self {
            GeoKeyValue::Short(v) => v.first().copied(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            GeoKeyValue::Short(v) => v.first().map(|&x| x as f64),
            GeoKeyValue::Double(v) => v.first().copied(),
            GeoKeyValue::Ascii(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            GeoKeyValue::Ascii(s) => Some(s),
            _ => None,
        }
    }
}

impl Display for GeoKeyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeoKeyValue::Short(v) if v.len() == 1 => write!(f, "{}", v[0]),
            GeoKeyValue::Short(v) => write!(f, "{v:?}"),
            GeoKeyValue::Double(v) if v.len() == 1 => write!(f, "{}", v[0]),
            GeoKeyValue::Double(v) => write!(f, "{v:?}"),
            GeoKeyValue::Ascii(s) => write!(f, "{s}"),
        }
    }
}

/// Parsed GeoKeyDirectory (tag 34735): a small key/value store layered on
/// top of three TIFF tags.
#[derive(Debug, Clone, Default)]
pub struct GeoKeyDirectory {
    pub version: u16,
    pub revision: (u16, u16),
    pub keys: HashMap<u16, GeoKeyValue>,
}

impl GeoKeyDirectory {
    /// Parse the directory shorts. Key values live inline (location 0), in
    /// GeoDoubleParams (34736), or in GeoAsciiParams (34737); ascii entries
    /// exclude their trailing NUL/pipe terminator.
    pub fn parse(
        directory: &[u16],
        double_params: &[f64],
        ascii_params: &str,
    ) -> Result<Self, GeoTiffError> {
        if directory.len() < 4 {
            return Err(GeoTiffError::InvalidGeoKeyDirectory);
        }

        let version = directory[0];
        let revision = (directory[1], directory[2]);
        let key_count = directory[3] as usize;

        if directory.len() < 4 + key_count * 4 {
            return Err(GeoTiffError::InvalidGeoKeyDirectory);
        }

        let mut keys = HashMap::with_capacity(key_count);
        for i in 0..key_count {
            let entry = &directory[4 + i * 4..8 + i * 4];
            let (key_id, location, count, offset) = (entry[0], entry[1], entry[2], entry[3]);

            let value = match location {
                0 => Some(GeoKeyValue::Short(vec![offset])),
                34736 => {
                    let start = offset as usize;
                    let end = start + count as usize;
                    double_params
                        .get(start..end)
                        .map(|slice| GeoKeyValue::Double(slice.to_vec()))
                }
                34737 => {
                    let start = offset as usize;
                    // Count includes the terminator; it is not part of the value.
                    let end = (start + count as usize).saturating_sub(1).min(ascii_params.len());
                    ascii_params.get(start..end).map(|s| {
                        GeoKeyValue::Ascii(s.trim_end_matches(['|', '\0']).to_string())
                    })
                }
                _ => None,
            };

            if let Some(value) = value {
                keys.insert(key_id, value);
            }
        }

        Ok(Self {
            version,
            revision,
            keys,
        })
    }

    pub fn get(&self, id: GeoKeyId) -> Option<&GeoKeyValue> {
        self.keys.get(&u16::from(id))
    }

    /// EPSG code of a CS-type key, treating 0 as absent.
    pub fn epsg_code(&self, id: GeoKeyId) -> Option<u16> {
        match self.get(id).and_then(GeoKeyValue::as_u16) {
            Some(0) | None => None,
            Some(code) => Some(code),
        }
    }
}
