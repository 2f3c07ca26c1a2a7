// https://docs.ogc.org/is/19-008r4/19-008r4.html#_geotiff_tags_for_coordinate_transformations

use num_enum::{FromPrimitive, IntoPrimitive};

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum TagId {
    ImageWidth = 256,
    ImageHeight = 257,
    BitsPerSample = 258,
    Compression = 259,
    PhotometricInterpretation = 262,
    StripOffsets = 273,
    SamplesPerPixel = 277,
    RowsPerStrip = 278,
    StripByteCounts = 279,
    PlanarConfiguration = 284,
    Predictor = 317,
    TileWidth = 322,
    TileLength = 323,
    TileOffsets = 324,
    TileByteCounts = 325,
    SampleFormat = 339,
    ModelPixelScale = 33550,
    ModelTiepoint = 33922,
    ModelTransformation = 34264,
    GeoKeyDirectory = 34735,
    GeoDoubleParams = 34736,
    GeoAsciiParams = 34737,

    #[num_enum(default)]
    Unknown = 0xFFFF,
}

impl TagId {
    /// Offset/byte-count arrays can run to thousands of entries on large
    /// COGs; they are always deferred at parse time and loaded on demand.
    pub fn is_large_array(code: u16) -> bool {
        matches!(
            TagId::from(code),
            TagId::StripOffsets
                | TagId::StripByteCounts
                | TagId::TileOffsets
                | TagId::TileByteCounts
        )
    }
}
