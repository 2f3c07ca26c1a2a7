//! # terracog
//!
//! A pure Rust reader for Cloud Optimized GeoTIFFs (COGs), backed by local
//! files or HTTP range requests.
//!
//! Opening a COG is cheap: the TIFF header, the IFD chain and the GeoTIFF
//! keys are parsed from a handful of small reads, while tile and strip
//! offset arrays stay unread until a pixel request needs them. Reads come
//! in three flavors:
//!
//! - [`Cog::read_region`]: a geographic bound against a chosen IFD,
//! - [`Cog::read_window`]: a main-image pixel rectangle with automatic
//!   overview selection,
//! - [`Cog::read_tile`]: an XYZ map tile, resampled to the tile grid
//!   (EPSG:4326 / EPSG:3857 images only).
//!
//! All three return a [`RasterData`]: a flat `u64` buffer in
//! band-interleaved-by-pixel order, with floats carried as raw bit
//! patterns.
//!
//! ```no_run
//! use terracog::{Cog, MapTile};
//!
//! let mut cog = Cog::open("https://example.com/imagery.tif")?;
//! println!("{}x{}, {} bands, {}", cog.width(), cog.height(), cog.bands(), cog.crs());
//!
//! let tile = cog.read_tile(MapTile::new(163, 395, 10))?;
//! println!("tile pixel 0: {:?}", tile.pixel(0, 0));
//! # Ok::<(), terracog::CogError>(())
//! ```

pub mod cog;
mod geotags;
mod io;
mod pool;
mod raster;
mod tiff;

pub use cog::{
    mercator_to_wgs84, wgs84_to_mercator, Cog, CogError, CogResult, Compression, Interval,
    MapTile, OpenOptions, Point2D, Rect, Region, MAX_MERCATOR,
};
pub use geotags::{
    GeoKeyDirectory, GeoKeyId, GeoKeyValue, GeoMetadata, GeoTiffError, PhotometricInterpretation,
    TiePoint,
};
pub use io::{
    FileSource, HttpSource, MemorySource, RangeReader, ReadError, ReadRange,
    DEFAULT_READAHEAD_SIZE,
};
pub use pool::BufferPool;
pub use raster::{DataType, RasterData};
pub use tiff::{Endian, Ifd, ParseMode, Tag, TagId, TagType, TagValue, Tiff, TiffError};
