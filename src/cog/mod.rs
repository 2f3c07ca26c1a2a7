use std::time::Duration;

use tracing::debug;

mod compression;
mod decode;
mod error;
mod geometry;
mod maptile;
mod region;

pub use compression::Compression;
pub use error::{CogError, CogResult};
pub use geometry::{Interval, Point2D, Rect, Region};
pub use maptile::{mercator_to_wgs84, wgs84_to_mercator, MapTile, MAX_MERCATOR};

use crate::geotags::GeoMetadata;
use crate::io::{FileSource, HttpSource, RangeReader, ReadRange, DEFAULT_READAHEAD_SIZE};
use crate::pool;
use crate::raster::{DataType, RasterData};
use crate::tiff::Tiff;

const WGS84: &str = "EPSG:4326";
const WEB_MERCATOR: &str = "EPSG:3857";
const DEFAULT_TILE_SIZE: usize = 256;

/// Knobs for [`Cog::open_with`].
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Read-ahead window of the underlying range reader.
    pub readahead_size: usize,
    /// Timeout applied to every HTTP request, HEAD included.
    pub http_timeout: Duration,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            readahead_size: DEFAULT_READAHEAD_SIZE,
            http_timeout: crate::io::http::DEFAULT_HTTP_TIMEOUT,
        }
    }
}

/// An opened Cloud Optimized GeoTIFF.
///
/// Opening parses the TIFF directory chain and the GeoTIFF keys of every
/// IFD, but no pixel data: tile and strip index arrays stay on disk (or on
/// the server) until a read touches them.
pub struct Cog {
    reader: RangeReader,
    tiff: Tiff,
    metadata: Vec<GeoMetadata>,
}

impl Cog {
    /// Open from a local path or an `http(s)://` URL.
    pub fn open(path_or_url: &str) -> CogResult<Self> {
        Self::open_with(path_or_url, OpenOptions::default())
    }

    pub fn open_with(path_or_url: &str, options: OpenOptions) -> CogResult<Self> {
        let source: Box<dyn ReadRange> =
            if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
                Box::new(HttpSource::with_timeout(path_or_url, options.http_timeout)?)
            } else {
                Box::new(FileSource::open(path_or_url)?)
            };
        Self::from_reader(RangeReader::new(source).with_readahead(options.readahead_size))
    }

    /// Open from any range source (e.g. [`crate::io::MemorySource`]).
    pub fn from_source(source: Box<dyn ReadRange>) -> CogResult<Self> {
        Self::from_reader(RangeReader::new(source))
    }

    pub fn from_reader(reader: RangeReader) -> CogResult<Self> {
        let mut tiff = Tiff::open(&reader)?;
        let mut metadata = Vec::with_capacity(tiff.ifd_count());
        for ifd in tiff.ifds.iter_mut() {
            metadata.push(GeoMetadata::from_ifd(&reader, ifd)?);
        }
        debug!(
            "opened cog: {}x{}, {} ifds, crs {:?}",
            metadata[0].width,
            metadata[0].height,
            metadata.len(),
            metadata[0].crs
        );
        Ok(Self {
            reader,
            tiff,
            metadata,
        })
    }

    pub fn width(&self) -> usize {
        self.metadata[0].width
    }

    pub fn height(&self) -> usize {
        self.metadata[0].height
    }

    pub fn bands(&self) -> usize {
        self.metadata[0].bands
    }

    pub fn data_type(&self) -> DataType {
        self.metadata[0].data_type
    }

    /// CRS of the main image as `EPSG:<code>`, or empty when unknown.
    pub fn crs(&self) -> &str {
        &self.metadata[0].crs
    }

    /// Model-space bounds of the main image.
    pub fn bounds(&self) -> Region<f64> {
        self.metadata[0].bounds()
    }

    pub fn ifd_count(&self) -> usize {
        self.metadata.len()
    }

    pub fn overview_count(&self) -> usize {
        self.metadata.len().saturating_sub(1)
    }

    /// Metadata of overview `level`, where 0 is the first (highest
    /// resolution) overview below the main image.
    pub fn overview(&self, level: usize) -> Option<&GeoMetadata> {
        self.metadata.get(level + 1)
    }

    /// Metadata of any IFD; index 0 is the main image.
    pub fn metadata(&self, index: usize) -> Option<&GeoMetadata> {
        self.metadata.get(index)
    }

    /// Parsed TIFF document backing this COG.
    pub fn tiff(&self) -> &Tiff {
        &self.tiff
    }

    /// Read a geographic region from one IFD. `overview` indexes the IFD
    /// chain directly: 0 is the main image, 1 and up are progressively
    /// coarser overviews. The requested bound is attached to the result
    /// verbatim.
    pub fn read_region(&mut self, bound: Region<f64>, overview: usize) -> CogResult<RasterData> {
        let endian = self.tiff.endian;
        let meta = self
            .metadata
            .get(overview)
            .ok_or(CogError::InvalidOverviewIndex(overview))?;
        if meta.width == 0 || meta.height == 0 {
            return Err(CogError::InvalidRegion("image has no extent".to_string()));
        }

        // Min edges clamp inside the image, max edges to its far side, so a
        // full-bounds request covers every pixel.
        let pixels = geo_to_pixel_bounds(bound, meta);
        let min_x = pixels.min_x.clamp(0.0, (meta.width - 1) as f64);
        let max_x = pixels.max_x.clamp(0.0, meta.width as f64);
        let min_y = pixels.min_y.clamp(0.0, (meta.height - 1) as f64);
        let max_y = pixels.max_y.clamp(0.0, meta.height as f64);

        let width = (max_x - min_x).ceil() as i64;
        let height = (max_y - min_y).ceil() as i64;
        if width <= 0 || height <= 0 {
            return Err(CogError::InvalidRegion(
                "region does not intersect the image".to_string(),
            ));
        }
        let rect = Rect::new(min_x as usize, min_y as usize, width as usize, height as usize);

        let ifd = self
            .tiff
            .ifds
            .get_mut(overview)
            .ok_or(CogError::InvalidOverviewIndex(overview))?;
        let raw = region::read_pixel_region(&self.reader, ifd, meta, rect)?;
        let data = decode::decode_to_flat(
            &raw,
            rect.width,
            rect.height,
            meta.bands,
            meta.data_type,
            endian,
            meta.photometric,
        );

        Ok(RasterData {
            data,
            width: rect.width,
            height: rect.height,
            bands: meta.bands,
            bounds: bound,
        })
    }

    /// Read a rectangle given in main-image pixel coordinates, automatically
    /// selecting the overview that minimizes decoded bytes while staying at
    /// or above quarter resolution.
    pub fn read_window(&mut self, rect: Rect) -> CogResult<RasterData> {
        let endian = self.tiff.endian;
        let main = &self.metadata[0];

        if rect.width == 0 || rect.height == 0 {
            return Err(CogError::InvalidRegion(
                "window dimensions must be positive".to_string(),
            ));
        }
        if rect.x + rect.width > main.width {
            return Err(CogError::InvalidRegion(
                "window extends beyond image width".to_string(),
            ));
        }
        if rect.y + rect.height > main.height {
            return Err(CogError::InvalidRegion(
                "window extends beyond image height".to_string(),
            ));
        }

        let overview = self.overview_for_window(rect);
        let meta = &self.metadata[overview];
        debug!(
            "window {}x{} at ({}, {}): reading ifd {overview} ({}x{})",
            rect.width, rect.height, rect.x, rect.y, meta.width, meta.height
        );

        let scale_x = meta.width as f64 / main.width as f64;
        let scale_y = meta.height as f64 / main.height as f64;
        let ov_x = (rect.x as f64 * scale_x) as usize;
        let ov_y = (rect.y as f64 * scale_y) as usize;
        let mut ov_width = (rect.width as f64 * scale_x).ceil() as usize;
        let mut ov_height = (rect.height as f64 * scale_y).ceil() as usize;

        if ov_x + ov_width > meta.width {
            ov_width = meta.width - ov_x;
        }
        if ov_y + ov_height > meta.height {
            ov_height = meta.height - ov_y;
        }
        if ov_width == 0 || ov_height == 0 {
            return Err(CogError::InvalidRegion(
                "window collapsed after scaling to overview".to_string(),
            ));
        }

        // Bounds always come from the main image's georeferencing.
        let (top_left_x, top_left_y) = main.pixel_to_geo(rect.x as f64, rect.y as f64);
        let (bottom_right_x, bottom_right_y) =
            main.pixel_to_geo((rect.x + rect.width) as f64, (rect.y + rect.height) as f64);
        let bounds = Region::new(top_left_x, bottom_right_y, bottom_right_x, top_left_y);

        let ifd = self
            .tiff
            .ifds
            .get_mut(overview)
            .ok_or(CogError::InvalidOverviewIndex(overview))?;
        let raw = region::read_pixel_region(
            &self.reader,
            ifd,
            meta,
            Rect::new(ov_x, ov_y, ov_width, ov_height),
        )?;
        let data = decode::decode_to_flat(
            &raw,
            ov_width,
            ov_height,
            meta.bands,
            meta.data_type,
            endian,
            meta.photometric,
        );

        Ok(RasterData {
            data,
            width: ov_width,
            height: ov_height,
            bands: meta.bands,
            bounds,
        })
    }

    /// IFD index [`Cog::read_window`] would read for `rect`. Exposed so
    /// callers (and tests) can observe overview selection without reading.
    pub fn overview_for_window(&self, rect: Rect) -> usize {
        select_overview(&self.metadata, rect)
    }

    /// Read an XYZ map tile resampled to the default 256x256.
    pub fn read_tile(&mut self, tile: MapTile) -> CogResult<RasterData> {
        self.read_tile_sized(tile, DEFAULT_TILE_SIZE)
    }

    /// Read an XYZ map tile resampled to `size`x`size`. Only images in
    /// EPSG:4326 or EPSG:3857 can serve map tiles.
    pub fn read_tile_sized(&mut self, tile: MapTile, size: usize) -> CogResult<RasterData> {
        let size = if size == 0 { DEFAULT_TILE_SIZE } else { size };
        let endian = self.tiff.endian;

        let crs = self.crs();
        if crs != WGS84 && crs != WEB_MERCATOR {
            return Err(CogError::UnsupportedCrs(crs.to_string()));
        }

        // Tile bounds are WGS84 by definition; project them into the
        // image's CRS when it is Web Mercator.
        let tile_bounds = tile.bounds();
        let geo_bounds = if crs == WEB_MERCATOR {
            wgs84_to_mercator(tile_bounds)
        } else {
            tile_bounds
        };

        let meta = &self.metadata[0];
        if meta.width == 0 || meta.height == 0 {
            return Err(CogError::InvalidRegion("image has no extent".to_string()));
        }
        let pixels = geo_to_pixel_bounds(geo_bounds, meta);
        let min_x = pixels.min_x.clamp(0.0, (meta.width - 1) as f64);
        let max_x = pixels.max_x.clamp(0.0, meta.width as f64);
        let min_y = pixels.min_y.clamp(0.0, (meta.height - 1) as f64);
        let max_y = pixels.max_y.clamp(0.0, meta.height as f64);

        let width = (max_x - min_x).ceil() as i64;
        let height = (max_y - min_y).ceil() as i64;
        if width <= 0 || height <= 0 {
            return Err(CogError::InvalidRegion(
                "tile does not intersect the image".to_string(),
            ));
        }
        let rect = Rect::new(min_x as usize, min_y as usize, width as usize, height as usize);

        let ifd = self
            .tiff
            .ifds
            .get_mut(0)
            .ok_or(CogError::InvalidOverviewIndex(0))?;
        let mut raw = region::read_pixel_region(&self.reader, ifd, meta, rect)?;

        let (mut out_width, mut out_height) = (rect.width, rect.height);
        if out_width != size || out_height != size {
            raw = region::resample_nearest(
                &raw,
                out_width,
                out_height,
                size,
                size,
                meta.bytes_per_pixel(),
            )?;
            out_width = size;
            out_height = size;
        }

        let data = decode::decode_to_flat(
            &raw,
            out_width,
            out_height,
            meta.bands,
            meta.data_type,
            endian,
            meta.photometric,
        );

        Ok(RasterData {
            data,
            width: out_width,
            height: out_height,
            bands: meta.bands,
            bounds: geo_bounds,
        })
    }

    /// Sample every band of the main image at one geographic point.
    pub fn sample(&mut self, x: f64, y: f64) -> CogResult<Vec<u64>> {
        let endian = self.tiff.endian;
        let meta = &self.metadata[0];
        let bounds = meta.bounds();
        if bounds.width() == 0.0 || bounds.height() == 0.0 {
            return Err(CogError::InvalidRegion(
                "image has no georeferencing".to_string(),
            ));
        }
        if !bounds.contains(Point2D { x, y }) {
            return Err(CogError::InvalidRegion(format!(
                "point ({x}, {y}) is outside the image bounds"
            )));
        }

        let pixel_x =
            (((x - bounds.x.min) / bounds.width() * meta.width as f64) as usize).min(meta.width - 1);
        let pixel_y = (((bounds.y.max - y) / bounds.height() * meta.height as f64) as usize)
            .min(meta.height - 1);

        let ifd = self
            .tiff
            .ifds
            .get_mut(0)
            .ok_or(CogError::InvalidOverviewIndex(0))?;
        let raw = region::read_pixel_region(
            &self.reader,
            ifd,
            meta,
            Rect::new(pixel_x, pixel_y, 1, 1),
        )?;

        let mut scratch = pool::acquire_u64(meta.bands);
        decode::decode_into(
            &raw,
            1,
            1,
            meta.bands,
            meta.data_type,
            endian,
            meta.photometric,
            &mut scratch,
        );
        let values = scratch[..meta.bands].to_vec();
        pool::release_u64(scratch);
        Ok(values)
    }

    /// Drop the range reader's read-ahead window.
    pub fn clear_buffer(&self) {
        self.reader.clear_buffer();
    }
}

struct PixelBounds {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

/// Map a model-space bound into fractional pixel coordinates of `meta`,
/// normalizing against the image's own bounds. Pixel Y grows downward.
fn geo_to_pixel_bounds(bound: Region<f64>, meta: &GeoMetadata) -> PixelBounds {
    let image = meta.bounds();
    let geo_width = image.width();
    let geo_height = image.height();
    if geo_width == 0.0 || geo_height == 0.0 {
        return PixelBounds {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 0.0,
            max_y: 0.0,
        };
    }

    PixelBounds {
        min_x: (bound.x.min - image.x.min) / geo_width * meta.width as f64,
        max_x: (bound.x.max - image.x.min) / geo_width * meta.width as f64,
        min_y: (image.y.max - bound.y.max) / geo_height * meta.height as f64,
        max_y: (image.y.max - bound.y.min) / geo_height * meta.height as f64,
    }
}

/// Pick the IFD to serve a main-image window: tiny windows always read the
/// main image, otherwise the cheapest IFD that keeps at least a quarter of
/// the main resolution wins.
fn select_overview(metadata: &[GeoMetadata], rect: Rect) -> usize {
    let main = &metadata[0];
    let main_area = main.width * main.height;
    if main_area == 0 {
        return 0;
    }
    if rect.area() < main_area / 100 {
        return 0;
    }

    let mut best = 0;
    let mut min_cost = f64::INFINITY;
    for (i, meta) in metadata.iter().enumerate() {
        let scale_x = meta.width as f64 / main.width as f64;
        let scale_y = meta.height as f64 / main.height as f64;
        let width = (rect.width as f64 * scale_x).ceil();
        let height = (rect.height as f64 * scale_y).ceil();
        let cost = width * height * meta.bytes_per_pixel() as f64;

        if cost < min_cost {
            let resolution_ratio = (meta.width * meta.height) as f64 / main_area as f64;
            if resolution_ratio >= 0.25 || i == 0 {
                min_cost = cost;
                best = i;
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geotags::{GeoKeyDirectory, PhotometricInterpretation, TiePoint};

    fn meta(width: usize, height: usize) -> GeoMetadata {
        GeoMetadata {
            width,
            height,
            bands: 1,
            data_type: DataType::Byte,
            photometric: PhotometricInterpretation::BlackIsZero,
            pixel_scale: [1.0, 1.0, 0.0],
            tie_points: vec![TiePoint {
                pixel_x: 0.0,
                pixel_y: 0.0,
                pixel_z: 0.0,
                geo_x: 0.0,
                geo_y: height as f64,
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
    fn tiny_windows_read_the_main_image() {
        let levels = vec![meta(10000, 10000), meta(5000, 5000)];
        // 1/100 of the main area is 1,000,000 px; stay below it.
        assert_eq!(select_overview(&levels, Rect::new(0, 0, 900, 900)), 0);
    }

    #[test]
    fn quarter_resolution_floor_rejects_deep_overviews() {
        // Overviews at 1/16 and 1/256 of the main area both fail the 0.25
        // floor, so even large windows stay on the main image.
        let levels = vec![meta(10000, 10000), meta(2500, 2500), meta(625, 625)];
        assert_eq!(select_overview(&levels, Rect::new(0, 0, 1000, 1000)), 0);
        assert_eq!(select_overview(&levels, Rect::new(0, 0, 5000, 5000)), 0);
    }

    #[test]
    fn half_resolution_overview_wins_for_large_windows() {
        let levels = vec![meta(10000, 10000), meta(5000, 5000)];
        assert_eq!(select_overview(&levels, Rect::new(0, 0, 5000, 5000)), 1);
    }

    #[test]
    fn geo_bounds_normalize_into_pixels() {
        // 100x100 image spanning model x [0, 100], y [0, 100].
        let m = meta(100, 100);
        let pixels = geo_to_pixel_bounds(Region::new(25.0, 25.0, 75.0, 75.0), &m);
        assert_eq!(pixels.min_x, 25.0);
        assert_eq!(pixels.max_x, 75.0);
        assert_eq!(pixels.min_y, 25.0);
        assert_eq!(pixels.max_y, 75.0);
    }

    #[test]
    fn degenerate_georeferencing_collapses_pixel_bounds() {
        let mut m = meta(100, 100);
        m.tie_points.clear();
        m.pixel_scale = [0.0; 3];
        let pixels = geo_to_pixel_bounds(Region::new(0.0, 0.0, 1.0, 1.0), &m);
        assert_eq!(pixels.max_x, 0.0);
        assert_eq!(pixels.max_y, 0.0);
    }
}
