// Tile/strip engine: fetches and decompresses the blocks covering a pixel
// rectangle in one IFD and assembles them into a dense byte buffer of
// `width * height * bytes_per_pixel`.
//
// Tiled reads with two or more compressed tiles run in three phases:
//   1. compressed bytes are read sequentially through the range reader,
//   2. a per-read worker pool decompresses tiles in parallel (CPU only,
//      workers never touch the reader),
//   3. decoded tiles are blitted into the output in discovery order.
// Phase 1 keeps the reader single-threaded, which is what makes phase 2
// safe to parallelize.

use std::collections::HashMap;

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::debug;

use super::compression::{Block, Codec, Compression};
use super::error::{CogError, CogResult};
use super::geometry::Rect;
use crate::geotags::GeoMetadata;
use crate::io::RangeReader;
use crate::pool;
use crate::tiff::{Ifd, TagId, TiffError};

const DEFAULT_TILE_SIZE: usize = 256;

/// Read the raw (decompressed, undecoded) bytes of `rect` from one IFD.
pub(crate) fn read_pixel_region(
    reader: &RangeReader,
    ifd: &mut Ifd,
    meta: &GeoMetadata,
    rect: Rect,
) -> CogResult<Vec<u8>> {
    if rect.width == 0 || rect.height == 0 {
        return Err(CogError::InvalidRegion(
            "region dimensions must be positive".to_string(),
        ));
    }

    if ifd.has_tag(TagId::TileOffsets) && ifd.has_tag(TagId::TileByteCounts) {
        return read_tiled(reader, ifd, meta, rect);
    }
    if ifd.has_tag(TagId::StripOffsets) && ifd.has_tag(TagId::StripByteCounts) {
        return read_stripped(reader, ifd, meta, rect);
    }
    Err(CogError::NotTiledNorStripped)
}

struct TileJob {
    col: usize,
    row: usize,
    index: usize,
}

fn read_tiled(
    reader: &RangeReader,
    ifd: &mut Ifd,
    meta: &GeoMetadata,
    rect: Rect,
) -> CogResult<Vec<u8>> {
    let compression = Compression::from_code(ifd.value_u16(TagId::Compression).unwrap_or(1))?;
    let tile_width = ifd.value_usize(TagId::TileWidth).unwrap_or(DEFAULT_TILE_SIZE);
    let tile_height = ifd.value_usize(TagId::TileLength).unwrap_or(DEFAULT_TILE_SIZE);
    if tile_width == 0 || tile_height == 0 {
        return Err(CogError::InvalidRegion(
            "tile dimensions must be non-zero".to_string(),
        ));
    }

    ifd.load_tag(reader, TagId::TileOffsets.into())?;
    ifd.load_tag(reader, TagId::TileByteCounts.into())?;
    let offsets = tag_u64_vec(ifd, TagId::TileOffsets)?;
    let byte_counts = tag_u64_vec(ifd, TagId::TileByteCounts)?;

    let tiles_per_row = meta.width.div_ceil(tile_width);
    let bytes_per_pixel = meta.bytes_per_pixel();
    let mut output = vec![0u8; rect.width * rect.height * bytes_per_pixel];

    let codec = Codec {
        compression,
        width: tile_width,
        height: tile_height,
        bands: meta.bands,
        data_type: meta.data_type,
    };

    // Every tile intersecting the rectangle, row-major.
    let mut jobs = vec![];
    for row in rect.y / tile_height..=(rect.y + rect.height - 1) / tile_height {
        for col in rect.x / tile_width..=(rect.x + rect.width - 1) / tile_width {
            let index = row * tiles_per_row + col;
            if index < offsets.len() && index < byte_counts.len() {
                jobs.push(TileJob { col, row, index });
            }
        }
    }
    debug!(
        "tiled read: {}x{} rect, {} tiles, {:?}",
        rect.width,
        rect.height,
        jobs.len(),
        compression
    );

    if jobs.len() <= 1 || compression == Compression::None {
        for job in &jobs {
            let input = fetch_block(reader, offsets[job.index], byte_counts[job.index] as usize)
                .map_err(CogError::for_tile(job.index))?;
            let block = codec.decode(input).map_err(CogError::for_tile(job.index))?;
            blit_tile(
                &block.data,
                &mut output,
                rect,
                job,
                tile_width,
                tile_height,
                bytes_per_pixel,
            );
            block.release();
        }
        return Ok(output);
    }

    // Phase 1: sequential I/O into pooled buffers.
    let mut compressed: Vec<(usize, Vec<u8>)> = Vec::with_capacity(jobs.len());
    for job in &jobs {
        match fetch_block(reader, offsets[job.index], byte_counts[job.index] as usize) {
            Ok(buf) => compressed.push((job.index, buf)),
            Err(e) => {
                for (_, buf) in compressed {
                    pool::release(buf);
                }
                return Err(CogError::for_tile(job.index)(e));
            }
        }
    }

    // Phase 2: parallel decompression on a pool sized to this read.
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let workers = jobs.len().min(cores);
    let thread_pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| CogError::Io(std::io::Error::other(e)))?;
    let results: Vec<(usize, CogResult<Block>)> = thread_pool.install(|| {
        compressed
            .into_par_iter()
            .map(|(index, input)| (index, codec.decode(input)))
            .collect()
    });

    // Phase 3: in-order blits; on failure every remaining block still goes
    // back to its pool.
    let mut failure: Option<CogError> = None;
    for (job, (index, result)) in jobs.iter().zip(results) {
        match result {
            Ok(block) => {
                if failure.is_none() {
                    blit_tile(
                        &block.data,
                        &mut output,
                        rect,
                        job,
                        tile_width,
                        tile_height,
                        bytes_per_pixel,
                    );
                }
                block.release();
            }
            Err(e) => {
                if failure.is_none() {
                    failure = Some(CogError::for_tile(index)(e));
                }
            }
        }
    }
    match failure {
        Some(e) => Err(e),
        None => Ok(output),
    }
}

/// Copy the intersection of one tile with the requested rectangle, row by
/// row. Source and destination offsets are both truncated rather than
/// failed: the last tile row of an image often extends past the pixel data.
fn blit_tile(
    tile_data: &[u8],
    output: &mut [u8],
    rect: Rect,
    job: &TileJob,
    tile_width: usize,
    tile_height: usize,
    bytes_per_pixel: usize,
) {
    let tile_start_x = job.col * tile_width;
    let tile_start_y = job.row * tile_height;

    let copy_start_x = rect.x.max(tile_start_x);
    let copy_start_y = rect.y.max(tile_start_y);
    let copy_end_x = (rect.x + rect.width).min(tile_start_x + tile_width);
    let copy_end_y = (rect.y + rect.height).min(tile_start_y + tile_height);

    if copy_start_x >= copy_end_x || copy_start_y >= copy_end_y {
        return;
    }

    let copy_width = copy_end_x - copy_start_x;
    let tile_offset_x = copy_start_x - tile_start_x;
    let output_offset_x = copy_start_x - rect.x;

    for row in 0..copy_end_y - copy_start_y {
        let tile_row = copy_start_y - tile_start_y + row;
        let src = (tile_row * tile_width + tile_offset_x) * bytes_per_pixel;

        let out_row = copy_start_y - rect.y + row;
        let dst = (out_row * rect.width + output_offset_x) * bytes_per_pixel;

        let mut n = copy_width * bytes_per_pixel;
        if src + n > tile_data.len() {
            if src >= tile_data.len() {
                break;
            }
            n = tile_data.len() - src;
        }
        if dst + n > output.len() {
            if dst >= output.len() {
                break;
            }
            n = output.len() - dst;
        }
        output[dst..dst + n].copy_from_slice(&tile_data[src..src + n]);
    }
}

fn read_stripped(
    reader: &RangeReader,
    ifd: &mut Ifd,
    meta: &GeoMetadata,
    rect: Rect,
) -> CogResult<Vec<u8>> {
    let compression = Compression::from_code(ifd.value_u16(TagId::Compression).unwrap_or(1))?;

    ifd.load_tag(reader, TagId::StripOffsets.into())?;
    ifd.load_tag(reader, TagId::StripByteCounts.into())?;
    let offsets = tag_u64_vec(ifd, TagId::StripOffsets)?;
    let byte_counts = tag_u64_vec(ifd, TagId::StripByteCounts)?;

    let rows_per_strip = ifd
        .value_usize(TagId::RowsPerStrip)
        .unwrap_or(meta.height)
        .max(1);
    let bytes_per_pixel = meta.bytes_per_pixel();
    let bytes_per_row = meta.width * bytes_per_pixel;
    let mut output = vec![0u8; rect.width * rect.height * bytes_per_pixel];

    // Decode each covering strip once; the cache lives for this call only.
    let mut cache: HashMap<usize, Block> = HashMap::new();

    let first_strip = rect.y / rows_per_strip;
    let last_strip = (rect.y + rect.height - 1) / rows_per_strip;
    debug!(
        "stripped read: {}x{} rect, strips {first_strip}..={last_strip}",
        rect.width, rect.height
    );

    for strip in first_strip..=last_strip {
        if strip >= offsets.len() || strip >= byte_counts.len() {
            continue;
        }

        // The final strip covers only the rows that remain.
        let strip_rows = rows_per_strip.min(meta.height.saturating_sub(strip * rows_per_strip));
        let codec = Codec {
            compression,
            width: meta.width,
            height: strip_rows.max(1),
            bands: meta.bands,
            data_type: meta.data_type,
        };

        let block = fetch_block(reader, offsets[strip], byte_counts[strip] as usize)
            .and_then(|input| codec.decode(input));
        match block {
            Ok(block) => {
                cache.insert(strip, block);
            }
            Err(e) => {
                release_cache(cache);
                return Err(CogError::for_strip(strip)(e));
            }
        }
    }

    for row in rect.y..rect.y + rect.height {
        let strip = row / rows_per_strip;
        let Some(block) = cache.get(&strip) else {
            continue;
        };
        let strip_row = row - strip * rows_per_strip;

        let src = strip_row * bytes_per_row + rect.x * bytes_per_pixel;
        let dst = (row - rect.y) * rect.width * bytes_per_pixel;
        let n = rect.width * bytes_per_pixel;

        if src + n <= block.data.len() && dst + n <= output.len() {
            output[dst..dst + n].copy_from_slice(&block.data[src..src + n]);
        }
    }

    release_cache(cache);
    Ok(output)
}

fn release_cache(cache: HashMap<usize, Block>) {
    for (_, block) in cache {
        block.release();
    }
}

/// Read one block's compressed bytes into a pooled buffer.
fn fetch_block(reader: &RangeReader, offset: u64, size: usize) -> CogResult<Vec<u8>> {
    let mut buf = pool::acquire(size);
    match reader.read_exact_at(offset, &mut buf) {
        Ok(()) => Ok(buf),
        Err(e) => {
            pool::release(buf);
            Err(e.into())
        }
    }
}

fn tag_u64_vec(ifd: &Ifd, id: TagId) -> CogResult<Vec<u64>> {
    let tag = ifd.get_tag(id)?;
    tag.value()
        .and_then(|value| value.to_vec::<u64>())
        .ok_or(CogError::Tiff(TiffError::BadTagValue(id.into())))
}

/// Nearest-neighbor resample of packed pixel bytes.
pub(crate) fn resample_nearest(
    data: &[u8],
    src_width: usize,
    src_height: usize,
    dst_width: usize,
    dst_height: usize,
    bytes_per_pixel: usize,
) -> CogResult<Vec<u8>> {
    let src_size = src_width * src_height * bytes_per_pixel;
    if data.len() < src_size {
        return Err(CogError::InsufficientDecompressedData {
            got: data.len(),
            expected: src_size,
        });
    }

    let mut out = vec![0u8; dst_width * dst_height * bytes_per_pixel];
    for y in 0..dst_height {
        let src_y = (y * src_height / dst_height).min(src_height - 1);
        for x in 0..dst_width {
            let src_x = (x * src_width / dst_width).min(src_width - 1);
            let src = (src_y * src_width + src_x) * bytes_per_pixel;
            let dst = (y * dst_width + x) * bytes_per_pixel;
            out[dst..dst + bytes_per_pixel].copy_from_slice(&data[src..src + bytes_per_pixel]);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blit_copies_intersection_rows() {
        // 4x4 tile at grid (0, 0), request covers its lower-right 2x2.
        let tile: Vec<u8> = (0..16).collect();
        let mut output = vec![0u8; 4];
        let rect = Rect::new(2, 2, 2, 2);
        let job = TileJob {
            col: 0,
            row: 0,
            index: 0,
        };
        blit_tile(&tile, &mut output, rect, &job, 4, 4, 1);
        assert_eq!(output, vec![10, 11, 14, 15]);
    }

    #[test]
    fn blit_skips_disjoint_tiles() {
        let tile = vec![7u8; 16];
        let mut output = vec![0u8; 4];
        let rect = Rect::new(0, 0, 2, 2);
        let job = TileJob {
            col: 5,
            row: 5,
            index: 0,
        };
        blit_tile(&tile, &mut output, rect, &job, 4, 4, 1);
        assert_eq!(output, vec![0; 4]);
    }

    #[test]
    fn blit_truncates_short_tile_data() {
        // Tile claims 4x4 but only carries 10 bytes; the copy of its last
        // requested row must shrink instead of panicking.
        let tile: Vec<u8> = (0..10).collect();
        let mut output = vec![0xFFu8; 16];
        let rect = Rect::new(0, 0, 4, 4);
        let job = TileJob {
            col: 0,
            row: 0,
            index: 0,
        };
        blit_tile(&tile, &mut output, rect, &job, 4, 4, 1);
        assert_eq!(&output[..10], &tile[..]);
        assert_eq!(&output[10..], &[0xFF; 6]);
    }

    #[test]
    fn resample_downscale_picks_nearest() {
        // 4x4 grayscale -> 2x2.
        let src: Vec<u8> = (0..16).collect();
        let out = resample_nearest(&src, 4, 4, 2, 2, 1).unwrap();
        assert_eq!(out, vec![0, 2, 8, 10]);
    }

    #[test]
    fn resample_upscale_repeats_pixels() {
        let src = vec![1u8, 2, 3, 4];
        let out = resample_nearest(&src, 2, 2, 4, 4, 1).unwrap();
        assert_eq!(
            out,
            vec![1, 1, 2, 2, 1, 1, 2, 2, 3, 3, 4, 4, 3, 3, 4, 4]
        );
    }

    #[test]
    fn resample_requires_full_source() {
        assert!(matches!(
            resample_nearest(&[1, 2], 2, 2, 1, 1, 1),
            Err(CogError::InsufficientDecompressedData { got: 2, expected: 4 })
        ));
    }

    #[test]
    fn resample_multibyte_pixels_move_together() {
        // 2x1 image, 3 bytes per pixel, upscaled to 4x1.
        let src = vec![1u8, 2, 3, 9, 8, 7];
        let out = resample_nearest(&src, 2, 1, 4, 1, 3).unwrap();
        assert_eq!(out, vec![1, 2, 3, 1, 2, 3, 9, 8, 7, 9, 8, 7]);
    }
}
