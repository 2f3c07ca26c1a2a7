// Block decompression for the tile/strip engine.
//
// Every path that consumes the pooled input buffer releases it before
// returning, and every produced block records which pool its bytes came
// from so the engine can hand them back after the blit.

use std::io::Read;

use image::DynamicImage;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use tracing::warn;
use weezl::{decode::Decoder as LzwDecoder, BitOrder};

use super::error::{CogError, CogResult};
use crate::pool;
use crate::raster::DataType;

#[derive(Debug, PartialEq, Eq, Clone, Copy, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum Compression {
    None = 1,
    Lzw = 5,
    Jpeg = 6,
    Deflate = 8,
}

impl Compression {
    pub fn from_code(code: u16) -> CogResult<Self> {
        Compression::try_from(code).map_err(|_| CogError::UnsupportedCompression(code))
    }
}

/// Where a block's backing buffer must be returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BufKind {
    Slab,
    Growable,
    Heap,
}

/// Decompressed tile or strip bytes, tied to their pool of origin.
#[derive(Debug)]
pub(crate) struct Block {
    pub data: Vec<u8>,
    kind: BufKind,
}

impl Block {
    pub fn release(self) {
        match self.kind {
            BufKind::Slab => pool::release(self.data),
            BufKind::Growable => pool::release_growable(self.data),
            BufKind::Heap => {}
        }
    }
}

/// Per-read decompression context: the block shape determines the expected
/// output size for trim and sufficiency checks.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Codec {
    pub compression: Compression,
    pub width: usize,
    pub height: usize,
    pub bands: usize,
    pub data_type: DataType,
}

impl Codec {
    pub fn expected_size(&self) -> usize {
        self.width * self.height * self.bands * self.data_type.size_in_bytes()
    }

    /// Decompress one block. Takes ownership of the pooled input buffer and
    /// releases it on every path.
    pub fn decode(&self, input: Vec<u8>) -> CogResult<Block> {
        match self.compression {
            Compression::None => Ok(Block {
                data: input,
                kind: BufKind::Slab,
            }),
            Compression::Lzw => self.decode_lzw(input),
            Compression::Deflate => self.decode_deflate(input),
            Compression::Jpeg => self.decode_jpeg(input),
        }
    }

    /// TIFF LZW with bit-order fallback: LSB first, then MSB with the TIFF
    /// early-change quirk. Some writers mislabel uncompressed blocks as LZW;
    /// when both orders fail and the input already has the expected size it
    /// is passed through unchanged.
    fn decode_lzw(&self, input: Vec<u8>) -> CogResult<Block> {
        let expected = self.expected_size();

        let decoded = lzw_try(&input, BitOrder::Lsb).or_else(|lsb_err| {
            warn!("lsb-first lzw decode failed ({lsb_err}), retrying msb-first");
            lzw_try(&input, BitOrder::Msb)
        });

        match decoded {
            Ok(mut data) => {
                pool::release(input);
                if data.len() < expected {
                    let got = data.len();
                    pool::release_growable(data);
                    return Err(CogError::InsufficientDecompressedData { got, expected });
                }
                data.truncate(expected);
                Ok(Block {
                    data,
                    kind: BufKind::Growable,
                })
            }
            Err(detail) => {
                if input.len() == expected {
                    warn!("lzw block matches raw size, treating as uncompressed");
                    return Ok(Block {
                        data: input,
                        kind: BufKind::Slab,
                    });
                }
                let detail = format!(
                    "{detail} (data size: {}, expected: {expected})",
                    input.len()
                );
                pool::release(input);
                Err(CogError::DecompressionFailed {
                    kind: "lzw",
                    detail,
                })
            }
        }
    }

    /// Raw DEFLATE stream, trimmed to the expected block size.
    fn decode_deflate(&self, input: Vec<u8>) -> CogResult<Block> {
        let expected = self.expected_size();
        let mut data = pool::acquire_growable();
        let result = flate2::read::DeflateDecoder::new(&input[..]).read_to_end(&mut data);
        pool::release(input);

        match result {
            Ok(_) => {
                if data.len() < expected {
                    let got = data.len();
                    pool::release_growable(data);
                    return Err(CogError::InsufficientDecompressedData { got, expected });
                }
                data.truncate(expected);
                Ok(Block {
                    data,
                    kind: BufKind::Growable,
                })
            }
            Err(e) => {
                pool::release_growable(data);
                Err(CogError::DecompressionFailed {
                    kind: "deflate",
                    detail: e.to_string(),
                })
            }
        }
    }

    /// Full JPEG image rendered into a block buffer. Grayscale expands
    /// across bands (alpha forced opaque), 8-bit RGB/RGBA copy through, and
    /// anything else converts per pixel from 16-bit components.
    fn decode_jpeg(&self, input: Vec<u8>) -> CogResult<Block> {
        let image = image::load_from_memory_with_format(&input, image::ImageFormat::Jpeg);
        pool::release(input);
        let image = image.map_err(|e| CogError::DecompressionFailed {
            kind: "jpeg",
            detail: e.to_string(),
        })?;

        let width = image.width() as usize;
        let height = image.height() as usize;
        let bpp = self.bands * self.data_type.size_in_bytes();
        let mut data = pool::acquire(width * height * bpp);

        match &image {
            DynamicImage::ImageLuma8(gray) => {
                let pixels = gray.as_raw();
                for (i, &luma) in pixels.iter().enumerate().take(width * height) {
                    let offset = i * bpp;
                    if self.bands >= 3 {
                        data[offset] = luma;
                        data[offset + 1] = luma;
                        data[offset + 2] = luma;
                        if self.bands == 4 {
                            data[offset + 3] = 255;
                        }
                    } else {
                        data[offset] = luma;
                    }
                }
            }
            DynamicImage::ImageRgb8(rgb) if bpp == 3 => {
                data.copy_from_slice(rgb.as_raw());
            }
            DynamicImage::ImageRgba8(rgba) if bpp == 4 => {
                data.copy_from_slice(rgba.as_raw());
            }
            other => {
                let rgba = other.to_rgba16();
                for (i, pixel) in rgba.pixels().enumerate().take(width * height) {
                    let offset = i * bpp;
                    if self.bands >= 3 {
                        data[offset] = (pixel[0] >> 8) as u8;
                        data[offset + 1] = (pixel[1] >> 8) as u8;
                        data[offset + 2] = (pixel[2] >> 8) as u8;
                        if self.bands == 4 {
                            data[offset + 3] = (pixel[3] >> 8) as u8;
                        }
                    } else {
                        data[offset] = (pixel[0] >> 8) as u8;
                    }
                }
            }
        }

        Ok(Block {
            data,
            kind: BufKind::Slab,
        })
    }
}

fn lzw_try(input: &[u8], order: BitOrder) -> Result<Vec<u8>, String> {
    let mut decoder = match order {
        BitOrder::Lsb => LzwDecoder::new(BitOrder::Lsb, 8),
        BitOrder::Msb => LzwDecoder::with_tiff_size_switch(BitOrder::Msb, 8),
    };
    let mut out = pool::acquire_growable();
    let result = decoder.into_stream(&mut out).decode_all(input);
    match result.status {
        Ok(_) => Ok(out),
        Err(e) => {
            pool::release_growable(out);
            Err(e.to_string())
        }
    }
}
