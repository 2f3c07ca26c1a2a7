// Raw block bytes -> flat u64 pixel buffer, band-interleaved-by-pixel.
//
// Every sample widens into a u64 slot. Integer types sign- or zero-extend;
// floating point samples keep their raw bit pattern so no precision is lost
// in the widening. Rationals collapse to their integer quotient.

use crate::geotags::PhotometricInterpretation;
use crate::raster::DataType;
use crate::tiff::Endian;

/// Decode `width * height * bands` samples from `data` into `out`.
/// Samples past the end of `data` are left untouched rather than failing,
/// tolerating blocks truncated by upstream writers.
#[allow(clippy::too_many_arguments)]
pub(crate) fn decode_into(
    data: &[u8],
    width: usize,
    height: usize,
    bands: usize,
    data_type: DataType,
    endian: Endian,
    photometric: PhotometricInterpretation,
    out: &mut [u64],
) {
    let bytes_per_sample = data_type.size_in_bytes();
    let bytes_per_pixel = bands * bytes_per_sample;

    for y in 0..height {
        let row_base = y * width * bands;
        for x in 0..width {
            let pixel_offset = (y * width + x) * bytes_per_pixel;
            let out_base = row_base + x * bands;

            for band in 0..bands {
                let sample_offset = pixel_offset + band * bytes_per_sample;
                if sample_offset + bytes_per_sample > data.len() {
                    continue;
                }
                out[out_base + band] = decode_sample(&data[sample_offset..], data_type, endian);
            }
        }
    }

    // WhiteIsZero grayscale flips against the type's full-scale value.
    if photometric == PhotometricInterpretation::WhiteIsZero && bands == 1 {
        let ceiling = data_type.max_value();
        for value in out.iter_mut().take(width * height) {
            *value = ceiling.wrapping_sub(*value);
        }
    }
}

/// Allocate and fill a fresh output buffer of exactly
/// `width * height * bands` values.
#[allow(clippy::too_many_arguments)]
pub(crate) fn decode_to_flat(
    data: &[u8],
    width: usize,
    height: usize,
    bands: usize,
    data_type: DataType,
    endian: Endian,
    photometric: PhotometricInterpretation,
) -> Vec<u64> {
    let mut out = vec![0u64; width * height * bands];
    decode_into(
        data,
        width,
        height,
        bands,
        data_type,
        endian,
        photometric,
        &mut out,
    );
    out
}

fn decode_sample(bytes: &[u8], data_type: DataType, endian: Endian) -> u64 {
    match data_type {
        DataType::Byte | DataType::Ascii | DataType::Undefined => bytes[0] as u64,
        DataType::SByte => bytes[0] as i8 as u64,
        DataType::U16 => endian.decode_slice::<2, u16>(bytes).unwrap_or(0) as u64,
        DataType::I16 => endian.decode_slice::<2, i16>(bytes).unwrap_or(0) as u64,
        DataType::U32 => endian.decode_slice::<4, u32>(bytes).unwrap_or(0) as u64,
        DataType::I32 => endian.decode_slice::<4, i32>(bytes).unwrap_or(0) as u64,
        DataType::Float32 => endian.decode_slice::<4, u32>(bytes).unwrap_or(0) as u64,
        DataType::Float64 => endian.decode_slice::<8, u64>(bytes).unwrap_or(0),
        DataType::Rational => {
            let num = endian.decode_slice::<4, u32>(bytes).unwrap_or(0) as u64;
            let den = endian.decode_slice::<4, u32>(&bytes[4..]).unwrap_or(0) as u64;
            if den == 0 {
                0
            } else {
                num / den
            }
        }
        DataType::SRational => {
            let num = endian.decode_slice::<4, i32>(bytes).unwrap_or(0) as i64;
            let den = endian.decode_slice::<4, i32>(&bytes[4..]).unwrap_or(0) as i64;
            if den == 0 {
                0
            } else {
                (num / den) as u64
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(
        data: &[u8],
        width: usize,
        height: usize,
        bands: usize,
        data_type: DataType,
    ) -> Vec<u64> {
        decode_to_flat(
            data,
            width,
            height,
            bands,
            data_type,
            Endian::Little,
            PhotometricInterpretation::BlackIsZero,
        )
    }

    #[test]
    fn bytes_widen_directly() {
        assert_eq!(decode(&[0, 1, 2, 255], 2, 2, 1, DataType::Byte), vec![0, 1, 2, 255]);
    }

    #[test]
    fn signed_types_sign_extend() {
        assert_eq!(
            decode(&[0xFF], 1, 1, 1, DataType::SByte),
            vec![u64::MAX]
        );
        assert_eq!(
            decode(&(-5i16).to_le_bytes(), 1, 1, 1, DataType::I16),
            vec![(-5i64) as u64]
        );
        assert_eq!(
            decode(&(-7i32).to_le_bytes(), 1, 1, 1, DataType::I32),
            vec![(-7i64) as u64]
        );
    }

    #[test]
    fn unsigned_types_respect_byte_order() {
        let value = decode_to_flat(
            &0x1234u16.to_be_bytes(),
            1,
            1,
            1,
            DataType::U16,
            Endian::Big,
            PhotometricInterpretation::BlackIsZero,
        );
        assert_eq!(value, vec![0x1234]);
        assert_eq!(
            decode(&0xDEADBEEFu32.to_le_bytes(), 1, 1, 1, DataType::U32),
            vec![0xDEADBEEF]
        );
    }

    #[test]
    fn floats_carry_raw_bit_patterns() {
        let bits = 1.5f32.to_bits();
        assert_eq!(
            decode(&1.5f32.to_le_bytes(), 1, 1, 1, DataType::Float32),
            vec![bits as u64]
        );
        let bits = (-2.25f64).to_bits();
        assert_eq!(
            decode(&(-2.25f64).to_le_bytes(), 1, 1, 1, DataType::Float64),
            vec![bits]
        );
    }

    #[test]
    fn rationals_become_integer_quotients() {
        let mut bytes = vec![];
        bytes.extend(7u32.to_le_bytes());
        bytes.extend(2u32.to_le_bytes());
        assert_eq!(decode(&bytes, 1, 1, 1, DataType::Rational), vec![3]);

        let mut bytes = vec![];
        bytes.extend(5u32.to_le_bytes());
        bytes.extend(0u32.to_le_bytes());
        assert_eq!(decode(&bytes, 1, 1, 1, DataType::Rational), vec![0]);
    }

    #[test]
    fn output_length_is_exact_and_prefix_stable() {
        let data: Vec<u8> = (0..12).collect();
        let full = decode(&data, 2, 2, 3, DataType::Byte);
        assert_eq!(full.len(), 12);

        // Extra trailing bytes must not disturb the decoded prefix.
        let mut extended = data.clone();
        extended.extend([99u8; 7]);
        assert_eq!(decode(&extended, 2, 2, 3, DataType::Byte), full);
    }

    #[test]
    fn truncated_input_leaves_missing_samples_zero() {
        let decoded = decode(&[5, 6], 2, 2, 1, DataType::Byte);
        assert_eq!(decoded, vec![5, 6, 0, 0]);
    }

    #[test]
    fn white_is_zero_inverts_single_band() {
        let decoded = decode_to_flat(
            &[10, 0, 255],
            3,
            1,
            1,
            DataType::Byte,
            Endian::Little,
            PhotometricInterpretation::WhiteIsZero,
        );
        assert_eq!(decoded, vec![245, 255, 0]);
    }

    #[test]
    fn white_is_zero_ignores_multiband() {
        let decoded = decode_to_flat(
            &[10, 20],
            1,
            1,
            2,
            DataType::Byte,
            Endian::Little,
            PhotometricInterpretation::WhiteIsZero,
        );
        assert_eq!(decoded, vec![10, 20]);
    }

    #[test]
    fn inversion_commutes_with_decoding() {
        let data = [1u8, 100, 200, 255];
        let inverted_bytes: Vec<u8> = data.iter().map(|&b| 255 - b).collect();

        let decode_then_invert = decode_to_flat(
            &data,
            4,
            1,
            1,
            DataType::Byte,
            Endian::Little,
            PhotometricInterpretation::WhiteIsZero,
        );
        let invert_then_decode = decode_to_flat(
            &inverted_bytes,
            4,
            1,
            1,
            DataType::Byte,
            Endian::Little,
            PhotometricInterpretation::BlackIsZero,
        );
        assert_eq!(decode_then_invert, invert_then_decode);
    }

    #[test]
    fn white_is_zero_sixteen_bit_ceiling() {
        let decoded = decode_to_flat(
            &100u16.to_le_bytes(),
            1,
            1,
            1,
            DataType::U16,
            Endian::Little,
            PhotometricInterpretation::WhiteIsZero,
        );
        assert_eq!(decoded, vec![65435]);
    }
}
