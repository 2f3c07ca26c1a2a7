use num_traits::NumCast;

use super::TagType;
use crate::tiff::Endian;

/// Decoded tag payload, one arm per TIFF 6.0 base type.
///
/// Single values are one-element vectors; callers that want a scalar go
/// through [`TagValue::as_u64`] and friends. Rationals keep their numerator
/// and denominator so lossless consumers can do their own division.
#[derive(Clone, Debug, PartialEq)]
pub enum TagValue {
    Byte(Vec<u8>),
    Ascii(String),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Rational(Vec<(u32, u32)>),
    SByte(Vec<i8>),
    Undefined(Vec<u8>),
    SShort(Vec<i16>),
    SLong(Vec<i32>),
    SRational(Vec<(i32, i32)>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl TagValue {
    /// Decode `count` values of `kind` from `bytes`. Returns `None` when the
    /// buffer is too short or the type is not a known base type.
    pub fn decode(kind: TagType, count: usize, bytes: &[u8], endian: Endian) -> Option<TagValue> {
        let size = kind.size_in_bytes();
        if bytes.len() < count * size {
            return None;
        }
        let bytes = &bytes[..count * size];

        let value = match kind {
            TagType::Byte => TagValue::Byte(bytes.to_vec()),
            TagType::Ascii => {
                // Trailing NUL terminator is not part of the string.
                let text = match bytes.last() {
                    Some(0) => &bytes[..bytes.len() - 1],
                    _ => bytes,
                };
                TagValue::Ascii(String::from_utf8_lossy(text).into_owned())
            }
            TagType::Short => TagValue::Short(decode_chunks::<2, u16>(bytes, endian)?),
            TagType::Long => TagValue::Long(decode_chunks::<4, u32>(bytes, endian)?),
            TagType::Rational => {
                TagValue::Rational(decode_pairs::<u32>(bytes, endian)?)
            }
            TagType::SByte => TagValue::SByte(bytes.iter().map(|&b| b as i8).collect()),
            TagType::Undefined => TagValue::Undefined(bytes.to_vec()),
            TagType::SShort => TagValue::SShort(decode_chunks::<2, i16>(bytes, endian)?),
            TagType::SLong => TagValue::SLong(decode_chunks::<4, i32>(bytes, endian)?),
            TagType::SRational => {
                TagValue::SRational(decode_pairs::<i32>(bytes, endian)?)
            }
            TagType::Float => TagValue::Float(decode_chunks::<4, f32>(bytes, endian)?),
            TagType::Double => TagValue::Double(decode_chunks::<8, f64>(bytes, endian)?),
            TagType::Unknown => return None,
        };
        Some(value)
    }

    pub fn len(&self) -> usize {
        match self {
            TagValue::Byte(v) => v.len(),
            TagValue::Ascii(s) => s.len(),
            TagValue::Short(v) => v.len(),
            TagValue::Long(v) => v.len(),
            TagValue::Rational(v) => v.len(),
            TagValue::SByte(v) => v.len(),
            TagValue::Undefined(v) => v.len(),
            TagValue::SShort(v) => v.len(),
            TagValue::SLong(v) => v.len(),
            TagValue::SRational(v) => v.len(),
            TagValue::Float(v) => v.len(),
            TagValue::Double(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First element as an unsigned integer, for dimension/code tags that
    /// writers store as either SHORT or LONG.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            TagValue::Byte(v) => v.first().map(|&x| x as u64),
            TagValue::Short(v) => v.first().map(|&x| x as u64),
            TagValue::Long(v) => v.first().map(|&x| x as u64),
            TagValue::SShort(v) => v.first().and_then(|&x| u64::try_from(x).ok()),
            TagValue::SLong(v) => v.first().and_then(|&x| u64::try_from(x).ok()),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        self.as_u64().map(|v| v as usize)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Ascii(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u16_slice(&self) -> Option<&[u16]> {
        match self {
            TagValue::Short(v) => Some(v),
            _ => None,
        }
    }

    /// Convert any numeric variant to a vector of `T`, the way the rest of
    /// the crate reads offset arrays (`u64`) or code lists (`u16`).
    pub fn to_vec<T: NumCast>(&self) -> Option<Vec<T>> {
        match self {
            TagValue::Byte(v) => v.iter().map(|&x| T::from(x)).collect(),
            TagValue::Short(v) => v.iter().map(|&x| T::from(x)).collect(),
            TagValue::Long(v) => v.iter().map(|&x| T::from(x)).collect(),
            TagValue::SByte(v) => v.iter().map(|&x| T::from(x)).collect(),
            TagValue::SShort(v) => v.iter().map(|&x| T::from(x)).collect(),
            TagValue::SLong(v) => v.iter().map(|&x| T::from(x)).collect(),
            TagValue::Float(v) => v.iter().map(|&x| T::from(x)).collect(),
            TagValue::Double(v) => v.iter().map(|&x| T::from(x)).collect(),
            _ => None,
        }
    }

    /// Float array tolerant of either f32 or f64 storage, as the GeoTIFF
    /// model tags require.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            TagValue::Float(v) => Some(v.iter().map(|&x| x as f64).collect()),
            TagValue::Double(v) => Some(v.clone()),
            _ => self.to_vec::<f64>(),
        }
    }
}

fn decode_chunks<const N: usize, T: eio::FromBytes<N>>(
    bytes: &[u8],
    endian: Endian,
) -> Option<Vec<T>> {
    bytes
        .chunks_exact(N)
        .map(|chunk| endian.decode_slice::<N, T>(chunk))
        .collect()
}

fn decode_pairs<T: eio::FromBytes<4>>(bytes: &[u8], endian: Endian) -> Option<Vec<(T, T)>> {
    bytes
        .chunks_exact(8)
        .map(|chunk| {
            let num = endian.decode_slice::<4, T>(&chunk[..4])?;
            let den = endian.decode_slice::<4, T>(&chunk[4..])?;
            Some((num, den))
        })
        .collect()
}
