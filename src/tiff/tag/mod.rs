use num_enum::{FromPrimitive, IntoPrimitive};
use std::fmt::Display;

use super::Endian;

mod id;
mod value;

pub use id::TagId;
pub use value::TagValue;

#[derive(Debug, PartialEq, Eq, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum TagType {
    Byte = 1,
    Ascii = 2,
    Short = 3,
    Long = 4,
    Rational = 5,
    SByte = 6,
    Undefined = 7,
    SShort = 8,
    SLong = 9,
    SRational = 10,
    Float = 11,
    Double = 12,

    #[num_enum(default)]
    Unknown = 0xFFFF,
}

impl TagType {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            TagType::Byte | TagType::Ascii | TagType::SByte | TagType::Undefined => 1,
            TagType::Short | TagType::SShort => 2,
            TagType::Long | TagType::SLong | TagType::Float => 4,
            TagType::Rational | TagType::SRational | TagType::Double => 8,
            TagType::Unknown => 1,
        }
    }
}

/// One IFD entry. The 12-byte wire form is id/kind/count/offset; `raw` keeps
/// the 4 offset-slot bytes verbatim because inline values are left-justified
/// in file byte order, which the decoded `raw_offset` cannot reproduce.
///
/// `value` starts empty for deferred tags and is materialized at most once.
#[derive(Clone, Debug)]
pub struct Tag {
    pub code: u16,
    pub kind: TagType,
    pub count: u32,
    pub raw_offset: u32,
    pub raw: [u8; 4],
    pub value: Option<TagValue>,
    /// True when the payload lives at `raw_offset` rather than inline.
    pub is_offset: bool,
    pub endian: Endian,
}

impl Tag {
    pub fn id(&self) -> TagId {
        TagId::from(self.code)
    }

    /// Payload size in bytes as declared by kind and count.
    pub fn data_len(&self) -> usize {
        self.kind.size_in_bytes() * self.count as usize
    }

    pub fn fits_inline(&self) -> bool {
        self.data_len() <= 4
    }

    /// Decode the inline payload from the offset slot.
    pub fn decode_inline(&self) -> Option<TagValue> {
        TagValue::decode(self.kind, self.count as usize, &self.raw, self.endian)
    }

    pub fn value(&self) -> Option<&TagValue> {
        self.value.as_ref()
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let id = self.id();
        let name = if id == TagId::Unknown {
            format!("Unknown({})", self.code)
        } else {
            format!("{id:?}")
        };
        match &self.value {
            Some(value) if value.len() <= 8 => {
                write!(f, "{} {:?}[{}]: {:?}", name, self.kind, self.count, value)
            }
            Some(value) => write!(
                f,
                "{} {:?}[{}]: {} values",
                name,
                self.kind,
                self.count,
                value.len()
            ),
            None => write!(f, "{} {:?}[{}]: <deferred>", name, self.kind, self.count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(kind: TagType, count: u32, raw: [u8; 4], endian: Endian) -> Tag {
        Tag {
            code: 256,
            kind,
            count,
            raw_offset: u32::from_le_bytes(raw),
            raw,
            value: None,
            is_offset: false,
            endian,
        }
    }

    #[test]
    fn inline_short_is_left_justified_little_endian() {
        let t = tag(TagType::Short, 1, [0xC8, 0x00, 0x00, 0x00], Endian::Little);
        assert_eq!(t.decode_inline(), Some(TagValue::Short(vec![200])));
    }

    #[test]
    fn inline_short_is_left_justified_big_endian() {
        let t = tag(TagType::Short, 1, [0x00, 0xC8, 0x00, 0x00], Endian::Big);
        assert_eq!(t.decode_inline(), Some(TagValue::Short(vec![200])));
    }

    #[test]
    fn inline_capacity_boundary() {
        let t = tag(TagType::Short, 2, [0, 0, 0, 0], Endian::Little);
        assert!(t.fits_inline());
        let t = tag(TagType::Long, 2, [0, 0, 0, 0], Endian::Little);
        assert!(!t.fits_inline());
    }

    #[test]
    fn large_array_codes() {
        for code in [273u16, 279, 324, 325] {
            assert!(TagId::is_large_array(code));
        }
        assert!(!TagId::is_large_array(256));
    }
}
