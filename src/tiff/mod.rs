use std::fmt::Display;
use std::io::SeekFrom;

use tracing::debug;

mod endian;
mod error;
mod ifd;
mod tag;

pub use endian::Endian;
pub use error::TiffError;
pub use ifd::Ifd;
pub use tag::{Tag, TagId, TagType, TagValue};

use crate::io::RangeReader;

const TIFF_VERSION: u16 = 42;

/// How eagerly tag values are resolved at parse time. Large offset arrays
/// are deferred in both modes.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ParseMode {
    /// One 16 KiB window read per IFD; values outside it stay deferred.
    Metadata,
    /// Resolve every non-array value immediately, seeking as needed.
    Full,
}

/// A parsed TIFF document: byte order plus the IFD chain starting at the
/// main image, with overviews following in descending resolution.
#[derive(Debug)]
pub struct Tiff {
    pub endian: Endian,
    pub ifds: Vec<Ifd>,
}

impl Tiff {
    pub fn open(reader: &RangeReader) -> Result<Self, TiffError> {
        Self::open_with_mode(reader, ParseMode::Metadata)
    }

    pub fn open_with_mode(reader: &RangeReader, mode: ParseMode) -> Result<Self, TiffError> {
        reader.seek(SeekFrom::Start(0))?;
        let mut header = [0u8; 8];
        reader.read_exact(&mut header)?;

        let endian = match &header[..2] {
            b"II" => Endian::Little,
            b"MM" => Endian::Big,
            _ => {
                return Err(TiffError::InvalidMagic(u16::from_le_bytes([
                    header[0], header[1],
                ])))
            }
        };

        let version: u16 = endian.decode([header[2], header[3]])?;
        if version != TIFF_VERSION {
            return Err(TiffError::InvalidVersion(version));
        }

        let mut ifd_offset: u32 = endian.decode([header[4], header[5], header[6], header[7]])?;

        let mut ifds = vec![];
        while ifd_offset != 0 {
            let ifd = Ifd::parse(reader, ifd_offset as u64, endian, mode)?;
            ifd_offset = ifd.next_ifd;
            ifds.push(ifd);
        }

        if ifds.is_empty() {
            return Err(TiffError::NoIfds);
        }
        debug!("parsed tiff: {:?} endian, {} ifds", endian, ifds.len());

        Ok(Self { endian, ifds })
    }

    pub fn ifd_count(&self) -> usize {
        self.ifds.len()
    }

    pub fn ifd(&self, index: usize) -> Option<&Ifd> {
        self.ifds.get(index)
    }

    pub fn ifd_mut(&mut self, index: usize) -> Option<&mut Ifd> {
        self.ifds.get_mut(index)
    }
}

impl Display for Tiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tiff({:?} endian, {} IFDs)", self.endian, self.ifds.len())?;
        for (i, ifd) in self.ifds.iter().enumerate() {
            write!(f, "\n  IFD {i}: {} tags", ifd.tags.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemorySource;

    fn reader_over(data: Vec<u8>) -> RangeReader {
        RangeReader::new(Box::new(MemorySource::new(data)))
    }

    /// Little-endian stream from the scenario: single IFD, tag 256 = 100.
    const MINIMAL_LE: [u8; 26] = [
        0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x01, 0x04, 0x00, 0x01,
        0x00, 0x00, 0x00, 0x64, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn parses_minimal_little_endian() {
        let reader = reader_over(MINIMAL_LE.to_vec());
        let tiff = Tiff::open(&reader).unwrap();
        assert_eq!(tiff.endian, Endian::Little);
        assert_eq!(tiff.ifd_count(), 1);

        let ifd = tiff.ifd(0).unwrap();
        assert_eq!(ifd.endian, Endian::Little);
        let tag = ifd.tag(TagId::ImageWidth).unwrap();
        assert_eq!(tag.kind, TagType::Long);
        assert_eq!(tag.count, 1);
        assert_eq!(tag.value, Some(TagValue::Long(vec![100])));
    }

    #[test]
    fn parses_minimal_big_endian() {
        let mut buf = vec![];
        buf.extend(b"MM");
        buf.extend(42u16.to_be_bytes());
        buf.extend(8u32.to_be_bytes());
        buf.extend(1u16.to_be_bytes());
        buf.extend(256u16.to_be_bytes());
        buf.extend(4u16.to_be_bytes());
        buf.extend(1u32.to_be_bytes());
        buf.extend(200u32.to_be_bytes());
        buf.extend(0u32.to_be_bytes());

        let reader = reader_over(buf);
        let tiff = Tiff::open(&reader).unwrap();
        assert_eq!(tiff.endian, Endian::Big);
        assert_eq!(tiff.ifd(0).unwrap().endian, Endian::Big);
        assert_eq!(
            tiff.ifd(0).unwrap().value_usize(TagId::ImageWidth),
            Some(200)
        );
    }

    #[test]
    fn rejects_bad_magic() {
        let reader = reader_over(b"XX\x2A\x00\x08\x00\x00\x00".to_vec());
        assert!(matches!(
            Tiff::open(&reader),
            Err(TiffError::InvalidMagic(_))
        ));
    }

    #[test]
    fn rejects_bad_version() {
        let mut buf = MINIMAL_LE.to_vec();
        buf[2] = 43;
        let reader = reader_over(buf);
        assert!(matches!(
            Tiff::open(&reader),
            Err(TiffError::InvalidVersion(43))
        ));
    }

    #[test]
    fn walks_ifd_chain() {
        // Two single-tag IFDs linked together.
        let mut buf = vec![];
        buf.extend(b"II");
        buf.extend(42u16.to_le_bytes());
        buf.extend(8u32.to_le_bytes());
        // IFD 0 at 8, next at 26.
        buf.extend(1u16.to_le_bytes());
        buf.extend(256u16.to_le_bytes());
        buf.extend(4u16.to_le_bytes());
        buf.extend(1u32.to_le_bytes());
        buf.extend(100u32.to_le_bytes());
        buf.extend(26u32.to_le_bytes());
        // IFD 1 at 26.
        buf.extend(1u16.to_le_bytes());
        buf.extend(256u16.to_le_bytes());
        buf.extend(4u16.to_le_bytes());
        buf.extend(1u32.to_le_bytes());
        buf.extend(50u32.to_le_bytes());
        buf.extend(0u32.to_le_bytes());

        let reader = reader_over(buf);
        let tiff = Tiff::open(&reader).unwrap();
        assert_eq!(tiff.ifd_count(), 2);
        assert_eq!(tiff.ifd(1).unwrap().value_usize(TagId::ImageWidth), Some(50));
    }
}
