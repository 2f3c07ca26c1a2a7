use std::collections::HashMap;
use std::io::SeekFrom;

use super::{Endian, ParseMode, Tag, TagId, TagType, TagValue, TiffError};
use crate::io::RangeReader;

/// Single read that covers most tag values stored near the IFD, so a
/// metadata scan over HTTP costs one range request per directory.
const METADATA_WINDOW_SIZE: usize = 16 * 1024;

/// Image File Directory: a set of tags keyed by code plus the link to the
/// next directory. Tag codes are unique within an IFD.
#[derive(Debug)]
pub struct Ifd {
    pub tags: HashMap<u16, Tag>,
    pub endian: Endian,
    pub next_ifd: u32,
}

impl Ifd {
    /// Parse the directory at `offset`. Reads the 2-byte entry count, then
    /// the whole entry table plus next-IFD pointer in a single request.
    pub fn parse(
        reader: &RangeReader,
        offset: u64,
        endian: Endian,
        mode: ParseMode,
    ) -> Result<Ifd, TiffError> {
        reader.seek(SeekFrom::Start(offset))?;

        let mut head = [0u8; 2];
        reader.read_exact(&mut head)?;
        let tag_count: u16 = endian.decode(head)?;

        let mut table = vec![0u8; tag_count as usize * 12 + 4];
        reader.read_exact(&mut table)?;

        let mut tags = HashMap::with_capacity(tag_count as usize);
        for entry in table[..tag_count as usize * 12].chunks_exact(12) {
            let code: u16 = endian.decode([entry[0], entry[1]])?;
            let kind = TagType::from(endian.decode::<2, u16>([entry[2], entry[3]])?);
            let count: u32 = endian.decode([entry[4], entry[5], entry[6], entry[7]])?;
            let raw = [entry[8], entry[9], entry[10], entry[11]];
            let raw_offset: u32 = endian.decode(raw)?;

            tags.insert(
                code,
                Tag {
                    code,
                    kind,
                    count,
                    raw_offset,
                    raw,
                    value: None,
                    is_offset: false,
                    endian,
                },
            );
        }

        let link = &table[tag_count as usize * 12..];
        let next_ifd: u32 = endian.decode([link[0], link[1], link[2], link[3]])?;

        let mut ifd = Ifd {
            tags,
            endian,
            next_ifd,
        };
        ifd.resolve_values(reader, offset, mode)?;
        Ok(ifd)
    }

    /// Populate tag values according to the parse mode.
    ///
    /// Large offset/byte-count arrays are always deferred. Inline values
    /// decode from the offset slot. Everything else is served from a single
    /// 16 KiB window read at the IFD offset; values outside the window are
    /// deferred in metadata mode and fetched immediately in full mode.
    fn resolve_values(
        &mut self,
        reader: &RangeReader,
        ifd_offset: u64,
        mode: ParseMode,
    ) -> Result<(), TiffError> {
        reader.seek(SeekFrom::Start(ifd_offset))?;
        let mut window = vec![0u8; METADATA_WINDOW_SIZE];
        let n = reader.read(&mut window)?;
        window.truncate(n);
        let window_end = ifd_offset + window.len() as u64;

        let mut out_of_window: Vec<u16> = Vec::new();

        for tag in self.tags.values_mut() {
            if TagId::is_large_array(tag.code) {
                tag.is_offset = true;
                continue;
            }

            if tag.fits_inline() {
                tag.value = tag.decode_inline();
                tag.is_offset = false;
                continue;
            }

            let start = tag.raw_offset as u64;
            let end = start + tag.data_len() as u64;
            if start >= ifd_offset && end <= window_end {
                let slice = &window[(start - ifd_offset) as usize..(end - ifd_offset) as usize];
                tag.value = TagValue::decode(tag.kind, tag.count as usize, slice, tag.endian);
                tag.is_offset = false;
            } else {
                tag.is_offset = true;
                if mode == ParseMode::Full {
                    out_of_window.push(tag.code);
                }
            }
        }

        for code in out_of_window {
            self.load_tag(reader, code)?;
        }
        Ok(())
    }

    /// Materialize a deferred tag value by seeking to its offset. A value
    /// that is already present is left untouched.
    pub fn load_tag(&mut self, reader: &RangeReader, code: u16) -> Result<(), TiffError> {
        let tag = self
            .tags
            .get_mut(&code)
            .ok_or(TiffError::TagNotFound(code))?;
        if tag.value.is_some() {
            return Ok(());
        }

        if tag.fits_inline() {
            tag.value = tag.decode_inline();
            tag.is_offset = false;
            return Ok(());
        }

        let mut buf = vec![0u8; tag.data_len()];
        reader.read_exact_at(tag.raw_offset as u64, &mut buf)?;
        tag.value = TagValue::decode(tag.kind, tag.count as usize, &buf, tag.endian);
        Ok(())
    }

    /// Tag value, loading it on demand if it was deferred. `Ok(None)` means
    /// the tag is absent from this directory.
    pub fn loaded_tag(
        &mut self,
        reader: &RangeReader,
        id: TagId,
    ) -> Result<Option<&TagValue>, TiffError> {
        let code: u16 = id.into();
        if !self.tags.contains_key(&code) {
            return Ok(None);
        }
        self.load_tag(reader, code)?;
        Ok(self.tags.get(&code).and_then(|tag| tag.value.as_ref()))
    }

    pub fn tag(&self, id: TagId) -> Option<&Tag> {
        self.tags.get(&u16::from(id))
    }

    pub fn has_tag(&self, id: TagId) -> bool {
        self.tags.contains_key(&u16::from(id))
    }

    pub fn get_tag(&self, id: TagId) -> Result<&Tag, TiffError> {
        self.tag(id).ok_or(TiffError::TagNotFound(id.into()))
    }

    /// Scalar accessor for already-resolved tags (dimension and code tags
    /// are never deferred).
    pub fn value_usize(&self, id: TagId) -> Option<usize> {
        self.tag(id).and_then(|tag| tag.value()?.as_usize())
    }

    pub fn value_u16(&self, id: TagId) -> Option<u16> {
        self.tag(id)
            .and_then(|tag| tag.value()?.as_u64())
            .map(|v| v as u16)
    }
}
