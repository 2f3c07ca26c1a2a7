use super::{ReadRange, ReadResult};

/// In-memory backend, mainly for tests and already-downloaded blobs.
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl ReadRange for MemorySource {
    fn read_range(&self, start: u64, buf: &mut [u8]) -> ReadResult<usize> {
        let start = start as usize;
        if start >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}
