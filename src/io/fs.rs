use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use super::{ReadRange, ReadResult};

/// Local file backend. The file handle is mutex-guarded so `read_range` can
/// take `&self` while still seeking.
pub struct FileSource {
    file: Mutex<File>,
    size: u64,
}

impl FileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> ReadResult<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            size,
        })
    }
}

impl ReadRange for FileSource {
    fn read_range(&self, start: u64, buf: &mut [u8]) -> ReadResult<usize> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(start))?;
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn reads_ranges_from_disk() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"Hello, World!").unwrap();

        let source = FileSource::open(file.path()).unwrap();
        assert_eq!(source.size(), Some(13));

        let mut buf = [0u8; 5];
        assert_eq!(source.read_range(0, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"Hello");

        assert_eq!(source.read_range(7, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"World");
    }

    #[test]
    fn short_read_at_eof() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();

        let source = FileSource::open(file.path()).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(source.read_range(1, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"bc");
    }
}
