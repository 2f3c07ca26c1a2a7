// I/O layer
//   ReadRange is stateless positioned I/O: self is immutable, which makes it
//   a natural fit for http byte-range requests and pread-style file access.
//   RangeReader layers a seekable cursor with a single read-ahead window on
//   top of any ReadRange source.

use std::fmt::Display;
use std::io::{self, SeekFrom};
use std::sync::Mutex;

use tracing::trace;

pub mod fs;
pub mod http;
pub mod memory;

pub use fs::FileSource;
pub use http::HttpSource;
pub use memory::MemorySource;

/// Default read-ahead window (64 KiB). Metadata scans are sequential, so one
/// window this size usually covers the header, IFD 0 and its tag values.
pub const DEFAULT_READAHEAD_SIZE: usize = 64 * 1024;

#[derive(Debug)]
pub enum ReadError {
    Io(io::Error),
    /// Response status other than 206 Partial Content or 200 OK.
    Http(u16),
    /// SeekFrom::End on a source that did not report its size.
    NoContentLength,
    /// Seek target resolved to a negative position.
    InvalidSeek(i64),
}

impl Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::Io(e) => write!(f, "io error: {e}"),
            ReadError::Http(status) => write!(f, "unexpected http status: {status}"),
            ReadError::NoContentLength => {
                write!(f, "cannot seek from end: source size unknown")
            }
            ReadError::InvalidSeek(pos) => write!(f, "negative seek position: {pos}"),
        }
    }
}

impl std::error::Error for ReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReadError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ReadError {
    fn from(e: io::Error) -> Self {
        ReadError::Io(e)
    }
}

pub type ReadResult<T> = Result<T, ReadError>;

/// Positioned byte access over a file, an HTTP endpoint, or an in-memory blob.
pub trait ReadRange: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `start`, returning the number
    /// of bytes read. Short reads are only valid at end of source.
    fn read_range(&self, start: u64, buf: &mut [u8]) -> ReadResult<usize>;

    /// Total size in bytes, or `None` when the backend declined to report it.
    fn size(&self) -> Option<u64>;
}

struct Window {
    pos: u64,
    buffer: Vec<u8>,
    /// Absolute start of the buffered bytes; `start == end` means empty.
    start: u64,
    end: u64,
}

impl Window {
    fn invalidate(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    fn contains(&self, pos: u64) -> bool {
        self.start < self.end && pos >= self.start && pos < self.end
    }
}

/// Seekable reader with a single contiguous read-ahead window.
///
/// Sequential reads (the common case for metadata scans) are served from the
/// window; a seek outside it invalidates it. All state lives behind a mutex
/// so the methods take `&self` and interleaved callers are serialized.
pub struct RangeReader {
    source: Box<dyn ReadRange>,
    size: Option<u64>,
    readahead_size: usize,
    window: Mutex<Window>,
}

impl RangeReader {
    pub fn new(source: Box<dyn ReadRange>) -> Self {
        let size = source.size();
        Self {
            source,
            size,
            readahead_size: DEFAULT_READAHEAD_SIZE,
            window: Mutex::new(Window {
                pos: 0,
                buffer: Vec::new(),
                start: 0,
                end: 0,
            }),
        }
    }

    pub fn with_readahead(mut self, readahead_size: usize) -> Self {
        if readahead_size > 0 {
            self.readahead_size = readahead_size;
        }
        self
    }

    /// Total source size, or `None` when unknown (HTTP without Content-Length).
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn position(&self) -> u64 {
        self.window.lock().unwrap().pos
    }

    pub fn seek(&self, target: SeekFrom) -> ReadResult<u64> {
        let mut w = self.window.lock().unwrap();
        let new_pos = match target {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => w.pos as i64 + delta,
            SeekFrom::End(delta) => match self.size {
                Some(size) => size as i64 + delta,
                None => return Err(ReadError::NoContentLength),
            },
        };
        if new_pos < 0 {
            return Err(ReadError::InvalidSeek(new_pos));
        }
        let new_pos = new_pos as u64;

        // A seek outside the buffered range means non-sequential access.
        if !w.contains(new_pos) {
            w.invalidate();
        }
        w.pos = new_pos;
        Ok(new_pos)
    }

    /// Read up to `buf.len()` bytes from the current position. Returns 0 at
    /// end of source.
    pub fn read(&self, buf: &mut [u8]) -> ReadResult<usize> {
        let mut w = self.window.lock().unwrap();

        if let Some(size) = self.size {
            if w.pos >= size {
                return Ok(0);
            }
        }

        let mut to_read = buf.len();
        if let Some(size) = self.size {
            to_read = to_read.min((size - w.pos) as usize);
        }
        if to_read == 0 {
            return Ok(0);
        }

        if w.contains(w.pos) {
            let offset = (w.pos - w.start) as usize;
            let available = (w.end - w.pos) as usize;

            if available >= to_read {
                buf[..to_read].copy_from_slice(&w.buffer[offset..offset + to_read]);
                w.pos += to_read as u64;
                return Ok(to_read);
            }

            // Window boundary: copy what is buffered, fetch the remainder
            // directly without disturbing the window.
            buf[..available].copy_from_slice(&w.buffer[offset..offset + available]);
            w.pos += available as u64;
            let n = self.source.read_range(w.pos, &mut buf[available..to_read])?;
            w.pos += n as u64;
            return Ok(available + n);
        }

        self.read_with_readahead(&mut w, buf, to_read)
    }

    /// Miss path: fetch `max(request, readahead)` bytes, keep the surplus in
    /// the window, serve the caller from it.
    fn read_with_readahead(
        &self,
        w: &mut Window,
        buf: &mut [u8],
        to_read: usize,
    ) -> ReadResult<usize> {
        let mut fetch_size = self.readahead_size.max(to_read);
        if let Some(size) = self.size {
            fetch_size = fetch_size.min((size - w.pos) as usize);
        }

        if w.buffer.len() < fetch_size {
            w.buffer.resize(fetch_size, 0);
        }
        let start = w.pos;
        let fetched = {
            let dst = &mut w.buffer[..fetch_size];
            self.source.read_range(start, dst)?
        };
        trace!("read-ahead fill: {fetched} bytes at offset {start}");

        if fetched > to_read {
            w.start = w.pos;
            w.end = w.pos + fetched as u64;
        } else {
            w.invalidate();
        }

        let n = to_read.min(fetched);
        buf[..n].copy_from_slice(&w.buffer[..n]);
        w.pos += n as u64;
        Ok(n)
    }

    pub fn read_exact(&self, buf: &mut [u8]) -> ReadResult<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(ReadError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("failed to completely fill buffer: {filled} < {}", buf.len()),
                )));
            }
            filled += n;
        }
        Ok(())
    }

    pub fn read_exact_at(&self, start: u64, buf: &mut [u8]) -> ReadResult<()> {
        self.seek(SeekFrom::Start(start))?;
        self.read_exact(buf)
    }

    /// Drop the read-ahead window, releasing its memory.
    pub fn clear_buffer(&self) {
        let mut w = self.window.lock().unwrap();
        w.buffer = Vec::new();
        w.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_over(data: Vec<u8>) -> RangeReader {
        RangeReader::new(Box::new(MemorySource::new(data)))
    }

    #[test]
    fn read_serves_from_window_after_first_fetch() {
        let data: Vec<u8> = (0..=255).collect();
        let reader = reader_over(data.clone()).with_readahead(64);

        let mut buf = [0u8; 16];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..], &data[..16]);

        // Second read stays inside the 64-byte window.
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..], &data[16..32]);
    }

    #[test]
    fn partial_window_hit_completes_read() {
        let data: Vec<u8> = (0..=255).collect();
        let reader = reader_over(data.clone()).with_readahead(32);

        let mut buf = [0u8; 24];
        reader.read_exact(&mut buf).unwrap();
        // Window holds bytes 0..32; this request straddles its boundary.
        let mut big = [0u8; 24];
        reader.read_exact(&mut big).unwrap();
        assert_eq!(&big[..], &data[24..48]);
    }

    #[test]
    fn seek_outside_window_invalidates_it() {
        let data: Vec<u8> = (0..=255).collect();
        let reader = reader_over(data.clone()).with_readahead(32);

        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf).unwrap();
        reader.seek(SeekFrom::Start(200)).unwrap();
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..], &data[200..208]);
    }

    #[test]
    fn reads_are_idempotent_across_seeks() {
        let data: Vec<u8> = (0u8..200).cycle().take(4096).collect();
        let reader = reader_over(data).with_readahead(128);

        let mut first = [0u8; 64];
        reader.seek(SeekFrom::Start(1000)).unwrap();
        reader.read_exact(&mut first).unwrap();

        let mut second = [0u8; 64];
        reader.seek(SeekFrom::Start(1000)).unwrap();
        reader.read_exact(&mut second).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn read_at_end_reports_eof() {
        let reader = reader_over(vec![1, 2, 3]);
        reader.seek(SeekFrom::Start(3)).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn read_clamps_to_source_end() {
        let reader = reader_over(vec![9u8; 10]);
        reader.seek(SeekFrom::Start(6)).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
    }

    #[test]
    fn seek_from_end_and_current() {
        let reader = reader_over((0..100u8).collect());
        assert_eq!(reader.seek(SeekFrom::End(-10)).unwrap(), 90);
        assert_eq!(reader.seek(SeekFrom::Current(5)).unwrap(), 95);
        assert!(matches!(
            reader.seek(SeekFrom::Current(-200)),
            Err(ReadError::InvalidSeek(_))
        ));
    }

    #[test]
    fn clear_buffer_releases_window() {
        let reader = reader_over((0..100u8).collect()).with_readahead(64);
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf).unwrap();
        reader.clear_buffer();
        // Still readable after the window is gone.
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf[0], 8);
    }
}
