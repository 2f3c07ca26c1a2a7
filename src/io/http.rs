use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::RANGE;
use reqwest::{StatusCode, Url};

use super::{ReadError, ReadRange, ReadResult};

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote file backend over HTTP range requests.
///
/// The size is resolved once with a HEAD request at construction; servers
/// that omit Content-Length leave it unknown rather than failing the open.
pub struct HttpSource {
    url: Url,
    client: Client,
    size: Option<u64>,
}

impl HttpSource {
    pub fn new(url: &str) -> ReadResult<Self> {
        Self::with_timeout(url, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> ReadResult<Self> {
        let url = Url::parse(url).map_err(|e| {
            ReadError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid url: {e}"),
            ))
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(into_io_error)?;

        let size = client
            .head(url.clone())
            .send()
            .ok()
            .and_then(|response| response.content_length());

        Ok(Self { url, client, size })
    }
}

impl ReadRange for HttpSource {
    fn read_range(&self, start: u64, buf: &mut [u8]) -> ReadResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut end = start + buf.len() as u64 - 1;
        if let Some(size) = self.size {
            if start >= size {
                return Ok(0);
            }
            end = end.min(size - 1);
        }

        let response = self
            .client
            .get(self.url.clone())
            .header(RANGE, format!("bytes={start}-{end}"))
            .send()
            .map_err(into_io_error)?;

        let status = response.status();
        if status != StatusCode::PARTIAL_CONTENT && status != StatusCode::OK {
            return Err(ReadError::Http(status.as_u16()));
        }

        let body = response.bytes().map_err(into_io_error)?;
        let n = body.len().min(buf.len());
        buf[..n].copy_from_slice(&body[..n]);
        Ok(n)
    }

    fn size(&self) -> Option<u64> {
        self.size
    }
}

fn into_io_error(e: reqwest::Error) -> ReadError {
    ReadError::Io(std::io::Error::other(e))
}
