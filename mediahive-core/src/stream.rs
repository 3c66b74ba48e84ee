//! Byte-range streaming of library files.

use std::io::SeekFrom;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};

use crate::error::Result;

/// End of an open-ended range is clamped to this many bytes past its start.
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Inclusive byte range within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// Parses a `Range` header against a file of `size` bytes.
///
/// Supports `bytes=start-end`, `bytes=start-` and `bytes=-suffix`; only the
/// first range of a list is honoured. Anything unparsable or unsatisfiable
/// yields `None` and the caller serves the full file.
pub fn parse_range(header: Option<&str>, size: u64) -> Option<ByteRange> {
    let spec = header?.trim().strip_prefix("bytes=")?;
    if size == 0 {
        return None;
    }
    let first = spec.split(',').next()?.trim();
    let (start, end) = first.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());
    let last = size - 1;

    if start.is_empty() {
        let suffix: u64 = end.parse().ok()?;
        if suffix == 0 {
            return None;
        }
        return Some(ByteRange {
            start: size.saturating_sub(suffix),
            end: last,
        });
    }

    let start: u64 = start.parse().ok()?;
    if start >= size {
        return None;
    }
    let end = if end.is_empty() {
        start.saturating_add(DEFAULT_CHUNK_SIZE).min(last)
    } else {
        end.parse::<u64>().ok()?.min(last)
    };
    if end < start {
        return None;
    }
    Some(ByteRange { start, end })
}

/// An open file positioned for serving, limited to the requested range.
#[derive(Debug)]
pub struct MediaStream {
    pub path: PathBuf,
    pub content_type: String,
    pub total_size: u64,
    pub range: Option<ByteRange>,
    /// Set when the bytes come from a cached transcode.
    pub transcoded: bool,
    pub reader: Take<File>,
}

impl MediaStream {
    /// Bytes the reader will yield.
    pub fn content_length(&self) -> u64 {
        self.range.map_or(self.total_size, |range| range.len())
    }

    pub(crate) async fn open(
        path: PathBuf,
        content_type: String,
        range_header: Option<&str>,
        transcoded: bool,
    ) -> Result<Self> {
        let mut file = File::open(&path).await?;
        let total_size = file.metadata().await?.len();
        let range = parse_range(range_header, total_size);

        let reader = match range {
            Some(range) => {
                file.seek(SeekFrom::Start(range.start)).await?;
                file.take(range.len())
            }
            None => file.take(total_size),
        };

        Ok(Self {
            path,
            content_type,
            total_size,
            range,
            transcoded,
            reader,
        })
    }
}
