//! FLV container reading
//!
//! FLV (Flash Video) is the container format whose tag bodies map directly
//! onto RTMP audio/video/data messages.
//!
//! ```text
//! +============+==================+==============+==================+=====+
//! | FLV Header | PrevTagSize0     | Tag 1        | PrevTagSize1     | ... |
//! | (9 bytes)  | (4 bytes)        | (11+N bytes) | (4 bytes)        |     |
//! +============+==================+==============+==================+=====+
//! ```
//!
//! Each tag header:
//! ```text
//! +------+----------+-----------+-------+----------+
//! | Type | DataSize | Timestamp | TSExt | StreamID |
//! | 1B   | 3B BE    | 3B BE     | 1B    | 3B       |
//! +------+----------+-----------+-------+----------+
//! ```
//!
//! The timestamp extension byte supplies bits 24-31, allowing timestamps
//! past ~4.6 hours. The in-file stream id is always zero and ignored.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{FlvError, Result};

/// FLV tag type byte values
const TAG_AUDIO: u8 = 8;
const TAG_VIDEO: u8 = 9;
const TAG_SCRIPT: u8 = 18;

/// FLV tag type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlvTagType {
    Audio,
    Video,
    Script,
    /// Any other type byte; skipped by the publish loop
    Other(u8),
}

impl FlvTagType {
    pub fn from_byte(b: u8) -> Self {
        match b {
            TAG_AUDIO => FlvTagType::Audio,
            TAG_VIDEO => FlvTagType::Video,
            TAG_SCRIPT => FlvTagType::Script,
            other => FlvTagType::Other(other),
        }
    }
}

/// Parsed FLV tag
#[derive(Debug, Clone)]
pub struct FlvTag {
    /// Tag type
    pub tag_type: FlvTagType,
    /// Timestamp in milliseconds (24 low bits plus the extension byte)
    pub timestamp: u32,
    /// Raw tag payload, forwarded verbatim to the server
    pub payload: Bytes,
}

/// Lazy FLV tag reader over any byte stream
///
/// Yields tags in file order; the sequence is finite and non-restartable.
/// A short read mid-tag ends the sequence the same way EOF does.
pub struct FlvReader<R> {
    reader: R,
    header_read: bool,
}

impl<R: AsyncRead + Unpin> FlvReader<R> {
    /// Create a reader over a byte source positioned at the file start
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            header_read: false,
        }
    }

    /// Read and validate the 9-byte file header plus the first
    /// previous-tag-size word
    pub async fn read_header(&mut self) -> Result<()> {
        let mut header = [0u8; 9];
        if !read_fully(&mut self.reader, &mut header).await? {
            return Err(FlvError::ShortHeader.into());
        }

        if &header[0..3] != b"FLV" {
            return Err(FlvError::MissingSignature.into());
        }
        // Version, type flags and data offset are not interpreted

        let mut prev_tag_size = [0u8; 4];
        if !read_fully(&mut self.reader, &mut prev_tag_size).await? {
            return Err(FlvError::ShortHeader.into());
        }

        self.header_read = true;
        Ok(())
    }

    /// Read the next tag
    ///
    /// Returns `Ok(None)` at EOF or on a short read; validates the header
    /// first when the caller has not.
    pub async fn next_tag(&mut self) -> Result<Option<FlvTag>> {
        if !self.header_read {
            self.read_header().await?;
        }

        let mut tag_header = [0u8; 11];
        if !read_fully(&mut self.reader, &mut tag_header).await? {
            return Ok(None);
        }

        let tag_type = FlvTagType::from_byte(tag_header[0]);
        let data_size = read_u24(&tag_header[1..4]);
        let timestamp_low = read_u24(&tag_header[4..7]);
        let timestamp_extended = tag_header[7];
        // Bytes 8-10: in-file stream id, always zero

        let timestamp = timestamp_low | ((timestamp_extended as u32) << 24);

        let mut payload = vec![0u8; data_size as usize];
        if !read_fully(&mut self.reader, &mut payload).await? {
            return Ok(None);
        }

        let mut prev_tag_size = [0u8; 4];
        if !read_fully(&mut self.reader, &mut prev_tag_size).await? {
            return Ok(None);
        }

        Ok(Some(FlvTag {
            tag_type,
            timestamp,
            payload: Bytes::from(payload),
        }))
    }
}

/// Fill `buf` completely; `Ok(false)` on EOF before the buffer filled
async fn read_fully<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Ok(false);
        }
        filled += n;
    }
    Ok(true)
}

/// Read 24-bit big-endian value
fn read_u24(buf: &[u8]) -> u32 {
    ((buf[0] as u32) << 16) | ((buf[1] as u32) << 8) | (buf[2] as u32)
}
