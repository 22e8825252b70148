//! RTMP chunk stream codec
//!
//! RTMP messages are split into chunks for multiplexing. Each chunk has a
//! header that identifies the chunk stream and message being sent.
//!
//! ```text
//! Chunk Format:
//! +-------------+-----------------+-------------------+
//! | Basic Header| Message Header  | Chunk Data        |
//! | (1-3 bytes) | (0,3,7,11 bytes)| (variable)        |
//! +-------------+-----------------+-------------------+
//!
//! Basic Header formats:
//! - 1 byte:  fmt(2) + csid(6)        for csid 2-63
//! - 2 bytes: fmt(2) + 0 + csid(8)    for csid 64-319
//! - 3 bytes: fmt(2) + 1 + csid(16)   for csid 64-65599
//!
//! Message Header formats (based on fmt):
//! - Type 0 (11 bytes): timestamp(3) + length(3) + type(1) + stream_id(4 LE)
//! - Type 1 (7 bytes):  timestamp_delta(3) + length(3) + type(1)
//! - Type 2 (3 bytes):  timestamp_delta(3)
//! - Type 3 (0 bytes):  (use previous chunk's values)
//! ```
//!
//! The message stream id in the type-0 header is little-endian; it is the
//! one little-endian field in the whole protocol.
//!
//! Outbound messages always use a type-0 header for the first fragment and
//! type-3 headers for continuations. Timestamps at or above 0xFFFFFF write
//! 0xFFFFFF in the 24-bit slot plus a 32-bit big-endian extended timestamp,
//! and the extended timestamp is repeated on every type-3 continuation of
//! that message; the decoder reads it back symmetrically.
//!
//! Reference: RTMP Specification Section 5.3

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use crate::error::{ProtocolError, Result};
use crate::protocol::constants::*;

/// A complete RTMP message, either about to be fragmented into chunks or
/// freshly reassembled from them
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Chunk stream ID (for multiplexing)
    pub csid: u32,
    /// Message timestamp (milliseconds)
    pub timestamp: u32,
    /// Message type ID
    pub message_type: u8,
    /// Message stream ID
    pub stream_id: u32,
    /// Message payload
    pub payload: Bytes,
}

/// Chunk stream encoder
///
/// Fragments outbound messages at the current chunk size. Stateless across
/// messages: every message opens with a full type-0 header.
pub struct ChunkEncoder {
    chunk_size: u32,
}

impl ChunkEncoder {
    /// Create a new encoder with the protocol default chunk size
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the outbound chunk size (advertise via SetChunkSize first)
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
    }

    /// Get current chunk size
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Encode a message into chunks, appending to `buf`
    pub fn encode(&self, msg: &RawMessage, buf: &mut BytesMut) {
        let needs_extended = msg.timestamp >= EXTENDED_TIMESTAMP_THRESHOLD;
        let timestamp_field = if needs_extended {
            EXTENDED_TIMESTAMP_THRESHOLD
        } else {
            msg.timestamp
        };

        let payload_len = msg.payload.len();
        let mut offset = 0;
        let mut first_chunk = true;

        loop {
            let take = (payload_len - offset).min(self.chunk_size as usize);

            if first_chunk {
                write_basic_header(msg.csid, CHUNK_FMT_0, buf);
                write_u24(timestamp_field, buf);
                write_u24(payload_len as u32, buf);
                buf.put_u8(msg.message_type);
                buf.put_u32_le(msg.stream_id);
            } else {
                write_basic_header(msg.csid, CHUNK_FMT_3, buf);
            }

            if needs_extended {
                buf.put_u32(msg.timestamp);
            }

            buf.put_slice(&msg.payload[offset..offset + take]);
            offset += take;
            first_chunk = false;

            if offset >= payload_len {
                break;
            }
        }
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Chunk header format types (fmt field)
const CHUNK_FMT_0: u8 = 0;
const CHUNK_FMT_3: u8 = 3;

/// Per-chunk-stream state for reassembly
#[derive(Debug, Default)]
struct ChunkStreamState {
    /// Last absolute timestamp
    timestamp: u32,
    /// Last timestamp delta (zero after a type-0 header)
    timestamp_delta: u32,
    /// Last message length
    message_length: u32,
    /// Last message type
    message_type: u8,
    /// Last message stream ID
    stream_id: u32,
    /// Whether the most recent non-type-3 header carried an extended timestamp
    has_extended_timestamp: bool,
    /// Buffer for partial message reassembly
    partial: BytesMut,
}

/// Chunk stream decoder
///
/// Handles chunk demultiplexing and message reassembly. Never consumes
/// bytes from the input until an entire chunk (headers plus data) is
/// available, so a partial read can simply be retried after more data
/// arrives.
pub struct ChunkDecoder {
    /// Inbound chunk size (updated by SetChunkSize)
    chunk_size: u32,
    /// Per-chunk-stream state
    streams: HashMap<u32, ChunkStreamState>,
    /// Maximum message size (sanity limit)
    max_message_size: u32,
}

impl ChunkDecoder {
    /// Create a new decoder with the protocol default chunk size
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            streams: HashMap::new(),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Set the inbound chunk size (called on a SetChunkSize message)
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
    }

    /// Get current inbound chunk size
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Try to decode a complete message from the buffer
    ///
    /// Returns `Ok(Some(msg))` when a message completed with this chunk,
    /// `Ok(None)` if more data is needed, or `Err` on a protocol error.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RawMessage>> {
        let (fmt, csid, basic_len) = match parse_basic_header(buf)? {
            Some(v) => v,
            None => return Ok(None),
        };

        let msg_header_len = match fmt {
            0 => 11,
            1 => 7,
            2 => 3,
            3 => 0,
            _ => return Err(ProtocolError::InvalidChunkHeader.into()),
        };

        if buf.len() < basic_len + msg_header_len {
            return Ok(None);
        }

        let state = self.streams.entry(csid).or_default();
        let header = &buf[basic_len..];

        // Resolve the message header, inheriting missing fields from the
        // saved per-stream state. The 24-bit field is an absolute timestamp
        // for fmt 0 and a delta for fmt 1/2.
        let (ts_field, message_length, message_type, stream_id) = match fmt {
            0 => (
                peek_u24(header),
                peek_u24(&header[3..]),
                header[6],
                u32::from_le_bytes([header[7], header[8], header[9], header[10]]),
            ),
            1 => (
                peek_u24(header),
                peek_u24(&header[3..]),
                header[6],
                state.stream_id,
            ),
            2 => (
                peek_u24(header),
                state.message_length,
                state.message_type,
                state.stream_id,
            ),
            _ => (
                0,
                state.message_length,
                state.message_type,
                state.stream_id,
            ),
        };

        let needs_extended = if fmt == 3 {
            state.has_extended_timestamp
        } else {
            ts_field == EXTENDED_TIMESTAMP_THRESHOLD
        };
        let extended_len = if needs_extended { 4 } else { 0 };
        let total_header_len = basic_len + msg_header_len + extended_len;

        if buf.len() < total_header_len {
            return Ok(None);
        }

        let extended_value = if needs_extended {
            let ext = &buf[basic_len + msg_header_len..];
            u32::from_be_bytes([ext[0], ext[1], ext[2], ext[3]])
        } else {
            0
        };

        if message_length > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                size: message_length,
                max: self.max_message_size,
            }
            .into());
        }

        // A non-type-3 header while a message is in flight abandons the
        // partial message; continuation chunks are required to be type 3.
        if fmt != 3 && !state.partial.is_empty() {
            state.partial.clear();
        }

        let continuation = fmt == 3 && !state.partial.is_empty();
        let already = state.partial.len() as u32;
        let chunk_data_len = (message_length.saturating_sub(already)).min(self.chunk_size) as usize;

        if buf.len() < total_header_len + chunk_data_len {
            return Ok(None);
        }

        // Entire chunk present: commit.
        buf.advance(total_header_len);

        if !continuation {
            match fmt {
                0 => {
                    state.timestamp = if needs_extended {
                        extended_value
                    } else {
                        ts_field
                    };
                    state.timestamp_delta = 0;
                    state.has_extended_timestamp = needs_extended;
                }
                1 | 2 => {
                    let delta = if needs_extended {
                        extended_value
                    } else {
                        ts_field
                    };
                    state.timestamp = state.timestamp.wrapping_add(delta);
                    state.timestamp_delta = delta;
                    state.has_extended_timestamp = needs_extended;
                }
                _ => {
                    // A type-3 chunk starting a new message repeats the last
                    // delta (no-op after a type-0 header). The extended
                    // timestamp, when present, only restates the computed
                    // value.
                    state.timestamp = state.timestamp.wrapping_add(state.timestamp_delta);
                }
            }
            state.message_length = message_length;
            state.message_type = message_type;
            state.stream_id = stream_id;
            state.partial.reserve(message_length as usize);
        }

        state.partial.put_slice(&buf[..chunk_data_len]);
        buf.advance(chunk_data_len);

        if state.partial.len() as u32 >= state.message_length {
            let payload = state.partial.split().freeze();
            Ok(Some(RawMessage {
                csid,
                timestamp: state.timestamp,
                message_type: state.message_type,
                stream_id: state.stream_id,
                payload,
            }))
        } else {
            Ok(None)
        }
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse basic header and return (fmt, csid, header_length) without consuming
fn parse_basic_header(buf: &[u8]) -> Result<Option<(u8, u32, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }

    let first = buf[0];
    let fmt = (first >> 6) & 0x03;
    let csid_low = first & 0x3F;

    match csid_low {
        0 => {
            // 2-byte header: csid = 64 + second byte
            if buf.len() < 2 {
                return Ok(None);
            }
            Ok(Some((fmt, 64 + buf[1] as u32, 2)))
        }
        1 => {
            // 3-byte header: csid = 64 + second + third*256
            if buf.len() < 3 {
                return Ok(None);
            }
            Ok(Some((fmt, 64 + buf[1] as u32 + (buf[2] as u32) * 256, 3)))
        }
        _ => Ok(Some((fmt, csid_low as u32, 1))),
    }
}

/// Peek a 24-bit big-endian value
fn peek_u24(buf: &[u8]) -> u32 {
    ((buf[0] as u32) << 16) | ((buf[1] as u32) << 8) | (buf[2] as u32)
}

/// Write basic header
fn write_basic_header(csid: u32, fmt: u8, buf: &mut BytesMut) {
    if csid >= 64 + 256 {
        buf.put_u8((fmt << 6) | 1);
        let csid_offset = csid - 64;
        buf.put_u8((csid_offset & 0xFF) as u8);
        buf.put_u8(((csid_offset >> 8) & 0xFF) as u8);
    } else if csid >= 64 {
        buf.put_u8(fmt << 6);
        buf.put_u8((csid - 64) as u8);
    } else {
        buf.put_u8((fmt << 6) | (csid as u8));
    }
}

/// Write 24-bit big-endian value
fn write_u24(value: u32, buf: &mut BytesMut) {
    buf.put_u8(((value >> 16) & 0xFF) as u8);
    buf.put_u8(((value >> 8) & 0xFF) as u8);
    buf.put_u8((value & 0xFF) as u8);
}
