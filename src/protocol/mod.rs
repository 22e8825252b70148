//! RTMP wire protocol implementation
//!
//! This module handles the low-level protocol details:
//! - Handshake (C0C1/S0S1S2/C2 exchange)
//! - Chunk stream multiplexing and demultiplexing
//! - Message framing and parsing

pub mod chunk;
pub mod constants;
pub mod handshake;
pub mod message;

pub use chunk::{ChunkDecoder, ChunkEncoder, RawMessage};
pub use handshake::ClientHandshake;
pub use message::{Command, RtmpMessage, UserControlEvent};
