//! RTMP client handshake
//!
//! The simple (non-digest) handshake as performed by a publishing client:
//!
//! ```text
//! Client                                   Server
//!   |                                        |
//!   |------- C0 (1 byte: version) --------->|
//!   |------- C1 (1536 bytes: time+random) ->|
//!   |                                        |
//!   |<------ S0 (1 byte: version) ----------|
//!   |<------ S1 (1536 bytes: time+random) --|
//!   |                                        |
//!   |------- C2 (1536 bytes: echo S1) ----->|
//!   |<------ S2 (1536 bytes) ---------------|
//!   |                                        |
//!   |          [Handshake Complete]          |
//! ```
//!
//! C2 echoes S1 verbatim. S2 is consumed without validation; servers are
//! not consistent about echoing C1 correctly and nothing downstream
//! depends on it.
//!
//! Reference: RTMP Specification Section 5.2

use bytes::{BufMut, Bytes, BytesMut};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{HandshakeError, Result};
use crate::protocol::constants::{HANDSHAKE_SIZE, RTMP_VERSION};

/// Client handshake state machine
#[derive(Debug)]
pub struct ClientHandshake {
    state: HandshakeState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    /// Need to send C0C1
    Initial,
    /// C0C1 sent, waiting for S0S1
    WaitingForS0S1,
    /// C2 produced, waiting for S2
    WaitingForS2,
    /// Handshake complete
    Done,
}

impl ClientHandshake {
    /// Create a new client handshake
    pub fn new() -> Self {
        Self {
            state: HandshakeState::Initial,
        }
    }

    /// Check if handshake is complete
    pub fn is_done(&self) -> bool {
        self.state == HandshakeState::Done
    }

    /// Bytes expected from the peer before the next transition
    pub fn bytes_needed(&self) -> usize {
        match self.state {
            HandshakeState::Initial => 0,
            HandshakeState::WaitingForS0S1 => 1 + HANDSHAKE_SIZE,
            HandshakeState::WaitingForS2 => HANDSHAKE_SIZE,
            HandshakeState::Done => 0,
        }
    }

    /// Generate C0 + C1 (1 + 1536 bytes)
    pub fn c0c1(&mut self) -> Result<Bytes> {
        if self.state != HandshakeState::Initial {
            return Err(HandshakeError::InvalidState.into());
        }

        let mut buf = BytesMut::with_capacity(1 + HANDSHAKE_SIZE);
        buf.put_u8(RTMP_VERSION);
        buf.put_slice(&generate_packet());

        self.state = HandshakeState::WaitingForS0S1;
        Ok(buf.freeze())
    }

    /// Process S0 + S1 and produce C2 (= S1 echoed verbatim)
    pub fn on_s0s1(&mut self, data: &[u8]) -> Result<Bytes> {
        if self.state != HandshakeState::WaitingForS0S1 {
            return Err(HandshakeError::InvalidState.into());
        }
        if data.len() < 1 + HANDSHAKE_SIZE {
            return Err(HandshakeError::ShortExchange.into());
        }

        let version = data[0];
        if version != RTMP_VERSION {
            return Err(HandshakeError::InvalidVersion(version).into());
        }

        let c2 = Bytes::copy_from_slice(&data[1..1 + HANDSHAKE_SIZE]);
        self.state = HandshakeState::WaitingForS2;
        Ok(c2)
    }

    /// Consume S2; content is not validated
    pub fn on_s2(&mut self, data: &[u8]) -> Result<()> {
        if self.state != HandshakeState::WaitingForS2 {
            return Err(HandshakeError::InvalidState.into());
        }
        if data.len() < HANDSHAKE_SIZE {
            return Err(HandshakeError::ShortExchange.into());
        }

        self.state = HandshakeState::Done;
        Ok(())
    }
}

impl Default for ClientHandshake {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate the C1 packet
///
/// Format (1536 bytes):
/// - Bytes 0-3: Timestamp (32-bit, big-endian)
/// - Bytes 4-7: Zero (simple handshake)
/// - Bytes 8-1535: Random data
fn generate_packet() -> [u8; HANDSHAKE_SIZE] {
    let mut packet = [0u8; HANDSHAKE_SIZE];

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0);

    packet[0..4].copy_from_slice(&timestamp.to_be_bytes());
    packet[4..8].copy_from_slice(&[0, 0, 0, 0]);

    // Random fill via an LCG seeded with the timestamp. The handshake does
    // not require cryptographic randomness.
    let mut seed = timestamp as u64 | 1;
    for chunk in packet[8..].chunks_mut(8) {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = seed.to_le_bytes();
        let len = chunk.len().min(8);
        chunk[..len].copy_from_slice(&bytes[..len]);
    }

    packet
}
