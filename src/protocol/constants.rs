//! RTMP protocol constants
//!
//! Reference: Adobe RTMP Specification (December 2012)

/// RTMP version number (always 3 for standard RTMP)
pub const RTMP_VERSION: u8 = 3;

/// Default RTMP port
pub const RTMP_PORT: u16 = 1935;

/// Handshake packet size (C1/C2/S1/S2)
pub const HANDSHAKE_SIZE: usize = 1536;

/// Default chunk size (per RTMP spec)
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Chunk size advertised once the session is connected (reduces header overhead)
pub const RECOMMENDED_CHUNK_SIZE: u32 = 4096;

/// Maximum chunk size allowed
pub const MAX_CHUNK_SIZE: u32 = 0xFFFFFF;

/// Maximum message size (sanity limit)
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Timestamps at or above this value use the extended timestamp field
pub const EXTENDED_TIMESTAMP_THRESHOLD: u32 = 0xFFFFFF;

/// Default window acknowledgement size (2.5 MB)
pub const DEFAULT_WINDOW_ACK_SIZE: u32 = 2_500_000;

// ============================================================================
// Chunk Stream IDs (CSID)
// RTMP spec section 5.3.1.1; fixed assignments for the publishing client
// ============================================================================

/// Protocol control messages (Set Chunk Size, Ack, etc.)
pub const CSID_PROTOCOL_CONTROL: u32 = 2;

/// Command messages (connect, createStream, publish)
pub const CSID_COMMAND: u32 = 3;

/// Audio data
pub const CSID_AUDIO: u32 = 4;

/// Video data
pub const CSID_VIDEO: u32 = 5;

/// Script/metadata data
pub const CSID_METADATA: u32 = 6;

// ============================================================================
// Message Type IDs
// RTMP spec section 5.4
// ============================================================================

/// Set Chunk Size (1) - protocol control
pub const MSG_SET_CHUNK_SIZE: u8 = 1;

/// Abort Message (2) - protocol control
pub const MSG_ABORT: u8 = 2;

/// Acknowledgement (3) - protocol control
pub const MSG_ACKNOWLEDGEMENT: u8 = 3;

/// User Control Message (4) - protocol control
pub const MSG_USER_CONTROL: u8 = 4;

/// Window Acknowledgement Size (5) - protocol control
pub const MSG_WINDOW_ACK_SIZE: u8 = 5;

/// Set Peer Bandwidth (6) - protocol control
pub const MSG_SET_PEER_BANDWIDTH: u8 = 6;

/// Audio Message (8)
pub const MSG_AUDIO: u8 = 8;

/// Video Message (9)
pub const MSG_VIDEO: u8 = 9;

/// AMF3 Command Message (17)
pub const MSG_COMMAND_AMF3: u8 = 17;

/// AMF0 Data Message (18) - onMetaData / script tags
pub const MSG_DATA_AMF0: u8 = 18;

/// AMF0 Command Message (20) - connect, createStream, publish, _result
pub const MSG_COMMAND_AMF0: u8 = 20;

// ============================================================================
// User Control Event Types
// RTMP spec section 5.4.1
// ============================================================================

/// Stream Begin - server sends when stream becomes functional
pub const UC_STREAM_BEGIN: u16 = 0;

/// Stream EOF
pub const UC_STREAM_EOF: u16 = 1;

/// Stream Dry - no more data available
pub const UC_STREAM_DRY: u16 = 2;

/// Ping Request
pub const UC_PING_REQUEST: u16 = 6;

/// Ping Response
pub const UC_PING_RESPONSE: u16 = 7;

// ============================================================================
// Command Names
// ============================================================================

pub const CMD_CONNECT: &str = "connect";
pub const CMD_CREATE_STREAM: &str = "createStream";
pub const CMD_PUBLISH: &str = "publish";

/// Response commands
pub const CMD_RESULT: &str = "_result";
pub const CMD_ERROR: &str = "_error";

/// Status notification
pub const CMD_ON_STATUS: &str = "onStatus";

// ============================================================================
// Publish Session Strings
// ============================================================================

/// Connect-object `type` value
pub const CONNECT_TYPE_NONPRIVATE: &str = "nonprivate";

/// Connect-object `flashVer` value (the FMLE identity most servers expect)
pub const FLASH_VERSION: &str = "FMLE/3.0 (compatible; FMSc/1.0)";

/// Publish mode for live streaming
pub const PUBLISH_MODE_LIVE: &str = "live";

// ============================================================================
// NetStream Status Codes
// ============================================================================

pub const NS_PUBLISH_START: &str = "NetStream.Publish.Start";
pub const NC_CONNECT_SUCCESS: &str = "NetConnection.Connect.Success";
