//! Unified error types for rtmp-publisher

use std::fmt;
use std::io;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all publishing operations
#[derive(Debug)]
pub enum Error {
    /// I/O error during network or file operations
    Io(io::Error),
    /// RTMP URL could not be parsed
    Url(String),
    /// Handshake failure
    Handshake(HandshakeError),
    /// RTMP protocol violation
    Protocol(ProtocolError),
    /// Server rejected the publish (onStatus with an error code)
    Publish(String),
    /// FLV container parsing error
    Flv(FlvError),
    /// Operation timed out
    Timeout,
    /// Connection was closed by the peer
    ConnectionClosed,
    /// Invalid configuration
    Config(String),
    /// Internal invariant violated; indicates a bug
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Url(msg) => write!(f, "Invalid RTMP URL: {}", msg),
            Error::Handshake(e) => write!(f, "Handshake error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Publish(code) => write!(f, "Publish rejected: {}", code),
            Error::Flv(e) => write!(f, "FLV error: {}", e),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::ConnectionClosed => write!(f, "Connection closed"),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<HandshakeError> for Error {
    fn from(err: HandshakeError) -> Self {
        Error::Handshake(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<FlvError> for Error {
    fn from(err: FlvError) -> Self {
        Error::Flv(err)
    }
}

/// Handshake-specific errors
#[derive(Debug)]
pub enum HandshakeError {
    InvalidVersion(u8),
    ShortExchange,
    InvalidState,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::InvalidVersion(v) => write!(f, "Invalid RTMP version: {}", v),
            HandshakeError::ShortExchange => write!(f, "Short read during handshake"),
            HandshakeError::InvalidState => write!(f, "Invalid handshake state"),
        }
    }
}

impl std::error::Error for HandshakeError {}

/// Protocol-level errors
#[derive(Debug)]
pub enum ProtocolError {
    InvalidChunkHeader,
    InvalidChunkSize(u32),
    MessageTooLarge { size: u32, max: u32 },
    TruncatedMessage(&'static str),
    UnexpectedCommand(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::InvalidChunkHeader => write!(f, "Invalid chunk header"),
            ProtocolError::InvalidChunkSize(s) => write!(f, "Invalid chunk size: {}", s),
            ProtocolError::MessageTooLarge { size, max } => {
                write!(f, "Message too large: {} bytes (max {})", size, max)
            }
            ProtocolError::TruncatedMessage(what) => write!(f, "Truncated {} message", what),
            ProtocolError::UnexpectedCommand(cmd) => write!(f, "Unexpected command: {}", cmd),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// FLV container errors
#[derive(Debug)]
pub enum FlvError {
    MissingSignature,
    ShortHeader,
}

impl fmt::Display for FlvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlvError::MissingSignature => write!(f, "Missing FLV signature"),
            FlvError::ShortHeader => write!(f, "Short FLV header"),
        }
    }
}

impl std::error::Error for FlvError {}
