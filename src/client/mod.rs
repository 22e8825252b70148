//! RTMP publishing client
//!
//! Provides the session engine that connects to an RTMP server,
//! establishes a publish session and pushes FLV media in real time.

pub mod config;
mod heartbeat;
pub mod session;

pub use config::{ConfigFile, PublisherConfig, RtmpUrl};
pub use session::{ConnectionState, RtmpPublisher};
