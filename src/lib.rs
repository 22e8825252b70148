//! rtmp-publisher: RTMP publishing client
//!
//! A one-way streaming component that opens a TCP connection to an RTMP
//! server, negotiates the handshake, establishes a publish session and
//! pushes media from a pre-recorded FLV file to the server in real time.
//!
//! # Example
//!
//! ```no_run
//! use rtmp_publisher::{PublisherConfig, RtmpPublisher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut publisher = RtmpPublisher::with_config(PublisherConfig::default());
//!
//!     publisher
//!         .connect_with_retry("rtmp://localhost:1935/live/stream-key", 3)
//!         .await?;
//!     publisher.start_heartbeat();
//!
//!     publisher.publish_file("recording.flv").await?;
//!
//!     publisher.stop_heartbeat().await;
//!     publisher.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod amf;
pub mod client;
pub mod error;
pub mod media;
pub mod protocol;
pub mod stats;

// Re-export main types for convenience
pub use client::{ConfigFile, ConnectionState, PublisherConfig, RtmpPublisher, RtmpUrl};
pub use error::{Error, Result};
pub use media::{FlvReader, FlvTag, FlvTagType};
pub use stats::Statistics;
