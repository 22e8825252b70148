//! Media handling for the publish path
//!
//! FLV tag reading is the only media concern of a publishing client: tag
//! payloads are forwarded to the server verbatim, without codec parsing.

pub mod flv;

pub use flv::{FlvReader, FlvTag, FlvTagType};
