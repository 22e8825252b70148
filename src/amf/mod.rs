//! AMF (Action Message Format) implementation
//!
//! AMF is Adobe's binary serialization format used in RTMP for encoding
//! command parameters and metadata. This module implements both AMF0
//! (original format) and AMF3 (ActionScript 3.0 format).
//!
//! The publish sequence uses AMF0 exclusively; AMF3 is needed to decode
//! type-17 command messages a server may send.

pub mod amf0;
pub mod amf3;
pub mod value;

pub use amf0::Amf0Encoder;
pub use amf3::{Amf3Decoder, Amf3Encoder};
pub use value::{AmfValue, Properties};
