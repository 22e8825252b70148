//! AMF0 encoder and decoder
//!
//! AMF0 is the original Action Message Format used in Flash/RTMP.
//! Reference: AMF0 File Format Specification
//!
//! Type Markers:
//! ```text
//! 0x00 - Number (IEEE 754 double)
//! 0x01 - Boolean
//! 0x02 - String (UTF-8, 16-bit length prefix)
//! 0x03 - Object (key-value pairs until 0x000009)
//! 0x05 - Null
//! 0x06 - Undefined
//! 0x08 - ECMA Array (associative array)
//! 0x09 - Object End (0x000009 sequence)
//! 0x0A - Strict Array (dense array)
//! 0x0C - Long String (UTF-8, 32-bit length prefix)
//! ```
//!
//! Decoding never fails hard: a truncated buffer yields `AmfValue::Null`
//! and callers that care about completeness check the remaining length
//! after the call.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::value::{AmfValue, Properties};

// AMF0 type markers
const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_NULL: u8 = 0x05;
const MARKER_UNDEFINED: u8 = 0x06;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_STRICT_ARRAY: u8 = 0x0A;
const MARKER_LONG_STRING: u8 = 0x0C;

/// Longest string encodable with the 16-bit length prefix
const SHORT_STRING_MAX: usize = 0xFFFF;

/// AMF0 encoder
pub struct Amf0Encoder {
    buf: BytesMut,
}

impl Amf0Encoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Get the encoded bytes and reset encoder
    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Get current encoded length
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if encoder is empty
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Encode a single AMF0 value
    pub fn encode(&mut self, value: &AmfValue) {
        match value {
            AmfValue::Number(n) => {
                self.buf.put_u8(MARKER_NUMBER);
                self.buf.put_f64(*n);
            }
            AmfValue::Integer(i) => {
                // AMF0 has no integer type
                self.buf.put_u8(MARKER_NUMBER);
                self.buf.put_f64(*i as f64);
            }
            AmfValue::Boolean(b) => {
                self.buf.put_u8(MARKER_BOOLEAN);
                self.buf.put_u8(if *b { 1 } else { 0 });
            }
            AmfValue::String(s) => {
                if s.len() > SHORT_STRING_MAX {
                    self.buf.put_u8(MARKER_LONG_STRING);
                    self.buf.put_u32(s.len() as u32);
                } else {
                    self.buf.put_u8(MARKER_STRING);
                    self.buf.put_u16(s.len() as u16);
                }
                self.buf.put_slice(s.as_bytes());
            }
            AmfValue::LongString(s) => {
                self.buf.put_u8(MARKER_LONG_STRING);
                self.buf.put_u32(s.len() as u32);
                self.buf.put_slice(s.as_bytes());
            }
            AmfValue::Null => {
                self.buf.put_u8(MARKER_NULL);
            }
            AmfValue::Undefined => {
                self.buf.put_u8(MARKER_UNDEFINED);
            }
            AmfValue::Object(props) => {
                self.buf.put_u8(MARKER_OBJECT);
                self.encode_properties(props);
            }
            AmfValue::EcmaArray(props) => {
                self.buf.put_u8(MARKER_ECMA_ARRAY);
                self.buf.put_u32(props.len() as u32);
                self.encode_properties(props);
            }
            AmfValue::StrictArray(elements) => {
                self.buf.put_u8(MARKER_STRICT_ARRAY);
                self.buf.put_u32(elements.len() as u32);
                for elem in elements {
                    self.encode(elem);
                }
            }
            AmfValue::ByteArray(_) => {
                // ByteArray is AMF3-only
                self.buf.put_u8(MARKER_NULL);
            }
        }
    }

    /// Encode multiple values
    pub fn encode_all(&mut self, values: &[AmfValue]) {
        for value in values {
            self.encode(value);
        }
    }

    /// Encode properties in insertion order, terminated by `00 00 09`
    fn encode_properties(&mut self, props: &Properties) {
        for (key, val) in props {
            self.write_utf8(key);
            self.encode(val);
        }
        self.buf.put_u16(0);
        self.buf.put_u8(MARKER_OBJECT_END);
    }

    /// Write UTF-8 string with 16-bit length prefix (no type marker)
    fn write_utf8(&mut self, s: &str) {
        let len = s.len().min(SHORT_STRING_MAX);
        self.buf.put_u16(len as u16);
        self.buf.put_slice(&s.as_bytes()[..len]);
    }
}

impl Default for Amf0Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a single AMF0 value from the buffer
///
/// Returns `AmfValue::Null` on truncated input.
pub fn decode_value(buf: &mut Bytes) -> AmfValue {
    if buf.is_empty() {
        return AmfValue::Null;
    }

    let marker = buf.get_u8();
    match marker {
        MARKER_NUMBER => {
            if buf.remaining() < 8 {
                return AmfValue::Null;
            }
            AmfValue::Number(buf.get_f64())
        }
        MARKER_BOOLEAN => {
            if buf.is_empty() {
                return AmfValue::Null;
            }
            AmfValue::Boolean(buf.get_u8() != 0)
        }
        MARKER_STRING => match read_utf8(buf) {
            Some(s) => AmfValue::String(s),
            None => AmfValue::Null,
        },
        MARKER_OBJECT => AmfValue::Object(decode_properties(buf)),
        MARKER_NULL => AmfValue::Null,
        MARKER_UNDEFINED => AmfValue::Undefined,
        MARKER_ECMA_ARRAY => {
            if buf.remaining() < 4 {
                return AmfValue::Null;
            }
            // Count is a hint only; the body is sentinel-terminated
            let _count = buf.get_u32();
            AmfValue::EcmaArray(decode_properties(buf))
        }
        MARKER_STRICT_ARRAY => {
            if buf.remaining() < 4 {
                return AmfValue::Null;
            }
            let count = buf.get_u32() as usize;
            let mut elements = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                if buf.is_empty() {
                    break;
                }
                elements.push(decode_value(buf));
            }
            AmfValue::StrictArray(elements)
        }
        MARKER_LONG_STRING => match read_utf8_long(buf) {
            Some(s) => AmfValue::LongString(s),
            None => AmfValue::Null,
        },
        _ => AmfValue::Null,
    }
}

/// Decode all values from buffer until exhausted
pub fn decode_all(buf: &mut Bytes) -> Vec<AmfValue> {
    let mut values = Vec::new();
    while buf.has_remaining() {
        values.push(decode_value(buf));
    }
    values
}

/// Decode the body of an object or ECMA array until the end sentinel
fn decode_properties(buf: &mut Bytes) -> Properties {
    let mut props = Properties::new();

    loop {
        // End sentinel: empty key followed by the object-end marker
        if buf.remaining() >= 3 && buf[0] == 0 && buf[1] == 0 && buf[2] == MARKER_OBJECT_END {
            buf.advance(3);
            break;
        }

        let key = match read_utf8(buf) {
            Some(k) => k,
            None => break,
        };
        if buf.is_empty() {
            break;
        }
        let value = decode_value(buf);
        props.push((key, value));
    }

    props
}

/// Read UTF-8 string with 16-bit length prefix
fn read_utf8(buf: &mut Bytes) -> Option<String> {
    if buf.remaining() < 2 {
        return None;
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return None;
    }
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).ok()
}

/// Read UTF-8 string with 32-bit length prefix
fn read_utf8_long(buf: &mut Bytes) -> Option<String> {
    if buf.remaining() < 4 {
        return None;
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return None;
    }
    let bytes = buf.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).ok()
}

/// Convenience function to encode a single value
pub fn encode(value: &AmfValue) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode(value);
    encoder.finish()
}

/// Convenience function to encode multiple values
pub fn encode_all(values: &[AmfValue]) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode_all(values);
    encoder.finish()
}

/// Convenience function to decode a single value
pub fn decode(data: &[u8]) -> AmfValue {
    let mut buf = Bytes::copy_from_slice(data);
    decode_value(&mut buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: &AmfValue) -> AmfValue {
        let encoded = encode(value);
        let mut buf = Bytes::copy_from_slice(&encoded);
        let decoded = decode_value(&mut buf);
        assert!(buf.is_empty(), "decoder left {} bytes", buf.len());
        decoded
    }

    #[test]
    fn test_number_roundtrip() {
        let value = AmfValue::Number(42.5);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn test_number_byte_layout() {
        // 1.0 is 0x3FF0000000000000, written most-significant-byte first
        let encoded = encode(&AmfValue::Number(1.0));
        assert_eq!(
            &encoded[..],
            &[0x00, 0x3F, 0xF0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_string_byte_layout() {
        let encoded = encode(&AmfValue::String("connect".into()));
        assert_eq!(
            &encoded[..],
            &[0x02, 0x00, 0x07, 0x63, 0x6F, 0x6E, 0x6E, 0x65, 0x63, 0x74]
        );
    }

    #[test]
    fn test_scalar_roundtrips() {
        for value in [
            AmfValue::Boolean(true),
            AmfValue::Boolean(false),
            AmfValue::String("hello world".into()),
            AmfValue::Null,
            AmfValue::Undefined,
        ] {
            assert_eq!(roundtrip(&value), value);
        }
    }

    #[test]
    fn test_object_roundtrip_preserves_order() {
        let value = AmfValue::Object(vec![
            ("app".to_string(), AmfValue::String("live".into())),
            ("type".to_string(), AmfValue::String("nonprivate".into())),
            (
                "flashVer".to_string(),
                AmfValue::String("FMLE/3.0 (compatible; FMSc/1.0)".into()),
            ),
            (
                "tcUrl".to_string(),
                AmfValue::String("rtmp://127.0.0.1:1935/live".into()),
            ),
        ]);

        let decoded = roundtrip(&value);
        assert_eq!(decoded, value);

        let keys: Vec<&str> = decoded
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(keys, vec!["app", "type", "flashVer", "tcUrl"]);
    }

    #[test]
    fn test_object_end_sentinel() {
        let encoded = encode(&AmfValue::Object(vec![(
            "a".to_string(),
            AmfValue::Number(1.0),
        )]));
        assert_eq!(&encoded[encoded.len() - 3..], &[0x00, 0x00, 0x09]);
    }

    #[test]
    fn test_ecma_array_roundtrip() {
        let value = AmfValue::EcmaArray(vec![
            ("width".to_string(), AmfValue::Number(1920.0)),
            ("height".to_string(), AmfValue::Number(1080.0)),
        ]);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn test_strict_array_roundtrip() {
        let value = AmfValue::StrictArray(vec![
            AmfValue::Number(1.0),
            AmfValue::String("two".into()),
            AmfValue::Boolean(true),
        ]);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn test_nested_object_roundtrip() {
        let value = AmfValue::Object(vec![
            (
                "info".to_string(),
                AmfValue::Object(vec![(
                    "code".to_string(),
                    AmfValue::String("NetStream.Publish.Start".into()),
                )]),
            ),
            ("level".to_string(), AmfValue::String("status".into())),
        ]);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn test_long_string_roundtrip() {
        let long = "x".repeat(70_000);
        let encoded = encode(&AmfValue::String(long.clone()));
        assert_eq!(encoded[0], 0x0C);
        let decoded = decode(&encoded);
        assert_eq!(decoded, AmfValue::LongString(long));
    }

    #[test]
    fn test_truncated_input_yields_null() {
        // Number marker with only 4 of 8 payload bytes
        let decoded = decode(&[0x00, 0x3F, 0xF0, 0x00, 0x00]);
        assert_eq!(decoded, AmfValue::Null);

        // String marker with short payload
        let decoded = decode(&[0x02, 0x00, 0x05, b'a', b'b']);
        assert_eq!(decoded, AmfValue::Null);

        // Empty input
        let decoded = decode(&[]);
        assert_eq!(decoded, AmfValue::Null);
    }

    #[test]
    fn test_decode_all_multiple_values() {
        let values = vec![
            AmfValue::String("connect".into()),
            AmfValue::Number(1.0),
            AmfValue::Null,
        ];

        let encoded = encode_all(&values);
        let mut buf = Bytes::copy_from_slice(&encoded);
        let decoded = decode_all(&mut buf);
        assert_eq!(decoded, values);
    }
}
