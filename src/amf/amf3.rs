//! AMF3 encoder and decoder
//!
//! AMF3 is the ActionScript 3.0 serialization format. RTMP carries it in
//! type-17 command messages. Strings, complex objects and traits each keep
//! their own reference table; an encoded reference integer has its low bit
//! cleared, a literal has its low bit set and carries length/count in the
//! remaining bits.
//!
//! Reference tables are scoped to a single message: call [`Amf3Encoder::finish`]
//! or [`Amf3Decoder::reset`] at message boundaries, otherwise references
//! alias across messages.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::value::{AmfValue, Properties};

// AMF3 type markers
const MARKER_UNDEFINED: u8 = 0x00;
const MARKER_NULL: u8 = 0x01;
const MARKER_FALSE: u8 = 0x02;
const MARKER_TRUE: u8 = 0x03;
const MARKER_INTEGER: u8 = 0x04;
const MARKER_DOUBLE: u8 = 0x05;
const MARKER_STRING: u8 = 0x06;
const MARKER_ARRAY: u8 = 0x09;
const MARKER_OBJECT: u8 = 0x0A;
const MARKER_BYTE_ARRAY: u8 = 0x0C;

/// Largest value representable in a U29 (2^29 - 1)
pub const U29_MAX: u32 = (1 << 29) - 1;

/// Write an AMF3 U29 variable-length integer (1-4 bytes)
///
/// Bytes 1-3 carry 7 payload bits each with the high bit as a continuation
/// flag; byte 4, if present, carries all 8 bits.
pub fn write_u29(buf: &mut BytesMut, value: u32) {
    let value = value & U29_MAX;
    if value < 0x80 {
        buf.put_u8(value as u8);
    } else if value < 0x4000 {
        buf.put_u8((((value >> 7) & 0x7F) | 0x80) as u8);
        buf.put_u8((value & 0x7F) as u8);
    } else if value < 0x20_0000 {
        buf.put_u8((((value >> 14) & 0x7F) | 0x80) as u8);
        buf.put_u8((((value >> 7) & 0x7F) | 0x80) as u8);
        buf.put_u8((value & 0x7F) as u8);
    } else {
        buf.put_u8((((value >> 22) & 0x7F) | 0x80) as u8);
        buf.put_u8((((value >> 15) & 0x7F) | 0x80) as u8);
        buf.put_u8((((value >> 8) & 0x7F) | 0x80) as u8);
        buf.put_u8((value & 0xFF) as u8);
    }
}

/// Read an AMF3 U29 variable-length integer
///
/// Returns `None` on truncated input.
pub fn read_u29(buf: &mut Bytes) -> Option<u32> {
    let mut result: u32 = 0;
    for i in 0..4 {
        if buf.is_empty() {
            return None;
        }
        let byte = buf.get_u8();
        if i < 3 {
            result = (result << 7) | (byte & 0x7F) as u32;
            if byte & 0x80 == 0 {
                return Some(result);
            }
        } else {
            result = (result << 8) | byte as u32;
        }
    }
    Some(result)
}

/// AMF3 encoder with per-message reference tables
pub struct Amf3Encoder {
    buf: BytesMut,
    string_table: Vec<String>,
    trait_table: Vec<Vec<String>>,
}

impl Amf3Encoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            string_table: Vec::new(),
            trait_table: Vec::new(),
        }
    }

    /// Take the encoded bytes and clear the reference tables for the next message
    pub fn finish(&mut self) -> Bytes {
        self.string_table.clear();
        self.trait_table.clear();
        self.buf.split().freeze()
    }

    /// Encode a single AMF3 value
    pub fn encode(&mut self, value: &AmfValue) {
        match value {
            AmfValue::Undefined => self.buf.put_u8(MARKER_UNDEFINED),
            AmfValue::Null => self.buf.put_u8(MARKER_NULL),
            AmfValue::Boolean(false) => self.buf.put_u8(MARKER_FALSE),
            AmfValue::Boolean(true) => self.buf.put_u8(MARKER_TRUE),
            AmfValue::Integer(i) => {
                self.buf.put_u8(MARKER_INTEGER);
                write_u29(&mut self.buf, *i as u32);
            }
            AmfValue::Number(n) => {
                self.buf.put_u8(MARKER_DOUBLE);
                self.buf.put_u64(n.to_bits());
            }
            AmfValue::String(s) | AmfValue::LongString(s) => {
                self.buf.put_u8(MARKER_STRING);
                self.write_string(s);
            }
            AmfValue::StrictArray(elements) => {
                self.buf.put_u8(MARKER_ARRAY);
                write_u29(&mut self.buf, ((elements.len() as u32) << 1) | 1);
                // Empty associative part
                self.write_string("");
                for elem in elements {
                    self.encode(elem);
                }
            }
            AmfValue::Object(props) | AmfValue::EcmaArray(props) => {
                self.buf.put_u8(MARKER_OBJECT);
                self.write_object(props);
            }
            AmfValue::ByteArray(data) => {
                self.buf.put_u8(MARKER_BYTE_ARRAY);
                write_u29(&mut self.buf, ((data.len() as u32) << 1) | 1);
                self.buf.put_slice(data);
            }
        }
    }

    /// Write a string payload: reference if already interned, literal otherwise
    ///
    /// The zero-length literal is the documented sentinel; empty strings are
    /// never added to the table.
    fn write_string(&mut self, s: &str) {
        if !s.is_empty() {
            if let Some(idx) = self.string_table.iter().position(|t| t == s) {
                write_u29(&mut self.buf, (idx as u32) << 1);
                return;
            }
        }

        write_u29(&mut self.buf, ((s.len() as u32) << 1) | 1);
        self.buf.put_slice(s.as_bytes());
        if !s.is_empty() {
            self.string_table.push(s.to_string());
        }
    }

    /// Write an object with trait reference or a new sealed trait
    fn write_object(&mut self, props: &Properties) {
        let keys: Vec<String> = props.iter().map(|(k, _)| k.clone()).collect();

        if let Some(idx) = self.trait_table.iter().position(|t| *t == keys) {
            // Existing trait: U29O-traits-ref
            write_u29(&mut self.buf, ((idx as u32) << 2) | 1);
        } else {
            // New trait: dynamic=0, externalizable=0, member-count in the high bits
            write_u29(&mut self.buf, ((keys.len() as u32) << 4) | 0x03);
            // Anonymous class
            self.write_string("");
            for key in keys.clone() {
                self.write_string(&key);
            }
            self.trait_table.push(keys);
        }

        for (_, value) in props {
            self.encode(value);
        }
    }
}

impl Default for Amf3Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// AMF3 decoder with per-message reference tables
pub struct Amf3Decoder {
    string_table: Vec<String>,
    object_table: Vec<AmfValue>,
    trait_table: Vec<Vec<String>>,
}

impl Amf3Decoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self {
            string_table: Vec::new(),
            object_table: Vec::new(),
            trait_table: Vec::new(),
        }
    }

    /// Clear the reference tables (call between messages)
    pub fn reset(&mut self) {
        self.string_table.clear();
        self.object_table.clear();
        self.trait_table.clear();
    }

    /// Decode a single AMF3 value from the buffer
    ///
    /// Returns `AmfValue::Null` on truncated input.
    pub fn decode(&mut self, buf: &mut Bytes) -> AmfValue {
        if buf.is_empty() {
            return AmfValue::Null;
        }

        let marker = buf.get_u8();
        match marker {
            MARKER_UNDEFINED => AmfValue::Undefined,
            MARKER_NULL => AmfValue::Null,
            MARKER_FALSE => AmfValue::Boolean(false),
            MARKER_TRUE => AmfValue::Boolean(true),
            MARKER_INTEGER => match read_u29(buf) {
                Some(raw) => AmfValue::Integer(sign_extend_u29(raw)),
                None => AmfValue::Null,
            },
            MARKER_DOUBLE => {
                if buf.remaining() < 8 {
                    return AmfValue::Null;
                }
                AmfValue::Number(f64::from_bits(buf.get_u64()))
            }
            MARKER_STRING => match self.read_string(buf) {
                Some(s) => AmfValue::String(s),
                None => AmfValue::Null,
            },
            MARKER_ARRAY => self.decode_array(buf),
            MARKER_OBJECT => self.decode_object(buf),
            MARKER_BYTE_ARRAY => self.decode_byte_array(buf),
            _ => AmfValue::Null,
        }
    }

    fn decode_array(&mut self, buf: &mut Bytes) -> AmfValue {
        let header = match read_u29(buf) {
            Some(h) => h,
            None => return AmfValue::Null,
        };

        if header & 1 == 0 {
            return self.object_reference(header >> 1);
        }

        let count = (header >> 1) as usize;

        // Associative part: key/value pairs until the empty-string sentinel.
        // The publish path never produces these; consume and drop.
        loop {
            match self.read_string(buf) {
                Some(key) if key.is_empty() => break,
                Some(_) => {
                    let _ = self.decode(buf);
                }
                None => return AmfValue::Null,
            }
        }

        let mut elements = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            if buf.is_empty() {
                break;
            }
            elements.push(self.decode(buf));
        }

        let arr = AmfValue::StrictArray(elements);
        self.object_table.push(arr.clone());
        arr
    }

    fn decode_object(&mut self, buf: &mut Bytes) -> AmfValue {
        let header = match read_u29(buf) {
            Some(h) => h,
            None => return AmfValue::Null,
        };

        if header & 1 == 0 {
            return self.object_reference(header >> 1);
        }

        let (keys, dynamic) = if header & 0x03 == 0x01 {
            // Trait reference
            let idx = (header >> 2) as usize;
            match self.trait_table.get(idx) {
                Some(keys) => (keys.clone(), false),
                None => return AmfValue::Null,
            }
        } else {
            // New trait: member count in the high bits, dynamic flag at bit 3
            let dynamic = (header >> 3) & 1 == 1;
            let count = (header >> 4) as usize;
            let _class_name = self.read_string(buf);
            let mut keys = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                match self.read_string(buf) {
                    Some(k) => keys.push(k),
                    None => return AmfValue::Null,
                }
            }
            self.trait_table.push(keys.clone());
            (keys, dynamic)
        };

        let mut props = Properties::with_capacity(keys.len());
        for key in keys {
            props.push((key, self.decode(buf)));
        }

        if dynamic {
            loop {
                match self.read_string(buf) {
                    Some(key) if key.is_empty() => break,
                    Some(key) => props.push((key, self.decode(buf))),
                    None => break,
                }
            }
        }

        let obj = AmfValue::Object(props);
        self.object_table.push(obj.clone());
        obj
    }

    fn decode_byte_array(&mut self, buf: &mut Bytes) -> AmfValue {
        let header = match read_u29(buf) {
            Some(h) => h,
            None => return AmfValue::Null,
        };

        if header & 1 == 0 {
            return self.object_reference(header >> 1);
        }

        let len = (header >> 1) as usize;
        if buf.remaining() < len {
            return AmfValue::Null;
        }

        let data = buf.copy_to_bytes(len).to_vec();
        let arr = AmfValue::ByteArray(data);
        self.object_table.push(arr.clone());
        arr
    }

    /// Resolve a complex-object reference; unresolved indices decode as Null
    fn object_reference(&self, idx: u32) -> AmfValue {
        self.object_table
            .get(idx as usize)
            .cloned()
            .unwrap_or(AmfValue::Null)
    }

    /// Read a string payload: reference or literal
    fn read_string(&mut self, buf: &mut Bytes) -> Option<String> {
        let header = read_u29(buf)?;

        if header & 1 == 0 {
            let idx = (header >> 1) as usize;
            return self.string_table.get(idx).cloned();
        }

        let len = (header >> 1) as usize;
        if buf.remaining() < len {
            return None;
        }

        let bytes = buf.copy_to_bytes(len);
        let s = String::from_utf8(bytes.to_vec()).ok()?;
        if !s.is_empty() {
            self.string_table.push(s.clone());
        }
        Some(s)
    }
}

impl Default for Amf3Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Sign-extend a 29-bit unsigned payload into an i32
fn sign_extend_u29(raw: u32) -> i32 {
    if raw & 0x1000_0000 != 0 {
        (raw | 0xE000_0000) as i32
    } else {
        raw as i32
    }
}
