//! AMF value types
//!
//! Both AMF0 and AMF3 share a common value representation. This enum
//! provides a unified type that can be serialized to either format.
//!
//! Objects and ECMA arrays are stored as ordered property lists rather than
//! hash maps: RTMP command encoding must be deterministic, and `onStatus`
//! code matching depends on properties surviving a round trip in their
//! original order.

/// Ordered key/value property list used by objects and ECMA arrays
pub type Properties = Vec<(String, AmfValue)>;

/// Unified AMF value representation
#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    /// IEEE 754 double-precision floating point (AMF0: 0x00, AMF3: 0x05)
    Number(f64),

    /// Boolean value (AMF0: 0x01, AMF3: 0x02/0x03)
    Boolean(bool),

    /// UTF-8 string with 16-bit length prefix (AMF0: 0x02, AMF3: 0x06)
    String(String),

    /// Null value (AMF0: 0x05, AMF3: 0x01)
    Null,

    /// Undefined value (AMF0: 0x06, AMF3: 0x00)
    Undefined,

    /// Key-value object with insertion-ordered properties (AMF0: 0x03, AMF3: 0x0A)
    Object(Properties),

    /// Associative array with a count hint (AMF0: 0x08)
    EcmaArray(Properties),

    /// Dense array (AMF0: 0x0A, AMF3: 0x09)
    StrictArray(Vec<AmfValue>),

    /// UTF-8 string with 32-bit length prefix (AMF0: 0x0C)
    LongString(String),

    /// 29-bit signed integer (AMF3 only: 0x04)
    Integer(i32),

    /// Raw byte array (AMF3 only: 0x0C)
    ByteArray(Vec<u8>),
}

impl AmfValue {
    /// Try to get this value as a string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) | AmfValue::LongString(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Number(n) => Some(*n),
            AmfValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get this value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AmfValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get this value's ordered properties
    pub fn as_object(&self) -> Option<&Properties> {
        match self {
            AmfValue::Object(p) | AmfValue::EcmaArray(p) => Some(p),
            _ => None,
        }
    }

    /// Check if this value is null or undefined
    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, AmfValue::Null | AmfValue::Undefined)
    }

    /// Get a property from an object value by key (first match)
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.as_object()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Get a string property from an object value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    /// Get a number property from an object value
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_number()
    }
}

impl Default for AmfValue {
    fn default() -> Self {
        AmfValue::Null
    }
}

impl From<bool> for AmfValue {
    fn from(v: bool) -> Self {
        AmfValue::Boolean(v)
    }
}

impl From<f64> for AmfValue {
    fn from(v: f64) -> Self {
        AmfValue::Number(v)
    }
}

impl From<u32> for AmfValue {
    fn from(v: u32) -> Self {
        AmfValue::Number(v as f64)
    }
}

impl From<String> for AmfValue {
    fn from(v: String) -> Self {
        AmfValue::String(v)
    }
}

impl From<&str> for AmfValue {
    fn from(v: &str) -> Self {
        AmfValue::String(v.to_string())
    }
}

impl<V: Into<AmfValue>> From<Vec<V>> for AmfValue {
    fn from(v: Vec<V>) -> Self {
        AmfValue::StrictArray(v.into_iter().map(|x| x.into()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        let s = AmfValue::String("test".into());
        assert_eq!(s.as_str(), Some("test"));
        assert_eq!(s.as_number(), None);

        let long = AmfValue::LongString("big".into());
        assert_eq!(long.as_str(), Some("big"));

        let n = AmfValue::Number(42.0);
        assert_eq!(n.as_number(), Some(42.0));
        assert_eq!(n.as_str(), None);

        let i = AmfValue::Integer(-7);
        assert_eq!(i.as_number(), Some(-7.0));

        let obj = AmfValue::Object(vec![("key".to_string(), AmfValue::String("value".into()))]);
        assert_eq!(obj.get_str("key"), Some("value"));
        assert_eq!(obj.get("missing"), None);
    }

    #[test]
    fn test_object_preserves_insertion_order() {
        let obj = AmfValue::Object(vec![
            ("app".to_string(), AmfValue::String("live".into())),
            ("type".to_string(), AmfValue::String("nonprivate".into())),
            ("flashVer".to_string(), AmfValue::String("FMLE/3.0".into())),
        ]);

        let keys: Vec<&str> = obj
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(keys, vec!["app", "type", "flashVer"]);
    }

    #[test]
    fn test_from_conversions() {
        let v: AmfValue = "test".into();
        assert!(matches!(v, AmfValue::String(_)));

        let v: AmfValue = 42.0.into();
        assert!(matches!(v, AmfValue::Number(_)));

        let v: AmfValue = true.into();
        assert!(matches!(v, AmfValue::Boolean(true)));

        let v: AmfValue = vec![1.0, 2.0].into();
        assert!(matches!(v, AmfValue::StrictArray(ref a) if a.len() == 2));
    }
}
