//! AMF3 value types
//!
//! [`Amf3Value`] is the canonical in-memory representation for everything
//! the codec can read or write. Decoding always produces an `Amf3Value`;
//! typed views (such as the Flex message structs) are adapters over it.

use bytes::Bytes;

use crate::flex::FlexMessage;

/// Unified AMF3 value representation
#[derive(Debug, Clone, PartialEq)]
pub enum Amf3Value {
    /// Undefined sentinel (0x00)
    Undefined,

    /// Null value (0x01)
    Null,

    /// Boolean (0x02 false / 0x03 true)
    Boolean(bool),

    /// 29-bit signed integer (0x04), sign-extended on decode
    Integer(i32),

    /// IEEE 754 double-precision floating point (0x05)
    Double(f64),

    /// UTF-8 string (0x06)
    String(String),

    /// Legacy XMLDocument text (0x07)
    XmlDoc(String),

    /// Date as milliseconds since Unix epoch (0x08)
    Date(f64),

    /// Array (0x09) with ordered associative head and dense part
    Array {
        assoc: Vec<(String, Amf3Value)>,
        dense: Vec<Amf3Value>,
    },

    /// Typed object (0x0A): anonymous objects and classes without a
    /// registered externalizable reader
    Object(TypedObject),

    /// E4X XML text (0x0B)
    Xml(String),

    /// Raw byte array (0x0C)
    ByteArray(Bytes),

    /// Externalizable object (0x0A with external traits). `class_name`
    /// preserves the wire alias, e.g. `DSA` versus
    /// `flex.messaging.messages.AsyncMessageExt`.
    External {
        class_name: String,
        message: Box<FlexMessage>,
    },
}

impl Amf3Value {
    /// Try to get this value as a string reference
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Amf3Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Amf3Value::Double(n) => Some(*n),
            Amf3Value::Integer(i) => Some(f64::from(*i)),
            _ => None,
        }
    }

    /// Try to get this value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Amf3Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get this value's dense element list
    pub fn as_array(&self) -> Option<&[Amf3Value]> {
        match self {
            Amf3Value::Array { dense, .. } => Some(dense),
            _ => None,
        }
    }

    /// Check if this value is null or undefined
    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, Amf3Value::Null | Amf3Value::Undefined)
    }

    /// Get an associative member from an object or array value
    pub fn get(&self, key: &str) -> Option<&Amf3Value> {
        let assoc = match self {
            Amf3Value::Object(object) => &object.assoc,
            Amf3Value::Array { assoc, .. } => assoc,
            _ => return None,
        };
        assoc.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Get a string member from an object value
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    /// Get a numeric member from an object value
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_number()
    }

    /// Short name of the value's kind, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Amf3Value::Undefined => "undefined",
            Amf3Value::Null => "null",
            Amf3Value::Boolean(_) => "boolean",
            Amf3Value::Integer(_) => "integer",
            Amf3Value::Double(_) => "double",
            Amf3Value::String(_) => "string",
            Amf3Value::XmlDoc(_) => "xml-doc",
            Amf3Value::Date(_) => "date",
            Amf3Value::Array { .. } => "array",
            Amf3Value::Object(_) => "object",
            Amf3Value::Xml(_) => "xml",
            Amf3Value::ByteArray(_) => "byte-array",
            Amf3Value::External { .. } => "external",
        }
    }
}

impl Default for Amf3Value {
    fn default() -> Self {
        Amf3Value::Null
    }
}

impl From<bool> for Amf3Value {
    fn from(v: bool) -> Self {
        Amf3Value::Boolean(v)
    }
}

impl From<i32> for Amf3Value {
    fn from(v: i32) -> Self {
        Amf3Value::Integer(v)
    }
}

impl From<f64> for Amf3Value {
    fn from(v: f64) -> Self {
        Amf3Value::Double(v)
    }
}

impl From<String> for Amf3Value {
    fn from(v: String) -> Self {
        Amf3Value::String(v)
    }
}

impl From<&str> for Amf3Value {
    fn from(v: &str) -> Self {
        Amf3Value::String(v.to_string())
    }
}

impl<V: Into<Amf3Value>> From<Vec<V>> for Amf3Value {
    fn from(v: Vec<V>) -> Self {
        Amf3Value::Array {
            assoc: Vec::new(),
            dense: v.into_iter().map(|x| x.into()).collect(),
        }
    }
}

/// Decoded representation of a typed object when no externalizable
/// reader is registered for its class name.
///
/// Sealed members and the dynamic tail both land in `assoc`, in the order
/// they appeared on the wire. An empty `class_name` means anonymous.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypedObject {
    pub class_name: String,
    pub assoc: Vec<(String, Amf3Value)>,
}

impl TypedObject {
    /// Create an anonymous object
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an object with a class name
    pub fn with_class_name(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            assoc: Vec::new(),
        }
    }

    /// Get a member by exact name
    pub fn get(&self, key: &str) -> Option<&Amf3Value> {
        self.assoc.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Get a member by case-insensitive name
    pub fn get_ignore_case(&self, key: &str) -> Option<&Amf3Value> {
        self.assoc
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// Insert a member, replacing an existing one of the same name
    pub fn insert(&mut self, key: impl Into<String>, value: Amf3Value) {
        let key = key.into();
        match self.assoc.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.assoc.push((key, value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        let s = Amf3Value::String("test".into());
        assert_eq!(s.as_str(), Some("test"));
        assert_eq!(s.as_number(), None);

        let n = Amf3Value::Double(42.0);
        assert_eq!(n.as_number(), Some(42.0));
        assert_eq!(n.as_str(), None);

        let i = Amf3Value::Integer(-7);
        assert_eq!(i.as_number(), Some(-7.0));

        let mut object = TypedObject::new();
        object.insert("key", Amf3Value::String("value".into()));
        let o = Amf3Value::Object(object);
        assert_eq!(o.get_string("key"), Some("value"));
        assert_eq!(o.get("missing"), None);
    }

    #[test]
    fn test_from_conversions() {
        let v: Amf3Value = "test".into();
        assert!(matches!(v, Amf3Value::String(_)));

        let v: Amf3Value = 42.into();
        assert!(matches!(v, Amf3Value::Integer(42)));

        let v: Amf3Value = 1.5.into();
        assert!(matches!(v, Amf3Value::Double(_)));

        let v: Amf3Value = true.into();
        assert!(matches!(v, Amf3Value::Boolean(true)));

        let v: Amf3Value = vec![1, 2, 3].into();
        assert_eq!(v.as_array().map(|d| d.len()), Some(3));
    }

    #[test]
    fn test_typed_object_case_insensitive_lookup() {
        let mut object = TypedObject::with_class_name("com.example.User");
        object.insert("userName", Amf3Value::String("ada".into()));
        assert!(object.get("username").is_none());
        assert_eq!(
            object.get_ignore_case("USERNAME").and_then(|v| v.as_str()),
            Some("ada")
        );
    }

    #[test]
    fn test_insert_replaces() {
        let mut object = TypedObject::new();
        object.insert("k", Amf3Value::Integer(1));
        object.insert("k", Amf3Value::Integer(2));
        assert_eq!(object.assoc.len(), 1);
        assert_eq!(object.get("k"), Some(&Amf3Value::Integer(2)));
    }
}
