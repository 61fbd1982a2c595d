//! AMF3 decoder
//!
//! AMF3 is the ActionScript 3.0 serialization format used by Flex
//! messaging. Reference: AMF3 File Format Specification.
//!
//! Type Markers:
//! ```text
//! 0x00 - Undefined
//! 0x01 - Null
//! 0x02 - False
//! 0x03 - True
//! 0x04 - Integer (U29, 29-bit signed)
//! 0x05 - Double (IEEE 754)
//! 0x06 - String (U29 reference-or-length prefix)
//! 0x07 - XMLDocument (legacy)
//! 0x08 - Date (double, ms since epoch)
//! 0x09 - Array (associative head + dense part)
//! 0x0A - Object (traits + sealed members + dynamic tail)
//! 0x0B - XML
//! 0x0C - ByteArray
//! ```
//!
//! Strings, objects, and traits are deduplicated through per-session
//! reference tables; a U29 prefix with a clear low bit is an index into
//! the matching table instead of an inline body.

use bytes::{Buf, Bytes};
use std::sync::Arc;

use crate::error::{AmfError, Result};
use crate::marker;
use crate::reftable::RefTable;
use crate::traits::{default_traits_mapper, Traits, TraitsMapper};
use crate::value::{Amf3Value, TypedObject};

/// Maximum nesting depth for objects/arrays (prevent stack overflow)
const MAX_NESTING_DEPTH: usize = 64;

/// AMF3 decoder with per-session reference tables
pub struct Amf3Decoder {
    /// Non-empty strings in first-appearance order
    string_refs: RefTable<String>,
    /// Arrays, objects, dates, XML, and byte arrays in visit order
    object_refs: RefTable<Amf3Value>,
    /// Traits in first-appearance order
    traits_refs: RefTable<Traits>,
    /// Class registry override; `None` uses the process-wide default
    mapper: Option<Arc<TraitsMapper>>,
    /// Current nesting depth
    depth: usize,
}

impl Amf3Decoder {
    /// Create a new decoder using the default traits mapper
    pub fn new() -> Self {
        Self {
            string_refs: RefTable::new(),
            object_refs: RefTable::new(),
            traits_refs: RefTable::new(),
            mapper: None,
            depth: 0,
        }
    }

    /// Create a decoder with a custom traits mapper
    pub fn with_mapper(mapper: Arc<TraitsMapper>) -> Self {
        Self {
            mapper: Some(mapper),
            ..Self::new()
        }
    }

    /// Reset decoder state (call between messages)
    pub fn reset(&mut self) {
        self.string_refs.clear();
        self.object_refs.clear();
        self.traits_refs.clear();
        self.depth = 0;
    }

    /// Decode a single AMF3 value from the buffer
    pub fn decode(&mut self, buf: &mut Bytes) -> Result<Amf3Value> {
        if buf.is_empty() {
            return Err(AmfError::UnexpectedEof);
        }

        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(AmfError::NestingTooDeep);
        }

        let marker = buf.get_u8();
        let result = self.decode_value(marker, buf);
        self.depth -= 1;
        result
    }

    /// Decode all values from buffer until exhausted
    pub fn decode_all(&mut self, buf: &mut Bytes) -> Result<Vec<Amf3Value>> {
        let mut values = Vec::new();
        while buf.has_remaining() {
            values.push(self.decode(buf)?);
        }
        Ok(values)
    }

    fn decode_value(&mut self, marker: u8, buf: &mut Bytes) -> Result<Amf3Value> {
        tracing::trace!(marker, "decoding AMF3 value");
        match marker {
            marker::UNDEFINED => Ok(Amf3Value::Undefined),
            marker::NULL => Ok(Amf3Value::Null),
            marker::FALSE => Ok(Amf3Value::Boolean(false)),
            marker::TRUE => Ok(Amf3Value::Boolean(true)),
            marker::INTEGER => self.decode_integer(buf),
            marker::DOUBLE => self.decode_double(buf),
            marker::STRING => Ok(Amf3Value::String(self.read_string(buf)?)),
            marker::XML_DOC => self.decode_xml(marker, buf),
            marker::DATE => self.decode_date(buf),
            marker::ARRAY => self.decode_array(buf),
            marker::OBJECT => self.decode_object(buf),
            marker::XML => self.decode_xml(marker, buf),
            marker::BYTE_ARRAY => self.decode_byte_array(buf),
            _ => Err(AmfError::UnknownMarker(marker)),
        }
    }

    /// Read a single byte
    pub fn read_u8(&mut self, buf: &mut Bytes) -> Result<u8> {
        if buf.is_empty() {
            return Err(AmfError::UnexpectedEof);
        }
        Ok(buf.get_u8())
    }

    /// Read a variable-length 29-bit unsigned integer
    ///
    /// The high bit of each of the first three bytes is a continuation
    /// flag over its low 7 bits; a fourth byte, if present, contributes
    /// all 8 bits.
    pub fn read_u29(&mut self, buf: &mut Bytes) -> Result<u32> {
        let mut v: u32 = 0;
        for _ in 0..3 {
            let b = self.read_u8(buf)?;
            v = (v << 7) | u32::from(b & 0x7F);
            if b & 0x80 == 0 {
                return Ok(v);
            }
        }
        let b = self.read_u8(buf)?;
        Ok((v << 8) | u32::from(b))
    }

    /// Read a U29-prefixed string: reference if the low bit is clear,
    /// inline UTF-8 of `prefix >> 1` bytes otherwise
    pub fn read_string(&mut self, buf: &mut Bytes) -> Result<String> {
        let prefix = self.read_u29(buf)?;
        if prefix & 1 == 0 {
            return Ok(self.string_refs.get((prefix >> 1) as usize)?.clone());
        }

        let len = (prefix >> 1) as usize;
        if buf.remaining() < len {
            return Err(AmfError::UnexpectedEof);
        }
        let bytes = buf.copy_to_bytes(len);
        let s = String::from_utf8(bytes.to_vec()).map_err(|_| AmfError::InvalidUtf8)?;

        // The empty string is always inline and never interned.
        if !s.is_empty() {
            self.string_refs.add(s.clone());
        }
        Ok(s)
    }

    fn decode_integer(&mut self, buf: &mut Bytes) -> Result<Amf3Value> {
        let raw = self.read_u29(buf)?;
        // The payload is a signed value in [-2^28, 2^28): bit 28 is the
        // sign bit of the 29-bit space.
        let n = if raw & 0x1000_0000 != 0 {
            raw as i32 - 0x2000_0000
        } else {
            raw as i32
        };
        Ok(Amf3Value::Integer(n))
    }

    fn decode_double(&mut self, buf: &mut Bytes) -> Result<Amf3Value> {
        if buf.remaining() < 8 {
            return Err(AmfError::UnexpectedEof);
        }
        Ok(Amf3Value::Double(buf.get_f64()))
    }

    fn decode_date(&mut self, buf: &mut Bytes) -> Result<Amf3Value> {
        let prefix = self.read_u29(buf)?;
        if prefix & 1 == 0 {
            return Ok(self.object_refs.get((prefix >> 1) as usize)?.clone());
        }

        if buf.remaining() < 8 {
            return Err(AmfError::UnexpectedEof);
        }
        let millis = buf.get_f64();
        let value = Amf3Value::Date(millis);
        self.object_refs.add(value.clone());
        Ok(value)
    }

    fn decode_xml(&mut self, marker: u8, buf: &mut Bytes) -> Result<Amf3Value> {
        let prefix = self.read_u29(buf)?;
        if prefix & 1 == 0 {
            return Ok(self.object_refs.get((prefix >> 1) as usize)?.clone());
        }

        let len = (prefix >> 1) as usize;
        if buf.remaining() < len {
            return Err(AmfError::UnexpectedEof);
        }
        let bytes = buf.copy_to_bytes(len);
        let text = String::from_utf8(bytes.to_vec()).map_err(|_| AmfError::InvalidUtf8)?;

        let value = if marker == marker::XML_DOC {
            Amf3Value::XmlDoc(text)
        } else {
            Amf3Value::Xml(text)
        };
        self.object_refs.add(value.clone());
        Ok(value)
    }

    fn decode_byte_array(&mut self, buf: &mut Bytes) -> Result<Amf3Value> {
        let prefix = self.read_u29(buf)?;
        if prefix & 1 == 0 {
            return Ok(self.object_refs.get((prefix >> 1) as usize)?.clone());
        }

        let len = (prefix >> 1) as usize;
        if buf.remaining() < len {
            return Err(AmfError::UnexpectedEof);
        }
        let value = Amf3Value::ByteArray(buf.copy_to_bytes(len));
        self.object_refs.add(value.clone());
        Ok(value)
    }

    fn decode_array(&mut self, buf: &mut Bytes) -> Result<Amf3Value> {
        let prefix = self.read_u29(buf)?;
        if prefix & 1 == 0 {
            return Ok(self.object_refs.get((prefix >> 1) as usize)?.clone());
        }
        let dense_len = (prefix >> 1) as usize;

        // The slot must exist before any member is read so that nested
        // back-references land on the right index.
        let slot = self.object_refs.reserve();

        let mut assoc = Vec::new();
        loop {
            let key = self.read_string(buf)?;
            if key.is_empty() {
                break;
            }
            let value = self.decode(buf)?;
            assoc.push((key, value));
        }

        let mut dense = Vec::with_capacity(dense_len.min(1024)); // Cap initial allocation
        for _ in 0..dense_len {
            dense.push(self.decode(buf)?);
        }

        let value = Amf3Value::Array { assoc, dense };
        self.object_refs.fill(slot, value.clone());
        Ok(value)
    }

    fn decode_object(&mut self, buf: &mut Bytes) -> Result<Amf3Value> {
        let prefix = self.read_u29(buf)?;
        if prefix & 1 == 0 {
            return Ok(self.object_refs.get((prefix >> 1) as usize)?.clone());
        }

        let traits = if prefix & 3 == 1 {
            self.traits_refs.get((prefix >> 2) as usize)?.clone()
        } else {
            self.read_traits(prefix, buf)?
        };

        if traits.external {
            tracing::trace!(class = %traits.class_name, "delegating to externalizable reader");
            let slot = self.object_refs.reserve();
            let read = match self
                .mapper()
                .find_by_class_name(&traits.class_name)
                .and_then(|defined| defined.read_external)
            {
                Some(read) => read,
                None => return Err(AmfError::UnknownExternalClass(traits.class_name.clone())),
            };
            let value = read(self, buf, &traits.class_name)?;
            self.object_refs.fill(slot, value.clone());
            return Ok(value);
        }

        let slot = self.object_refs.reserve();
        let mut object = TypedObject::with_class_name(traits.class_name.clone());

        for name in &traits.members {
            let value = self.decode(buf)?;
            object.assoc.push((name.clone(), value));
        }

        if traits.dynamic {
            loop {
                let key = self.read_string(buf)?;
                if key.is_empty() {
                    break;
                }
                let value = self.decode(buf)?;
                object.assoc.push((key, value));
            }
        }

        let value = Amf3Value::Object(object);
        self.object_refs.fill(slot, value.clone());
        Ok(value)
    }

    /// Read an inline traits descriptor and intern it
    fn read_traits(&mut self, prefix: u32, buf: &mut Bytes) -> Result<Traits> {
        let mut traits = Traits::default();

        if prefix & 4 != 0 {
            traits.external = true;
        } else {
            traits.dynamic = (prefix >> 3) & 1 == 1;
        }

        traits.class_name = self.read_string(buf)?;

        if !traits.external {
            let nmemb = (prefix >> 4) as usize;
            for _ in 0..nmemb {
                traits.members.push(self.read_string(buf)?);
            }
        }

        self.traits_refs.add(traits.clone());
        Ok(traits)
    }

    fn mapper(&self) -> &TraitsMapper {
        match &self.mapper {
            Some(mapper) => mapper,
            None => default_traits_mapper(),
        }
    }
}

impl Default for Amf3Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience function to decode a single value
pub fn decode(data: &[u8]) -> Result<Amf3Value> {
    let mut decoder = Amf3Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode(&mut buf)
}

/// Convenience function to decode all values
pub fn decode_all(data: &[u8]) -> Result<Vec<Amf3Value>> {
    let mut decoder = Amf3Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode_all(&mut buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u29(data: &[u8]) -> u32 {
        let mut decoder = Amf3Decoder::new();
        let mut buf = Bytes::copy_from_slice(data);
        decoder.read_u29(&mut buf).unwrap()
    }

    #[test]
    fn test_u29_widths() {
        assert_eq!(read_u29(&[0x00]), 0);
        assert_eq!(read_u29(&[0x7F]), 0x7F);
        assert_eq!(read_u29(&[0x81, 0x00]), 0x80);
        assert_eq!(read_u29(&[0xFF, 0x7F]), 0x3FFF);
        assert_eq!(read_u29(&[0x81, 0x80, 0x00]), 0x4000);
        assert_eq!(read_u29(&[0xFF, 0xFF, 0x7F]), 0x1F_FFFF);
        assert_eq!(read_u29(&[0x80, 0xC0, 0x80, 0x00]), 0x20_0000);
        assert_eq!(read_u29(&[0xFF, 0xFF, 0xFF, 0xFF]), 0x1FFF_FFFF);
    }

    #[test]
    fn test_primitives() {
        assert_eq!(decode(&[0x00]).unwrap(), Amf3Value::Undefined);
        assert_eq!(decode(&[0x01]).unwrap(), Amf3Value::Null);
        assert_eq!(decode(&[0x02]).unwrap(), Amf3Value::Boolean(false));
        assert_eq!(decode(&[0x03]).unwrap(), Amf3Value::Boolean(true));
        assert_eq!(decode(&[0x04, 0x00]).unwrap(), Amf3Value::Integer(0));
        assert_eq!(decode(&[0x04, 0x81, 0x00]).unwrap(), Amf3Value::Integer(128));
        assert_eq!(
            decode(&[0x05, 0x3F, 0xF8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]).unwrap(),
            Amf3Value::Double(1.5)
        );
    }

    #[test]
    fn test_integer_sign_extension() {
        assert_eq!(
            decode(&[0x04, 0xFF, 0xFF, 0xFF, 0xFF]).unwrap(),
            Amf3Value::Integer(-1)
        );
        // 0x10000000 is the most negative 29-bit value
        assert_eq!(
            decode(&[0x04, 0xC0, 0x80, 0x80, 0x00]).unwrap(),
            Amf3Value::Integer(-0x1000_0000)
        );
    }

    #[test]
    fn test_string_inline_and_reference() {
        // ["ab", back-reference to "ab"]
        let data = [
            0x09, 0x05, 0x01, // array, 2 dense, no assoc
            0x06, 0x05, 0x61, 0x62, // "ab" inline
            0x06, 0x00, // string reference 0
        ];
        let value = decode(&data).unwrap();
        let dense = value.as_array().unwrap();
        assert_eq!(dense[0], Amf3Value::String("ab".into()));
        assert_eq!(dense[1], Amf3Value::String("ab".into()));
    }

    #[test]
    fn test_empty_string_never_interned() {
        let mut decoder = Amf3Decoder::new();
        let mut buf = Bytes::copy_from_slice(&[0x06, 0x01, 0x06, 0x03, 0x61, 0x06, 0x00]);
        assert_eq!(
            decoder.decode(&mut buf).unwrap(),
            Amf3Value::String(String::new())
        );
        assert_eq!(decoder.decode(&mut buf).unwrap(), Amf3Value::String("a".into()));
        // Index 0 is "a", not ""
        assert_eq!(decoder.decode(&mut buf).unwrap(), Amf3Value::String("a".into()));
    }

    #[test]
    fn test_date() {
        // 1.0 ms since epoch
        let data = [0x08, 0x01, 0x3F, 0xF0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(decode(&data).unwrap(), Amf3Value::Date(1.0));
    }

    #[test]
    fn test_byte_array() {
        let data = [0x0C, 0x07, 0x01, 0x02, 0x03];
        assert_eq!(
            decode(&data).unwrap(),
            Amf3Value::ByteArray(Bytes::from_static(&[0x01, 0x02, 0x03]))
        );
    }

    #[test]
    fn test_xml_uses_object_table() {
        // XML "<a/>" then an object back-reference to it
        let data = [
            0x09, 0x05, 0x01, // array, 2 dense
            0x0B, 0x09, 0x3C, 0x61, 0x2F, 0x3E, // inline XML, object index 1
            0x0B, 0x02, // reference 1
        ];
        let value = decode(&data).unwrap();
        let dense = value.as_array().unwrap();
        assert_eq!(dense[0], Amf3Value::Xml("<a/>".into()));
        assert_eq!(dense[1], dense[0]);
    }

    #[test]
    fn test_array_with_associative_head() {
        let data = [
            0x09, 0x03, // array, 1 dense element
            0x03, 0x6B, // key "k"
            0x04, 0x01, // value 1
            0x01, // end of associative head
            0x04, 0x02, // dense element 2
        ];
        let value = decode(&data).unwrap();
        assert_eq!(value.get("k"), Some(&Amf3Value::Integer(1)));
        assert_eq!(value.as_array().unwrap(), &[Amf3Value::Integer(2)]);
    }

    #[test]
    fn test_anonymous_dynamic_object() {
        let data = [
            0x0A, 0x0B, 0x01, // object, fresh dynamic traits, anonymous
            0x03, 0x61, // key "a"
            0x04, 0x07, // value 7
            0x01, // end of dynamic members
        ];
        let value = decode(&data).unwrap();
        match &value {
            Amf3Value::Object(object) => {
                assert!(object.class_name.is_empty());
                assert_eq!(object.get("a"), Some(&Amf3Value::Integer(7)));
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_anonymous_object() {
        let value = decode(&[0x0A, 0x0B, 0x01, 0x01]).unwrap();
        assert_eq!(value, Amf3Value::Object(TypedObject::new()));
    }

    #[test]
    fn test_sealed_object_members_in_traits_order() {
        let data = [
            0x0A, 0x23, // fresh traits: 2 sealed members, not dynamic
            0x07, 0x63, 0x2E, 0x55, // class "c.U"
            0x03, 0x61, // member "a"
            0x03, 0x62, // member "b"
            0x04, 0x01, // a = 1
            0x04, 0x02, // b = 2
        ];
        let value = decode(&data).unwrap();
        match &value {
            Amf3Value::Object(object) => {
                assert_eq!(object.class_name, "c.U");
                assert_eq!(
                    object.assoc,
                    vec![
                        ("a".to_string(), Amf3Value::Integer(1)),
                        ("b".to_string(), Amf3Value::Integer(2)),
                    ]
                );
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_traits_reference_reuse() {
        // Two sealed objects of the same class; the second uses a traits
        // reference (0b01 with index 0) instead of repeating the header.
        let data = [
            0x09, 0x05, 0x01, // array, 2 dense
            0x0A, 0x13, 0x03, 0x63, 0x03, 0x61, 0x04, 0x01, // class "c" {a:1}
            0x0A, 0x01, 0x04, 0x02, // traits ref 0, {a:2}
        ];
        let value = decode(&data).unwrap();
        let dense = value.as_array().unwrap();
        assert_eq!(dense[0].get("a"), Some(&Amf3Value::Integer(1)));
        assert_eq!(dense[1].get("a"), Some(&Amf3Value::Integer(2)));
        match (&dense[0], &dense[1]) {
            (Amf3Value::Object(first), Amf3Value::Object(second)) => {
                assert_eq!(first.class_name, "c");
                assert_eq!(second.class_name, "c");
            }
            other => panic!("expected objects, got {:?}", other),
        }
    }

    #[test]
    fn test_object_back_reference_shares_value() {
        let data = [
            0x09, 0x05, 0x01, // array, 2 dense
            0x09, 0x01, 0x01, // inner empty array, object index 1
            0x09, 0x02, // back-reference to index 1
        ];
        let value = decode(&data).unwrap();
        let dense = value.as_array().unwrap();
        assert_eq!(dense[0], dense[1]);
        assert!(matches!(dense[0], Amf3Value::Array { .. }));
    }

    #[test]
    fn test_unknown_marker() {
        assert!(matches!(
            decode(&[0x0D]),
            Err(AmfError::UnknownMarker(0x0D))
        ));
    }

    #[test]
    fn test_truncated_input() {
        assert!(matches!(decode(&[]), Err(AmfError::UnexpectedEof)));
        assert!(matches!(decode(&[0x04]), Err(AmfError::UnexpectedEof)));
        assert!(matches!(
            decode(&[0x05, 0x3F, 0xF8]),
            Err(AmfError::UnexpectedEof)
        ));
        assert!(matches!(
            decode(&[0x06, 0x05, 0x61]),
            Err(AmfError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_invalid_reference_index() {
        assert!(matches!(
            decode(&[0x06, 0x02]),
            Err(AmfError::InvalidReference(1))
        ));
        assert!(matches!(
            decode(&[0x0A, 0x02]),
            Err(AmfError::InvalidReference(1))
        ));
    }

    #[test]
    fn test_unknown_external_class() {
        let data = [
            0x0A, 0x07, // external traits
            0x07, 0x44, 0x53, 0x51, // class "DSQ"
        ];
        assert!(matches!(
            decode(&data),
            Err(AmfError::UnknownExternalClass(ref name)) if name == "DSQ"
        ));
    }

    #[test]
    fn test_nesting_limit() {
        // 65 nested single-element arrays
        let mut data = Vec::new();
        for _ in 0..65 {
            data.extend_from_slice(&[0x09, 0x03, 0x01]);
        }
        data.push(0x01);
        assert!(matches!(decode(&data), Err(AmfError::NestingTooDeep)));
    }
}
