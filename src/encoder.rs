//! AMF3 encoder
//!
//! Mirrors the decoder's reference-table semantics: within one session,
//! repeated non-empty strings, traits, and container values are written
//! as table indices rather than inline bodies. A session spans all
//! `encode` calls up to `finish` (or `reset`).

use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AmfError, Result};
use crate::marker;
use crate::traits::{default_traits_mapper, Traits, TraitsMapper};
use crate::value::{Amf3Value, TypedObject};

/// AMF3 encoder with per-session reference tables
pub struct Amf3Encoder {
    buf: BytesMut,
    /// Non-empty strings already written, by table index
    string_ref_map: HashMap<String, usize>,
    /// Container values already written, in visit order
    object_refs: Vec<Amf3Value>,
    /// Traits already written, by class name
    traits_ref_map: HashMap<String, usize>,
    /// Class registry override; `None` uses the process-wide default
    mapper: Option<Arc<TraitsMapper>>,
}

impl Amf3Encoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create encoder with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            string_ref_map: HashMap::new(),
            object_refs: Vec::new(),
            traits_ref_map: HashMap::new(),
            mapper: None,
        }
    }

    /// Create an encoder with a custom traits mapper
    pub fn with_mapper(mapper: Arc<TraitsMapper>) -> Self {
        Self {
            mapper: Some(mapper),
            ..Self::new()
        }
    }

    /// Get the encoded bytes and start a new session
    pub fn finish(&mut self) -> Bytes {
        self.string_ref_map.clear();
        self.object_refs.clear();
        self.traits_ref_map.clear();
        self.buf.split().freeze()
    }

    /// Discard buffered bytes and reference tables
    pub fn reset(&mut self) {
        self.string_ref_map.clear();
        self.object_refs.clear();
        self.traits_ref_map.clear();
        self.buf.clear();
    }

    /// Get current encoded length
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if encoder is empty
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Write a single byte
    pub fn write_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    /// Write a variable-length 29-bit unsigned integer
    pub fn write_u29(&mut self, v: u32) -> Result<()> {
        if v & !marker::U29_MAX != 0 {
            return Err(AmfError::U29OutOfRange(u64::from(v)));
        }

        if v >> 21 != 0 {
            // Four bytes; the last carries 8 bits, not 7
            self.buf.put_u8(0x80 | ((v >> 22) & 0x7F) as u8);
            self.buf.put_u8(0x80 | ((v >> 15) & 0x7F) as u8);
            self.buf.put_u8(0x80 | ((v >> 8) & 0x7F) as u8);
            self.buf.put_u8((v & 0xFF) as u8);
        } else if v >> 14 != 0 {
            self.buf.put_u8(0x80 | ((v >> 14) & 0x7F) as u8);
            self.buf.put_u8(0x80 | ((v >> 7) & 0x7F) as u8);
            self.buf.put_u8((v & 0x7F) as u8);
        } else if v >> 7 != 0 {
            self.buf.put_u8(0x80 | ((v >> 7) & 0x7F) as u8);
            self.buf.put_u8((v & 0x7F) as u8);
        } else {
            self.buf.put_u8(v as u8);
        }
        Ok(())
    }

    /// Write a U29-prefixed string, interning non-empty strings into the
    /// session table. The empty string is always the single byte 0x01.
    pub fn write_string(&mut self, s: &str) -> Result<()> {
        if !s.is_empty() {
            if let Some(&index) = self.string_ref_map.get(s) {
                return self.write_u29((index as u32) << 1);
            }
            let index = self.string_ref_map.len();
            self.string_ref_map.insert(s.to_string(), index);
        }

        self.write_inline_prefix(s.len())?;
        self.buf.put_slice(s.as_bytes());
        Ok(())
    }

    /// Encode a single AMF3 value
    pub fn encode(&mut self, value: &Amf3Value) -> Result<()> {
        match value {
            Amf3Value::Undefined | Amf3Value::Null => {
                self.write_u8(marker::NULL);
                Ok(())
            }
            Amf3Value::Boolean(false) => {
                self.write_u8(marker::FALSE);
                Ok(())
            }
            Amf3Value::Boolean(true) => {
                self.write_u8(marker::TRUE);
                Ok(())
            }
            Amf3Value::Integer(i) => self.encode_integer(*i),
            Amf3Value::Double(f) => {
                self.write_u8(marker::DOUBLE);
                self.buf.put_f64(*f);
                Ok(())
            }
            Amf3Value::String(s) => {
                self.write_u8(marker::STRING);
                self.write_string(s)
            }
            Amf3Value::XmlDoc(text) => self.encode_xml(marker::XML_DOC, text, value),
            Amf3Value::Date(millis) => self.encode_date(*millis, value),
            Amf3Value::Array { assoc, dense } => self.encode_array(assoc, dense, value),
            Amf3Value::Object(object) => self.encode_object(object, value),
            Amf3Value::Xml(text) => self.encode_xml(marker::XML, text, value),
            Amf3Value::ByteArray(data) => self.encode_byte_array(data, value),
            Amf3Value::External {
                class_name,
                message,
            } => {
                self.write_u8(marker::OBJECT);
                if self.write_object_ref(value)? {
                    return Ok(());
                }
                let traits = match self.mapper().find_by_class_name(class_name) {
                    Some(defined) if defined.traits.external => defined.traits.clone(),
                    _ => return Err(AmfError::UnknownExternalClass(class_name.clone())),
                };
                self.write_traits(&traits)?;
                message.write_external(self)
            }
        }
    }

    /// Encode multiple values in one session
    pub fn encode_all(&mut self, values: &[Amf3Value]) -> Result<()> {
        for value in values {
            self.encode(value)?;
        }
        Ok(())
    }

    fn encode_integer(&mut self, i: i32) -> Result<()> {
        if !(marker::INT29_MIN..=marker::INT29_MAX).contains(&i) {
            // Out of the 29-bit signed range; promote to Double
            self.write_u8(marker::DOUBLE);
            self.buf.put_f64(f64::from(i));
            return Ok(());
        }
        self.write_u8(marker::INTEGER);
        // Sign-contract to 29 bits; the decoder's sign extension undoes it
        self.write_u29((i as u32) & marker::U29_MAX)
    }

    fn encode_date(&mut self, millis: f64, whole: &Amf3Value) -> Result<()> {
        self.write_u8(marker::DATE);
        if self.write_object_ref(whole)? {
            return Ok(());
        }
        self.write_u29(1)?;
        self.buf.put_f64(millis);
        Ok(())
    }

    fn encode_xml(&mut self, marker: u8, text: &str, whole: &Amf3Value) -> Result<()> {
        self.write_u8(marker);
        if self.write_object_ref(whole)? {
            return Ok(());
        }
        self.write_inline_prefix(text.len())?;
        self.buf.put_slice(text.as_bytes());
        Ok(())
    }

    fn encode_byte_array(&mut self, data: &Bytes, whole: &Amf3Value) -> Result<()> {
        self.write_u8(marker::BYTE_ARRAY);
        if self.write_object_ref(whole)? {
            return Ok(());
        }
        self.write_inline_prefix(data.len())?;
        self.buf.put_slice(data);
        Ok(())
    }

    fn encode_array(
        &mut self,
        assoc: &[(String, Amf3Value)],
        dense: &[Amf3Value],
        whole: &Amf3Value,
    ) -> Result<()> {
        self.write_u8(marker::ARRAY);
        if self.write_object_ref(whole)? {
            return Ok(());
        }

        self.write_inline_prefix(dense.len())?;
        for (key, value) in assoc {
            self.write_string(key)?;
            self.encode(value)?;
        }
        self.write_string("")?;
        for value in dense {
            self.encode(value)?;
        }
        Ok(())
    }

    fn encode_object(&mut self, object: &TypedObject, whole: &Amf3Value) -> Result<()> {
        self.write_u8(marker::OBJECT);
        if self.write_object_ref(whole)? {
            return Ok(());
        }

        let traits = self.resolve_traits(object);
        self.write_traits(&traits)?;

        for name in &traits.members {
            match object.get_ignore_case(name) {
                Some(value) => self.encode(value)?,
                None => self.write_u8(marker::NULL),
            }
        }

        if traits.dynamic {
            for (key, value) in &object.assoc {
                if traits.has_member(key) {
                    continue;
                }
                self.write_string(key)?;
                self.encode(value)?;
            }
            self.write_string("")?;
        }
        Ok(())
    }

    /// Traits for an outgoing typed object: registered classes use their
    /// registered descriptor, everything else goes out as a dynamic
    /// object with no sealed members.
    fn resolve_traits(&self, object: &TypedObject) -> Traits {
        if !object.class_name.is_empty() {
            if let Some(defined) = self.mapper().find_by_class_name(&object.class_name) {
                if !defined.traits.external {
                    return defined.traits.clone();
                }
            }
        }
        Traits {
            class_name: object.class_name.clone(),
            external: false,
            dynamic: true,
            members: Vec::new(),
        }
    }

    /// Write a traits header: a back-reference if this session has seen
    /// the class, the full descriptor otherwise
    fn write_traits(&mut self, traits: &Traits) -> Result<()> {
        if let Some(&index) = self.traits_ref_map.get(&traits.class_name) {
            return self.write_u29(((index as u32) << 2) | 1);
        }
        let index = self.traits_ref_map.len();
        self.traits_ref_map.insert(traits.class_name.clone(), index);

        tracing::trace!(class = %traits.class_name, nmemb = traits.members.len(), "emitting traits");

        let mut prefix: u32 = 0b011;
        if traits.external {
            prefix |= 0b100;
        } else {
            if traits.dynamic {
                prefix |= 0b1000;
            }
            prefix |= (traits.members.len() as u32) << 4;
        }
        self.write_u29(prefix)?;
        self.write_string(&traits.class_name)?;
        for name in &traits.members {
            self.write_string(name)?;
        }
        Ok(())
    }

    /// Emit an object-table back-reference if an equal value was already
    /// written this session; otherwise add the value and return false.
    fn write_object_ref(&mut self, value: &Amf3Value) -> Result<bool> {
        if let Some(index) = self.object_refs.iter().position(|v| v == value) {
            self.write_u29((index as u32) << 1)?;
            return Ok(true);
        }
        self.object_refs.push(value.clone());
        Ok(false)
    }

    /// Write `(len << 1) | 1`, guarding lengths that cannot fit a U29
    fn write_inline_prefix(&mut self, len: usize) -> Result<()> {
        if len >> 28 != 0 {
            return Err(AmfError::U29OutOfRange((len as u64) << 1 | 1));
        }
        self.write_u29(((len as u32) << 1) | 1)
    }

    fn mapper(&self) -> &TraitsMapper {
        match &self.mapper {
            Some(mapper) => mapper,
            None => default_traits_mapper(),
        }
    }
}

impl Default for Amf3Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience function to encode a single value
pub fn encode(value: &Amf3Value) -> Result<Bytes> {
    let mut encoder = Amf3Encoder::new();
    encoder.encode(value)?;
    Ok(encoder.finish())
}

/// Convenience function to encode multiple values in one session
pub fn encode_all(values: &[Amf3Value]) -> Result<Bytes> {
    let mut encoder = Amf3Encoder::new();
    encoder.encode_all(values)?;
    Ok(encoder.finish())
}
