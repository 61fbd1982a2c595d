//! Class traits and the process-wide traits mapper
//!
//! A `Traits` record is the class-descriptor half of an AMF3 object
//! header: class name, externality/dynamic flags, and the ordered sealed
//! member names. The `TraitsMapper` associates class names with traits
//! ahead of time so the codec knows how to handle named classes; the
//! default mapper is built once per process with the Flex messaging
//! family pre-registered.

use std::collections::HashMap;
use std::sync::OnceLock;

use bytes::Bytes;

use crate::decoder::Amf3Decoder;
use crate::error::Result;
use crate::value::Amf3Value;

/// Class descriptor from an AMF3 object header
///
/// The sealed member count on the wire is always `members.len()`;
/// external traits carry no members.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Traits {
    /// Class name; empty for anonymous objects
    pub class_name: String,
    /// Body is produced by class-specific externalizable code
    pub external: bool,
    /// Sealed members are followed by an open-ended (name, value) tail
    pub dynamic: bool,
    /// Ordered sealed member names
    pub members: Vec<String>,
}

impl Traits {
    /// Traits for a sealed (non-dynamic, non-external) class
    pub fn sealed(class_name: impl Into<String>, members: &[&str]) -> Self {
        Traits {
            class_name: class_name.into(),
            external: false,
            dynamic: false,
            members: members.iter().map(|m| (*m).to_string()).collect(),
        }
    }

    /// Traits for an externalizable class
    pub fn external(class_name: impl Into<String>) -> Self {
        Traits {
            class_name: class_name.into(),
            external: true,
            dynamic: false,
            members: Vec::new(),
        }
    }

    /// Whether `name` is one of the sealed members
    pub fn has_member(&self, name: &str) -> bool {
        self.members.iter().any(|m| m == name)
    }
}

/// Reader invoked when the decoder meets external traits for a registered
/// class. Receives the wire class name so aliases round-trip unchanged.
pub type ExternalReadFn = fn(&mut Amf3Decoder, &mut Bytes, &str) -> Result<Amf3Value>;

/// A registered class: its traits plus, for externalizable classes, the
/// reader that produces its value from the stream.
#[derive(Debug, Clone)]
pub struct DefinedType {
    pub traits: Traits,
    pub read_external: Option<ExternalReadFn>,
}

/// Class-name registry consulted by encoders and decoders
///
/// Mutated only while being built; shared immutably afterwards. Codecs
/// fall back to [`default_traits_mapper`] unless given an override.
#[derive(Debug, Clone, Default)]
pub struct TraitsMapper {
    types: HashMap<String, DefinedType>,
}

impl TraitsMapper {
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Register a sealed or dynamic class by its traits
    pub fn register_type(&mut self, traits: Traits) {
        self.types.insert(
            traits.class_name.clone(),
            DefinedType {
                traits,
                read_external: None,
            },
        );
    }

    /// Register an externalizable class with its reader
    pub fn register_external(&mut self, traits: Traits, read: ExternalReadFn) {
        self.types.insert(
            traits.class_name.clone(),
            DefinedType {
                traits,
                read_external: Some(read),
            },
        );
    }

    pub fn find_by_class_name(&self, class_name: &str) -> Option<&DefinedType> {
        self.types.get(class_name)
    }
}

/// Process-wide mapper with the Flex messaging family pre-registered
pub fn default_traits_mapper() -> &'static TraitsMapper {
    static DEFAULT: OnceLock<TraitsMapper> = OnceLock::new();
    DEFAULT.get_or_init(|| {
        let mut mapper = TraitsMapper::new();
        crate::flex::register_flex_types(&mut mapper);
        mapper
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traits_constructors() {
        let sealed = Traits::sealed("com.example.User", &["name", "age"]);
        assert!(!sealed.external);
        assert!(!sealed.dynamic);
        assert_eq!(sealed.members.len(), 2);
        assert!(sealed.has_member("name"));
        assert!(!sealed.has_member("Name"));

        let external = Traits::external("DSA");
        assert!(external.external);
        assert!(external.members.is_empty());
    }

    #[test]
    fn test_mapper_registration() {
        let mut mapper = TraitsMapper::new();
        mapper.register_type(Traits::sealed("com.example.User", &["name"]));

        let defined = mapper.find_by_class_name("com.example.User").unwrap();
        assert_eq!(defined.traits.members, vec!["name".to_string()]);
        assert!(defined.read_external.is_none());
        assert!(mapper.find_by_class_name("com.example.Other").is_none());
    }

    #[test]
    fn test_default_mapper_has_flex_family() {
        let mapper = default_traits_mapper();
        for class_name in [
            "DSA",
            "DSK",
            "DSC",
            "flex.messaging.messages.AsyncMessageExt",
            "flex.messaging.messages.AcknowledgeMessageExt",
            "flex.messaging.messages.CommandMessageExt",
        ] {
            let defined = mapper.find_by_class_name(class_name).unwrap();
            assert!(defined.traits.external, "{} should be external", class_name);
            assert!(defined.read_external.is_some());
        }

        let remoting = mapper
            .find_by_class_name("flex.messaging.messages.RemotingMessage")
            .unwrap();
        assert!(!remoting.traits.external);
        assert!(remoting.traits.has_member("operation"));
    }
}
