//! amf3-rs: AMF3 codec library
//!
//! This library implements AMF3 (Action Message Format 3), the binary
//! serialization format of ActionScript 3.0 and the Flex messaging
//! protocol, including:
//! - The full marker set with reference-table deduplication of strings,
//!   objects, and class traits
//! - Typed objects with sealed members and dynamic tails
//! - The Flex externalizable message family (DSA/DSK/DSC and friends)
//! - A class registry for decoding named and externalizable classes
//!
//! # Example
//!
//! ```
//! use amf3_rs::{decode, encode, Amf3Value, TypedObject};
//!
//! let mut object = TypedObject::new();
//! object.insert("name", Amf3Value::String("ada".into()));
//! object.insert("age", Amf3Value::Integer(36));
//!
//! let value = Amf3Value::Object(object);
//! let bytes = encode(&value).unwrap();
//! assert_eq!(decode(&bytes).unwrap(), value);
//! ```
//!
//! # Sessions
//!
//! Reference tables live for one session: every `encode` call on an
//! [`Amf3Encoder`] shares tables until `finish`, and every `decode` call
//! on an [`Amf3Decoder`] shares tables until `reset`. The convenience
//! functions [`encode`] and [`decode`] use one session per call.

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod flex;
pub mod marker;
pub mod traits;
pub mod value;

mod reftable;

// Re-export main types for convenience
pub use decoder::{decode, decode_all, Amf3Decoder};
pub use encoder::{encode, encode_all, Amf3Encoder};
pub use error::{AmfError, Result};
pub use traits::{default_traits_mapper, DefinedType, ExternalReadFn, Traits, TraitsMapper};
pub use value::{Amf3Value, TypedObject};
