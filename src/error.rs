//! Error types for AMF3 encoding and decoding

use std::fmt;

/// Result type alias using the library's error type
pub type Result<T> = std::result::Result<T, AmfError>;

/// AMF3 encoding/decoding errors
#[derive(Debug)]
pub enum AmfError {
    /// Buffer ran out before the value was complete
    UnexpectedEof,
    /// Marker byte outside the AMF3 range
    UnknownMarker(u8),
    /// String body is not valid UTF-8
    InvalidUtf8,
    /// Reference index past the end of a reference table
    InvalidReference(u32),
    /// Value does not fit in 29 bits at write time
    U29OutOfRange(u64),
    /// Nesting depth limit exceeded
    NestingTooDeep,
    /// Decoded value cannot be converted to the requested shape
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    /// External traits name a class with no registered reader
    UnknownExternalClass(String),
}

impl fmt::Display for AmfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmfError::UnexpectedEof => write!(f, "Unexpected end of AMF data"),
            AmfError::UnknownMarker(m) => write!(f, "Unknown AMF3 marker: 0x{:02x}", m),
            AmfError::InvalidUtf8 => write!(f, "Invalid UTF-8 in AMF string"),
            AmfError::InvalidReference(idx) => write!(f, "Invalid AMF reference: {}", idx),
            AmfError::U29OutOfRange(v) => write!(f, "Value does not fit in a U29: {}", v),
            AmfError::NestingTooDeep => write!(f, "AMF nesting too deep"),
            AmfError::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected {}, found {}", expected, found)
            }
            AmfError::UnknownExternalClass(name) => {
                write!(f, "Unknown externalizable class: {}", name)
            }
        }
    }
}

impl std::error::Error for AmfError {}
