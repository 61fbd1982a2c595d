//! AMF3 marker byte constants.
//!
//! Every AMF3 value starts with a single marker byte followed by a
//! marker-specific body. Markers 0x00-0x03 have no body at all.

// Sentinels
pub const UNDEFINED: u8 = 0x00;
pub const NULL: u8 = 0x01;

// Boolean (the value is the marker itself)
pub const FALSE: u8 = 0x02;
pub const TRUE: u8 = 0x03;

// Numbers
pub const INTEGER: u8 = 0x04;
pub const DOUBLE: u8 = 0x05;

// Strings (inline-or-reference, string table)
pub const STRING: u8 = 0x06;

// Legacy XMLDocument (inline-or-reference, object table)
pub const XML_DOC: u8 = 0x07;

// Date (8-byte double of milliseconds since epoch, object table)
pub const DATE: u8 = 0x08;

// Containers
pub const ARRAY: u8 = 0x09;
pub const OBJECT: u8 = 0x0A;

// E4X XML (inline-or-reference, object table)
pub const XML: u8 = 0x0B;

// Raw bytes (inline-or-reference, object table)
pub const BYTE_ARRAY: u8 = 0x0C;

/// Largest value representable in a U29.
pub const U29_MAX: u32 = 0x1FFF_FFFF;

/// Inclusive bounds of the Integer marker payload after sign extension.
/// Values outside this range are promoted to Double on encode.
pub const INT29_MIN: i32 = -0x1000_0000;
pub const INT29_MAX: i32 = 0x0FFF_FFFF;
