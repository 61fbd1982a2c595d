//! Flex messaging types
//!
//! The `flex.messaging.messages.*` family used by BlazeDS/LCDS remoting.
//! The `*Ext` variants (aliases `DSA`, `DSK`, `DSC`) are externalizable
//! "small messages": their bodies are a flag sequence followed by one
//! AMF3 value per set bit. `ErrorMessage` and `RemotingMessage` are
//! classic sealed classes and travel as ordinary typed objects.

use bytes::Bytes;
use rand::Rng;

use crate::decoder::Amf3Decoder;
use crate::encoder::Amf3Encoder;
use crate::error::{AmfError, Result};
use crate::traits::{Traits, TraitsMapper};
use crate::value::{Amf3Value, TypedObject};

use super::flags::Flags;

/// Wire class names for the Flex messaging family
pub const ASYNC_MESSAGE: &str = "flex.messaging.messages.AsyncMessage";
pub const ASYNC_MESSAGE_EXT: &str = "flex.messaging.messages.AsyncMessageExt";
pub const ACKNOWLEDGE_MESSAGE: &str = "flex.messaging.messages.AcknowledgeMessage";
pub const ACKNOWLEDGE_MESSAGE_EXT: &str = "flex.messaging.messages.AcknowledgeMessageExt";
pub const COMMAND_MESSAGE: &str = "flex.messaging.messages.CommandMessage";
pub const COMMAND_MESSAGE_EXT: &str = "flex.messaging.messages.CommandMessageExt";
pub const ERROR_MESSAGE: &str = "flex.messaging.messages.ErrorMessage";
pub const REMOTING_MESSAGE: &str = "flex.messaging.messages.RemotingMessage";
pub const ARRAY_COLLECTION: &str = "flex.messaging.io.ArrayCollection";

/// BlazeDS "small message" aliases
pub const DSA: &str = "DSA";
pub const DSK: &str = "DSK";
pub const DSC: &str = "DSC";

// AbstractMessage flag byte 0
const BODY_FLAG: u8 = 0x01;
const CLIENT_ID_FLAG: u8 = 0x02;
const DESTINATION_FLAG: u8 = 0x04;
const HEADERS_FLAG: u8 = 0x08;
const MESSAGE_ID_FLAG: u8 = 0x10;
const TIMESTAMP_FLAG: u8 = 0x20;
const TIME_TO_LIVE_FLAG: u8 = 0x40;

// AbstractMessage flag byte 1
const CLIENT_ID_BYTES_FLAG: u8 = 0x01;
const MESSAGE_ID_BYTES_FLAG: u8 = 0x02;

// AsyncMessage flag byte 0
const CORRELATION_ID_FLAG: u8 = 0x01;
const CORRELATION_ID_BYTES_FLAG: u8 = 0x02;

// CommandMessage flag byte 0
const OPERATION_FLAG: u8 = 0x01;

const ABSTRACT_MESSAGE_MEMBERS: [&str; 7] = [
    "body",
    "clientId",
    "destination",
    "headers",
    "messageId",
    "timestamp",
    "timeToLive",
];

const ASYNC_MESSAGE_MEMBERS: [&str; 8] = [
    "body",
    "clientId",
    "destination",
    "headers",
    "messageId",
    "timestamp",
    "timeToLive",
    "correlationId",
];

const COMMAND_MESSAGE_MEMBERS: [&str; 9] = [
    "body",
    "clientId",
    "destination",
    "headers",
    "messageId",
    "timestamp",
    "timeToLive",
    "correlationId",
    "operation",
];

const ERROR_MESSAGE_MEMBERS: [&str; 13] = [
    "body",
    "clientId",
    "destination",
    "headers",
    "messageId",
    "timestamp",
    "timeToLive",
    "correlationId",
    "faultCode",
    "faultDetail",
    "faultString",
    "rootCause",
    "extendedData",
];

const REMOTING_MESSAGE_MEMBERS: [&str; 9] = [
    "body",
    "clientId",
    "destination",
    "headers",
    "messageId",
    "timestamp",
    "timeToLive",
    "source",
    "operation",
];

/// Read one value per set flag bit into the matching field, then consume
/// one value for every set bit past the known fields so the stream stays
/// aligned for whatever follows.
fn read_flagged(
    decoder: &mut Amf3Decoder,
    buf: &mut Bytes,
    flag: u8,
    fields: &mut [(u8, &mut Amf3Value)],
) -> Result<()> {
    for (mask, slot) in fields.iter_mut() {
        if flag & *mask != 0 {
            **slot = decoder.decode(buf)?;
        }
    }
    let mut remaining = u32::from(flag) >> fields.len();
    while remaining != 0 {
        if remaining & 1 != 0 {
            decoder.decode(buf)?;
        }
        remaining >>= 1;
    }
    Ok(())
}

/// Consume one value per set bit of an entirely unknown flag byte
fn skip_flagged(decoder: &mut Amf3Decoder, buf: &mut Bytes, flag: u8) -> Result<()> {
    let mut remaining = flag;
    while remaining != 0 {
        if remaining & 1 != 0 {
            decoder.decode(buf)?;
        }
        remaining >>= 1;
    }
    Ok(())
}

/// Flag byte announcing every present (non-null) field
fn presence_flag(fields: &[(u8, &Amf3Value)]) -> u8 {
    let mut flag = 0;
    for (mask, value) in fields {
        if !value.is_null_or_undefined() {
            flag |= mask;
        }
    }
    flag
}

/// Write one value per set flag bit, in declaration order
fn write_flagged(encoder: &mut Amf3Encoder, flag: u8, fields: &[(u8, &Amf3Value)]) -> Result<()> {
    for (mask, value) in fields {
        if flag & mask != 0 {
            encoder.encode(value)?;
        }
    }
    Ok(())
}

/// Base fields shared by every Flex message. `Null` means absent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AbstractMessage {
    pub body: Amf3Value,
    pub client_id: Amf3Value,
    pub destination: Amf3Value,
    pub headers: Amf3Value,
    pub message_id: Amf3Value,
    pub timestamp: Amf3Value,
    pub time_to_live: Amf3Value,
}

impl AbstractMessage {
    pub fn read_external(&mut self, decoder: &mut Amf3Decoder, buf: &mut Bytes) -> Result<()> {
        let flags = Flags::read_external(decoder, buf)?;
        if !flags.is_empty() {
            read_flagged(
                decoder,
                buf,
                flags.at(0),
                &mut [
                    (BODY_FLAG, &mut self.body),
                    (CLIENT_ID_FLAG, &mut self.client_id),
                    (DESTINATION_FLAG, &mut self.destination),
                    (HEADERS_FLAG, &mut self.headers),
                    (MESSAGE_ID_FLAG, &mut self.message_id),
                    (TIMESTAMP_FLAG, &mut self.timestamp),
                    (TIME_TO_LIVE_FLAG, &mut self.time_to_live),
                ],
            )?;
        }
        if flags.len() > 1 {
            // The *Bytes variants arrive as opaque values; read and drop.
            let mut client_id_bytes = Amf3Value::Null;
            let mut message_id_bytes = Amf3Value::Null;
            read_flagged(
                decoder,
                buf,
                flags.at(1),
                &mut [
                    (CLIENT_ID_BYTES_FLAG, &mut client_id_bytes),
                    (MESSAGE_ID_BYTES_FLAG, &mut message_id_bytes),
                ],
            )?;
        }
        for i in 2..flags.len() {
            skip_flagged(decoder, buf, flags.at(i))?;
        }
        Ok(())
    }

    pub fn write_external(&self, encoder: &mut Amf3Encoder) -> Result<()> {
        let fields = [
            (BODY_FLAG, &self.body),
            (CLIENT_ID_FLAG, &self.client_id),
            (DESTINATION_FLAG, &self.destination),
            (HEADERS_FLAG, &self.headers),
            (MESSAGE_ID_FLAG, &self.message_id),
            (TIMESTAMP_FLAG, &self.timestamp),
            (TIME_TO_LIVE_FLAG, &self.time_to_live),
        ];
        let flag = presence_flag(&fields);
        let mut flags = Flags::with_len(1);
        flags.set(0, flag);
        flags.write_external(encoder);
        write_flagged(encoder, flag, &fields)
    }
}

/// Asynchronous message (wire classes `DSA` / AsyncMessageExt)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AsyncMessage {
    pub base: AbstractMessage,
    pub correlation_id: Amf3Value,
}

impl AsyncMessage {
    pub fn read_external(&mut self, decoder: &mut Amf3Decoder, buf: &mut Bytes) -> Result<()> {
        self.base.read_external(decoder, buf)?;
        let flags = Flags::read_external(decoder, buf)?;
        if !flags.is_empty() {
            let mut correlation_id_bytes = Amf3Value::Null;
            read_flagged(
                decoder,
                buf,
                flags.at(0),
                &mut [
                    (CORRELATION_ID_FLAG, &mut self.correlation_id),
                    (CORRELATION_ID_BYTES_FLAG, &mut correlation_id_bytes),
                ],
            )?;
        }
        for i in 1..flags.len() {
            skip_flagged(decoder, buf, flags.at(i))?;
        }
        Ok(())
    }

    pub fn write_external(&self, encoder: &mut Amf3Encoder) -> Result<()> {
        self.base.write_external(encoder)?;
        let fields = [(CORRELATION_ID_FLAG, &self.correlation_id)];
        let flag = presence_flag(&fields);
        let mut flags = Flags::with_len(1);
        flags.set(0, flag);
        flags.write_external(encoder);
        write_flagged(encoder, flag, &fields)
    }
}

/// Acknowledgement of a prior message (wire classes `DSK` /
/// AcknowledgeMessageExt). Defines no flag bits of its own.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AcknowledgeMessage {
    pub base: AsyncMessage,
}

impl AcknowledgeMessage {
    pub fn read_external(&mut self, decoder: &mut Amf3Decoder, buf: &mut Bytes) -> Result<()> {
        self.base.read_external(decoder, buf)?;
        let flags = Flags::read_external(decoder, buf)?;
        for _ in 0..flags.count_bits() {
            decoder.decode(buf)?;
        }
        Ok(())
    }

    pub fn write_external(&self, encoder: &mut Amf3Encoder) -> Result<()> {
        self.base.write_external(encoder)?;
        Flags::with_len(1).write_external(encoder);
        Ok(())
    }
}

/// Command message (wire classes `DSC` / CommandMessageExt)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandMessage {
    pub base: AsyncMessage,
    pub operation: Amf3Value,
}

impl CommandMessage {
    pub fn read_external(&mut self, decoder: &mut Amf3Decoder, buf: &mut Bytes) -> Result<()> {
        self.base.read_external(decoder, buf)?;
        let flags = Flags::read_external(decoder, buf)?;
        if !flags.is_empty() {
            read_flagged(
                decoder,
                buf,
                flags.at(0),
                &mut [(OPERATION_FLAG, &mut self.operation)],
            )?;
        }
        for i in 1..flags.len() {
            skip_flagged(decoder, buf, flags.at(i))?;
        }
        Ok(())
    }

    pub fn write_external(&self, encoder: &mut Amf3Encoder) -> Result<()> {
        self.base.write_external(encoder)?;
        let fields = [(OPERATION_FLAG, &self.operation)];
        let flag = presence_flag(&fields);
        let mut flags = Flags::with_len(1);
        flags.set(0, flag);
        flags.write_external(encoder);
        write_flagged(encoder, flag, &fields)
    }
}

/// Fault response. Sealed, not externalizable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ErrorMessage {
    pub base: AcknowledgeMessage,
    pub fault_code: Amf3Value,
    pub fault_detail: Amf3Value,
    pub fault_string: Amf3Value,
    pub root_cause: Amf3Value,
    pub extended_data: Amf3Value,
}

impl ErrorMessage {
    /// Build the typed-object form this class travels as
    pub fn to_value(&self) -> Amf3Value {
        let abstract_message = &self.base.base.base;
        let mut object = TypedObject::with_class_name(ERROR_MESSAGE);
        object.assoc = vec![
            ("body".to_string(), abstract_message.body.clone()),
            ("clientId".to_string(), abstract_message.client_id.clone()),
            (
                "destination".to_string(),
                abstract_message.destination.clone(),
            ),
            ("headers".to_string(), abstract_message.headers.clone()),
            ("messageId".to_string(), abstract_message.message_id.clone()),
            ("timestamp".to_string(), abstract_message.timestamp.clone()),
            (
                "timeToLive".to_string(),
                abstract_message.time_to_live.clone(),
            ),
            (
                "correlationId".to_string(),
                self.base.base.correlation_id.clone(),
            ),
            ("faultCode".to_string(), self.fault_code.clone()),
            ("faultDetail".to_string(), self.fault_detail.clone()),
            ("faultString".to_string(), self.fault_string.clone()),
            ("rootCause".to_string(), self.root_cause.clone()),
            ("extendedData".to_string(), self.extended_data.clone()),
        ];
        Amf3Value::Object(object)
    }

    /// Extract from a decoded typed object; missing members become null
    pub fn from_value(value: &Amf3Value) -> Result<Self> {
        let object = match value {
            Amf3Value::Object(object) => object,
            other => {
                return Err(AmfError::TypeMismatch {
                    expected: "object",
                    found: other.kind_name(),
                })
            }
        };
        let member = |name: &str| {
            object
                .get_ignore_case(name)
                .cloned()
                .unwrap_or(Amf3Value::Null)
        };
        Ok(ErrorMessage {
            base: AcknowledgeMessage {
                base: AsyncMessage {
                    base: AbstractMessage {
                        body: member("body"),
                        client_id: member("clientId"),
                        destination: member("destination"),
                        headers: member("headers"),
                        message_id: member("messageId"),
                        timestamp: member("timestamp"),
                        time_to_live: member("timeToLive"),
                    },
                    correlation_id: member("correlationId"),
                },
            },
            fault_code: member("faultCode"),
            fault_detail: member("faultDetail"),
            fault_string: member("faultString"),
            root_cause: member("rootCause"),
            extended_data: member("extendedData"),
        })
    }
}

/// RPC invocation. Sealed, not externalizable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemotingMessage {
    pub base: AbstractMessage,
    pub source: Amf3Value,
    pub operation: Amf3Value,
}

impl RemotingMessage {
    /// Build the typed-object form this class travels as
    pub fn to_value(&self) -> Amf3Value {
        let mut object = TypedObject::with_class_name(REMOTING_MESSAGE);
        object.assoc = vec![
            ("body".to_string(), self.base.body.clone()),
            ("clientId".to_string(), self.base.client_id.clone()),
            ("destination".to_string(), self.base.destination.clone()),
            ("headers".to_string(), self.base.headers.clone()),
            ("messageId".to_string(), self.base.message_id.clone()),
            ("timestamp".to_string(), self.base.timestamp.clone()),
            ("timeToLive".to_string(), self.base.time_to_live.clone()),
            ("source".to_string(), self.source.clone()),
            ("operation".to_string(), self.operation.clone()),
        ];
        Amf3Value::Object(object)
    }

    /// Extract from a decoded typed object; missing members become null
    pub fn from_value(value: &Amf3Value) -> Result<Self> {
        let object = match value {
            Amf3Value::Object(object) => object,
            other => {
                return Err(AmfError::TypeMismatch {
                    expected: "object",
                    found: other.kind_name(),
                })
            }
        };
        let member = |name: &str| {
            object
                .get_ignore_case(name)
                .cloned()
                .unwrap_or(Amf3Value::Null)
        };
        Ok(RemotingMessage {
            base: AbstractMessage {
                body: member("body"),
                client_id: member("clientId"),
                destination: member("destination"),
                headers: member("headers"),
                message_id: member("messageId"),
                timestamp: member("timestamp"),
                time_to_live: member("timeToLive"),
            },
            source: member("source"),
            operation: member("operation"),
        })
    }
}

/// A decoded Flex externalizable message body
#[derive(Debug, Clone, PartialEq)]
pub enum FlexMessage {
    Async(AsyncMessage),
    Acknowledge(AcknowledgeMessage),
    Command(CommandMessage),
}

impl FlexMessage {
    /// Serialize the flag-driven body onto the encoder
    pub fn write_external(&self, encoder: &mut Amf3Encoder) -> Result<()> {
        match self {
            FlexMessage::Async(m) => m.write_external(encoder),
            FlexMessage::Acknowledge(m) => m.write_external(encoder),
            FlexMessage::Command(m) => m.write_external(encoder),
        }
    }

    /// Wrap into an external value under the given wire class name
    pub fn into_value(self, class_name: impl Into<String>) -> Amf3Value {
        Amf3Value::External {
            class_name: class_name.into(),
            message: Box::new(self),
        }
    }
}

fn read_async_message(
    decoder: &mut Amf3Decoder,
    buf: &mut Bytes,
    class_name: &str,
) -> Result<Amf3Value> {
    let mut message = AsyncMessage::default();
    message.read_external(decoder, buf)?;
    Ok(FlexMessage::Async(message).into_value(class_name))
}

fn read_acknowledge_message(
    decoder: &mut Amf3Decoder,
    buf: &mut Bytes,
    class_name: &str,
) -> Result<Amf3Value> {
    let mut message = AcknowledgeMessage::default();
    message.read_external(decoder, buf)?;
    Ok(FlexMessage::Acknowledge(message).into_value(class_name))
}

fn read_command_message(
    decoder: &mut Amf3Decoder,
    buf: &mut Bytes,
    class_name: &str,
) -> Result<Amf3Value> {
    let mut message = CommandMessage::default();
    message.read_external(decoder, buf)?;
    Ok(FlexMessage::Command(message).into_value(class_name))
}

/// ArrayCollection externalizes as its backing array; unwrap it.
fn read_array_collection(
    decoder: &mut Amf3Decoder,
    buf: &mut Bytes,
    _class_name: &str,
) -> Result<Amf3Value> {
    decoder.decode(buf)
}

/// Register the Flex messaging family into a mapper. The default mapper
/// calls this at initialization; custom mappers can opt in.
pub fn register_flex_types(mapper: &mut TraitsMapper) {
    mapper.register_external(Traits::external(DSA), read_async_message);
    mapper.register_external(Traits::external(ASYNC_MESSAGE_EXT), read_async_message);
    mapper.register_external(Traits::external(DSK), read_acknowledge_message);
    mapper.register_external(
        Traits::external(ACKNOWLEDGE_MESSAGE_EXT),
        read_acknowledge_message,
    );
    mapper.register_external(Traits::external(DSC), read_command_message);
    mapper.register_external(Traits::external(COMMAND_MESSAGE_EXT), read_command_message);
    mapper.register_external(Traits::external(ARRAY_COLLECTION), read_array_collection);

    mapper.register_type(Traits::sealed(ASYNC_MESSAGE, &ASYNC_MESSAGE_MEMBERS));
    mapper.register_type(Traits::sealed(ACKNOWLEDGE_MESSAGE, &ASYNC_MESSAGE_MEMBERS));
    mapper.register_type(Traits::sealed(COMMAND_MESSAGE, &COMMAND_MESSAGE_MEMBERS));
    mapper.register_type(Traits::sealed(ERROR_MESSAGE, &ERROR_MESSAGE_MEMBERS));
    mapper.register_type(Traits::sealed(REMOTING_MESSAGE, &REMOTING_MESSAGE_MEMBERS));
}

/// Generate a random message id in Flex's UUID format
pub fn new_uuid() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{:08X}-{:04X}-{:04X}-{:04X}-{:04X}{:08X}",
        rng.gen::<u32>(),
        rng.gen::<u16>(),
        rng.gen::<u16>(),
        rng.gen::<u16>(),
        rng.gen::<u16>(),
        rng.gen::<u32>(),
    )
}
