//! Flex messaging layer
//!
//! Implements the externalizable object protocol used by the Flex
//! messaging family: a continuation-bit flag sequence followed by one
//! AMF3 value per set flag bit, with unknown bits skipped one value at a
//! time for forward compatibility.
//!
//! The message taxonomy mirrors BlazeDS: `AbstractMessage` at the root,
//! `AsyncMessage`/`AcknowledgeMessage`/`CommandMessage` as the
//! externalizable "small messages" (aliases `DSA`/`DSK`/`DSC`), and
//! `ErrorMessage`/`RemotingMessage` as classic sealed classes.

pub mod flags;
pub mod messages;

pub use flags::Flags;
pub use messages::{
    new_uuid, register_flex_types, AbstractMessage, AcknowledgeMessage, AsyncMessage,
    CommandMessage, ErrorMessage, FlexMessage, RemotingMessage,
};
