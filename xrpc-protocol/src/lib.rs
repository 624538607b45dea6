//! # xrpc-protocol
//!
//! XML-RPC wire protocol for xrpc.
//!
//! This crate provides:
//! - The XML-RPC value model
//! - Value encoding/decoding with optional `<i8>` and `<nil/>` extensions
//! - `methodCall` request rendering and `methodResponse` parsing
//! - Capability flags and protocol error types

pub mod codec;
pub mod error;
pub mod flags;
pub mod message;
pub mod value;

pub use codec::{ValueCodec, DATETIME_FORMAT, MAX_NESTING_DEPTH};
pub use error::ProtocolError;
pub use flags::Capabilities;
pub use message::{Fault, MethodCall, MethodResponse, TYPE_XML};
pub use value::{Struct, Value};
