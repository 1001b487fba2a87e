//! symql protocol types.
//!
//! This crate defines the host value type with its printed notation and the
//! wire protocol spoken between a connection and an out-of-process backend
//! engine, using rkyv for message payloads.
//!
//! # Modules
//!
//! - [`value`] - Host values and their printed notation
//! - [`message`] - Request/reply messages and error classes
//! - [`handshake`] - Engine greeting
//! - [`framing`] - Length-prefix framing
//! - [`error`] - Protocol error types
//!
//! # Wire format
//!
//! Every message is a length-prefixed frame. Payloads are rkyv archives;
//! values inside them travel as text in their printed form:
//!
//! ```ignore
//! use symql_proto::{encode_request, Request};
//! use symql_proto::framing::encode_frame;
//!
//! let request = Request::new(1, "SELECT 1");
//! let frame = encode_frame(&encode_request(&request)?)?;
//! ```

pub mod error;
pub mod framing;
pub mod handshake;
pub mod message;
pub mod value;

pub use error::Error;

// Re-export commonly used types at crate root
pub use handshake::{decode_hello, encode_hello, Hello};
pub use message::{
    decode_reply, decode_request, encode_reply, encode_request, ErrorClass, Param, Reply,
    Request,
};
pub use value::Value;

/// Protocol version for wire compatibility.
///
/// Engines announce this version in their [`Hello`]; a connection refuses an
/// engine speaking a different version.
pub const PROTOCOL_VERSION: u32 = 1;
