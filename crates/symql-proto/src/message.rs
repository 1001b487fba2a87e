//! Request and reply message types.
//!
//! A request carries compiled SQL text and, when the backend binds
//! parameters itself, the scalar arguments in positional order. A reply is
//! either a set of rows whose cells are in the value codec's textual form,
//! or a classified error.

use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::Error;

/// A request from the connection to the backend engine.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct Request {
    /// Request identifier, echoed by the reply.
    pub id: u64,
    /// SQL text with template slots already resolved.
    pub sql: String,
    /// Positional parameters for `?` placeholders.
    pub params: Vec<Param>,
}

impl Request {
    /// Create a request whose arguments are inlined into the SQL text.
    pub fn new(id: u64, sql: impl Into<String>) -> Self {
        Self {
            id,
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Create a request with positional parameters.
    pub fn with_params(id: u64, sql: impl Into<String>, params: Vec<Param>) -> Self {
        Self {
            id,
            sql: sql.into(),
            params,
        }
    }
}

/// A positional parameter bound by the engine.
///
/// Text parameters hold a printed form, never raw user text.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub enum Param {
    /// SQL NULL.
    Null,
    /// Integer.
    Integer(i64),
    /// Floating point.
    Real(f64),
    /// Printed form stored as text.
    Text(String),
}

/// Error class reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub enum ErrorClass {
    /// SQL syntax or name resolution error.
    Syntax,
    /// Constraint violation (unique, foreign key, check, not null).
    Constraint,
    /// Lock or busy condition; the statement may succeed if retried.
    Contention,
    /// The session itself is no longer usable.
    Fatal,
    /// Any other statement-level error.
    Other,
}

impl ErrorClass {
    /// Lowercase class name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Syntax => "syntax",
            ErrorClass::Constraint => "constraint",
            ErrorClass::Contention => "contention",
            ErrorClass::Fatal => "fatal",
            ErrorClass::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reply from the backend engine.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub enum Reply {
    /// Zero or more rows, each a sequence of encoded cells.
    Rows {
        /// Identifier of the request this answers.
        id: u64,
        /// Result rows.
        rows: Vec<Vec<String>>,
    },
    /// The statement failed.
    Error {
        /// Identifier of the request this answers.
        id: u64,
        /// Error class.
        class: ErrorClass,
        /// Engine-specific error code.
        code: i32,
        /// Engine error message.
        message: String,
    },
}

impl Reply {
    /// Create a rows reply.
    pub fn rows(id: u64, rows: Vec<Vec<String>>) -> Self {
        Reply::Rows { id, rows }
    }

    /// Create an error reply.
    pub fn error(id: u64, class: ErrorClass, code: i32, message: impl Into<String>) -> Self {
        Reply::Error {
            id,
            class,
            code,
            message: message.into(),
        }
    }

    /// Identifier of the request this reply answers.
    pub fn id(&self) -> u64 {
        match self {
            Reply::Rows { id, .. } | Reply::Error { id, .. } => *id,
        }
    }

    /// Check if this is an error reply.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error { .. })
    }
}

/// Serialize a request payload.
pub fn encode_request(request: &Request) -> Result<AlignedVec, Error> {
    rkyv::to_bytes::<rkyv::rancor::Error>(request)
        .map_err(|e| Error::Serialization(format!("failed to serialize request: {}", e)))
}

/// Deserialize a request payload.
pub fn decode_request(payload: &[u8]) -> Result<Request, Error> {
    let aligned = align(payload);
    let archived = rkyv::access::<ArchivedRequest, rkyv::rancor::Error>(&aligned)
        .map_err(|e| Error::InvalidMessage(format!("failed to access request: {}", e)))?;
    rkyv::deserialize::<Request, rkyv::rancor::Error>(archived)
        .map_err(|e| Error::Deserialization(format!("failed to deserialize request: {}", e)))
}

/// Serialize a reply payload.
pub fn encode_reply(reply: &Reply) -> Result<AlignedVec, Error> {
    rkyv::to_bytes::<rkyv::rancor::Error>(reply)
        .map_err(|e| Error::Serialization(format!("failed to serialize reply: {}", e)))
}

/// Deserialize a reply payload.
pub fn decode_reply(payload: &[u8]) -> Result<Reply, Error> {
    let aligned = align(payload);
    let archived = rkyv::access::<ArchivedReply, rkyv::rancor::Error>(&aligned)
        .map_err(|e| Error::InvalidMessage(format!("failed to access reply: {}", e)))?;
    rkyv::deserialize::<Reply, rkyv::rancor::Error>(archived)
        .map_err(|e| Error::Deserialization(format!("failed to deserialize reply: {}", e)))
}

/// Copy a payload sliced out of a frame into an aligned buffer.
pub(crate) fn align(payload: &[u8]) -> AlignedVec {
    let mut aligned = AlignedVec::new();
    aligned.extend_from_slice(payload);
    aligned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let request = Request::with_params(
            7,
            "SELECT name FROM people WHERE salary > ?1",
            vec![Param::Integer(62000), Param::Text("\"x\"".into()), Param::Null],
        );
        let bytes = encode_request(&request).unwrap();
        assert_eq!(decode_request(&bytes).unwrap(), request);
    }

    #[test]
    fn test_reply_roundtrip_from_unaligned_slice() {
        let reply = Reply::rows(3, vec![vec!["'\"Jeff\"'".into(), "1000".into()]]);
        let bytes = encode_reply(&reply).unwrap();

        // Frames put the payload behind a 4-byte prefix.
        let mut framed = vec![0u8; 4];
        framed.extend_from_slice(&bytes);
        assert_eq!(decode_reply(&framed[4..]).unwrap(), reply);
    }

    #[test]
    fn test_error_reply() {
        let reply = Reply::error(9, ErrorClass::Constraint, 19, "UNIQUE constraint failed");
        assert!(reply.is_error());
        assert_eq!(reply.id(), 9);
        let bytes = encode_reply(&reply).unwrap();
        assert_eq!(decode_reply(&bytes).unwrap(), reply);
    }

    #[test]
    fn test_garbage_payload_rejected() {
        assert!(decode_reply(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_error_class_names() {
        assert_eq!(ErrorClass::Constraint.to_string(), "constraint");
        assert_eq!(ErrorClass::Contention.as_str(), "contention");
    }
}
