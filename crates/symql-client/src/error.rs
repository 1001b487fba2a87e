//! Client error types.

use symql_lang::{CodecError, CompileError, ParseError};
use symql_proto::ErrorClass;
use thiserror::Error;

/// A statement-level error reported by the backend engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    /// Error class assigned by the engine.
    pub class: ErrorClass,
    /// Engine-specific error code.
    pub code: i32,
    /// Engine error message.
    pub message: String,
    /// Printed form of the statement that failed.
    pub shape: String,
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} error {}: {} (statement {})",
            self.class, self.code, self.message, self.shape
        )
    }
}

/// Client errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The session could not be established.
    #[error("connection error: {0}")]
    Connection(String),

    /// The connection is closed.
    #[error("connection is closed")]
    ConnectionClosed,

    /// Another request is in flight on this connection.
    #[error("connection is busy with another request")]
    Busy,

    /// The statement did not compile or its arguments did not bind.
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    /// Statement text could not be read.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// A result cell could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] CodecError),

    /// The engine rejected the statement; the connection stays usable.
    #[error("backend error: {0}")]
    Backend(BackendError),

    /// The session is no longer usable; the connection is closed.
    #[error("session is no longer usable: {0}")]
    SessionFatal(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] symql_proto::Error),

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// The backend does not support the operation.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    /// Check if this is a lock or busy condition reported by the engine.
    pub fn is_contention(&self) -> bool {
        matches!(self, Error::Backend(e) if e.class == ErrorClass::Contention)
    }

    /// Check if retrying the same statement may succeed.
    ///
    /// Only contention qualifies; the client never retries on its own.
    pub fn is_retryable(&self) -> bool {
        self.is_contention() || matches!(self, Error::Busy)
    }

    /// Check if the connection was closed by this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::SessionFatal(_) | Error::ConnectionClosed | Error::Timeout
        )
    }

    /// The backend error, if the engine rejected the statement.
    pub fn backend(&self) -> Option<&BackendError> {
        match self {
            Error::Backend(e) => Some(e),
            _ => None,
        }
    }
}
