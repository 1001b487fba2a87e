//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors.
///
/// Every failure to move a message between a connection and its engine
/// ends up here; the connection decides whether it is fatal for the session.
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Protocol version mismatch.
    #[error("protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A frame length exceeded the configured maximum.
    #[error("frame of {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Reading or writing the engine pipes failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
