//! Engine error types.

use thiserror::Error;

/// Engine process errors.
///
/// Statement failures are not errors here; they travel back to the client
/// as error replies. These end the engine process.
#[derive(Debug, Error)]
pub enum Error {
    /// The database could not be opened.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] symql_proto::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
