//! symql SQLite backend.
//!
//! Two halves share this crate:
//!
//! - [`SqliteBackend`] - the client side, a [`Backend`] that runs the engine
//!   binary as a child process
//! - [`server::Engine`] - the engine side, built into the `symql-sqlite`
//!   binary, which executes requests with rusqlite
//!
//! # Quick Start
//!
//! ```ignore
//! use symql_client::ConnectionConfig;
//! use symql_sqlite::{connect, SqliteConfig};
//!
//! let conn = connect(SqliteConfig::new("people.db"), ConnectionConfig::default())?;
//! conn.execute_str("[:create-table people ([name id])]", &[])?;
//! conn.close();
//! ```
//!
//! [`Backend`]: symql_client::Backend

pub mod backend;
pub mod config;
pub mod error;
pub mod server;

pub use backend::{sqlite_dialect, SqliteBackend};
pub use config::SqliteConfig;
pub use error::Error;

use symql_client::{Connection, ConnectionConfig};

/// Start an engine for `sqlite` and open a connection to it.
pub fn connect(sqlite: SqliteConfig, config: ConnectionConfig) -> Result<Connection, symql_client::Error> {
    let backend = SqliteBackend::connect(sqlite)?;
    Connection::open(backend, config)
}
