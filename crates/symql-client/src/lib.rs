//! symql client - connections to out-of-process SQL engines.
//!
//! A [`Connection`] owns one session with a backend engine and exposes a
//! single blocking entry point, [`Connection::execute`], which compiles a
//! symbolic statement, binds its template arguments, sends it and decodes
//! the reply rows. Engines plug in through the [`Backend`] trait.
//!
//! # Quick Start
//!
//! ```ignore
//! use symql_client::{with_connection, ConnectionConfig};
//! use symql_client::proto::Value;
//!
//! let rows = with_connection(backend, ConnectionConfig::default(), |conn| {
//!     conn.execute_str(
//!         "[:select [name id] :from people :where (> salary $s1)]",
//!         &[Value::Integer(62000)],
//!     )
//! })?;
//! ```

pub mod backend;
pub mod config;
pub mod connection;
pub mod error;
pub mod process;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::Backend;
pub use config::{ConnectionConfig, IsolationLevel, SessionSettings};
pub use connection::{CloseHandle, Connection, ConnectionState, Rows};
pub use error::{BackendError, Error};
pub use process::EngineProcess;
pub use registry::{live_connections, ConnectionInfo};

/// Re-export the statement language.
pub use symql_lang as lang;
/// Re-export protocol types.
pub use symql_proto as proto;

/// Open a connection, run `f` with it and close it on every exit path.
pub fn with_connection<B, T, F>(backend: B, config: ConnectionConfig, f: F) -> Result<T, Error>
where
    B: Backend + 'static,
    F: FnOnce(&Connection) -> Result<T, Error>,
{
    let connection = Connection::open(backend, config)?;
    let guard = CloseOnDrop(&connection);
    let result = f(guard.0);
    drop(guard);
    result
}

/// Closes the connection even when `f` panics.
struct CloseOnDrop<'a>(&'a Connection);

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}
