//! SQLite backend and engine configuration.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;
use symql_lang::Binding;

/// Database path that opens a private in-memory database.
pub const MEMORY_DATABASE: &str = ":memory:";

/// Environment variable naming the engine binary.
pub const ENGINE_BIN_ENV: &str = "SYMQL_SQLITE_BIN";

/// Engine binary name looked up on `PATH`.
pub const ENGINE_BIN_NAME: &str = "symql-sqlite";

/// Configuration for a SQLite backend session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    /// Database file, or `:memory:`.
    pub path: PathBuf,

    /// Engine binary; see [`engine_binary`](Self::engine_binary).
    pub binary: Option<PathBuf>,

    /// How arguments reach the engine.
    pub binding: Binding,
}

impl SqliteConfig {
    /// Configuration for the database at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            binary: None,
            binding: Binding::Parameters,
        }
    }

    /// Configuration for a private in-memory database.
    pub fn in_memory() -> Self {
        Self::new(MEMORY_DATABASE)
    }

    /// Use an explicit engine binary.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    /// Set how arguments reach the engine.
    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.binding = binding;
        self
    }

    /// Check if the database lives in memory.
    pub fn is_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_DATABASE
    }

    /// The engine binary to start: the explicit one, else
    /// `SYMQL_SQLITE_BIN`, else `symql-sqlite` from `PATH`.
    pub fn engine_binary(&self) -> OsString {
        self.binary
            .as_ref()
            .map(|path| path.clone().into_os_string())
            .or_else(|| std::env::var_os(ENGINE_BIN_ENV).filter(|value| !value.is_empty()))
            .unwrap_or_else(|| OsString::from(ENGINE_BIN_NAME))
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Command-line arguments for the engine binary.
#[derive(Parser, Debug)]
#[command(name = "symql-sqlite")]
#[command(version, about = "SQLite engine process for symql", long_about = None)]
pub struct Args {
    /// Database file to open.
    #[arg(default_value = MEMORY_DATABASE)]
    pub path: PathBuf,
}
