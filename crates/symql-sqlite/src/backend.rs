//! Client-side SQLite backend.
//!
//! Runs the `symql-sqlite` engine binary as a child process and talks to it
//! through [`EngineProcess`].

use std::time::Duration;

use symql_client::config::{IsolationLevel, SessionSettings};
use symql_client::{Backend, EngineProcess, Error};
use symql_lang::{Binding, Dialect, PlaceholderStyle};
use symql_proto::{Reply, Request};

use crate::config::SqliteConfig;

/// SQLite keywords beyond the ANSI set that must be quoted as identifiers.
pub const SQLITE_KEYWORDS: &[&str] = &[
    "ABORT", "ACTION", "ADD", "AFTER", "ANALYZE", "ATTACH", "AUTOINCREMENT", "BEFORE", "BEGIN",
    "CASCADE", "COLLATE", "COMMIT", "CONFLICT", "CURRENT", "CURRENT_DATE", "CURRENT_TIME",
    "CURRENT_TIMESTAMP", "DATABASE", "DEFERRABLE", "DEFERRED", "DETACH", "DO", "EACH", "ESCAPE",
    "EXCEPT", "EXCLUDE", "EXCLUSIVE", "EXPLAIN", "FAIL", "FILTER", "FIRST", "FOLLOWING", "FOR",
    "GENERATED", "GLOB", "GROUPS", "IF", "IGNORE", "IMMEDIATE", "INDEX", "INDEXED", "INITIALLY",
    "INSTEAD", "INTERSECT", "ISNULL", "LAST", "MATCH", "MATERIALIZED", "NATURAL", "NO",
    "NOTHING", "NOTNULL", "NULLS", "OF", "OTHERS", "OVER", "PARTITION", "PLAN", "PRAGMA",
    "PRECEDING", "QUERY", "RAISE", "RANGE", "RECURSIVE", "REGEXP", "REINDEX", "RELEASE",
    "RENAME", "REPLACE", "RESTRICT", "RETURNING", "ROLLBACK", "ROW", "ROWS", "SAVEPOINT",
    "TEMP", "TEMPORARY", "TIES", "TRANSACTION", "TRIGGER", "UNBOUNDED", "VACUUM", "VIEW",
    "VIRTUAL", "WINDOW", "WITHOUT",
];

/// The SQLite dialect.
pub fn sqlite_dialect() -> Dialect {
    Dialect::new("sqlite")
        .with_reserved_words(SQLITE_KEYWORDS.iter().copied())
        .with_type("text", "TEXT")
        .with_type("blob", "BLOB")
        .with_placeholders(PlaceholderStyle::Numbered)
}

/// SQL applying session settings to a SQLite session.
pub fn session_pragmas(settings: &SessionSettings) -> Vec<String> {
    let mut sql = vec![
        format!(
            "PRAGMA foreign_keys = {}",
            if settings.foreign_keys { "ON" } else { "OFF" }
        ),
        format!(
            "PRAGMA read_uncommitted = {}",
            u8::from(settings.isolation == IsolationLevel::ReadUncommitted)
        ),
    ];
    if let Some(timeout) = settings.busy_timeout {
        sql.push(format!("PRAGMA busy_timeout = {}", timeout.as_millis()));
    }
    if !settings.autocommit {
        sql.push("BEGIN".to_string());
    }
    sql
}

/// A session with a `symql-sqlite` engine process.
#[derive(Debug)]
pub struct SqliteBackend {
    process: EngineProcess,
    dialect: Dialect,
    config: SqliteConfig,
}

impl SqliteBackend {
    /// Start an engine for the configured database.
    pub fn connect(config: SqliteConfig) -> Result<Self, Error> {
        let process = EngineProcess::spawn(config.engine_binary(), [config.path.as_os_str()])?;
        Ok(Self {
            process,
            dialect: sqlite_dialect(),
            config,
        })
    }

    /// Configuration this backend was started with.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// SQLite library version reported by the engine.
    pub fn engine_version(&self) -> Option<&str> {
        self.process.hello().map(|hello| hello.engine_version.as_str())
    }
}

impl Backend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    fn binding(&self) -> Binding {
        self.config.binding
    }

    fn session_defaults(&self, settings: &SessionSettings) -> Vec<String> {
        session_pragmas(settings)
    }

    fn send(&mut self, request: &Request) -> Result<(), Error> {
        self.process.send(request)
    }

    fn poll_ready(&mut self, timeout: Duration) -> Result<bool, Error> {
        self.process.poll_ready(timeout)
    }

    fn parse_reply(&mut self) -> Result<Reply, Error> {
        self.process.parse_reply()
    }

    fn close(&mut self) {
        self.process.close();
    }

    /// Restarts the engine. An in-memory database comes back empty.
    fn reconnect(&mut self) -> Result<(), Error> {
        self.process.restart()
    }
}
