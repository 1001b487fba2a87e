//! The engine side: executes requests against a SQLite database.
//!
//! The engine reads request frames from its input, runs each one and writes
//! exactly one reply frame per request. Cells go back in the value codec's
//! textual form. Statement failures become classified error replies; only
//! transport failures stop the loop.

use std::io::{Read, Write};
use std::path::Path;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, ErrorCode};
use symql_lang::codec::{quote_text, SQL_NULL};
use symql_proto::framing::{read_frame, write_frame};
use symql_proto::{decode_request, encode_hello, encode_reply, ErrorClass, Hello, Param, Reply, Request};
use tracing::{debug, info, warn};

use crate::error::Error;

/// Engine name announced in the greeting.
pub const ENGINE_NAME: &str = "sqlite";

/// A SQLite database serving requests.
pub struct Engine {
    conn: rusqlite::Connection,
}

impl Engine {
    /// Open the database at `path` (`:memory:` for a private in-memory one).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = rusqlite::Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = rusqlite::Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Greeting for a ready engine.
    pub fn hello() -> Hello {
        Hello::ready(ENGINE_NAME, rusqlite::version())
    }

    /// Run one request and build its reply.
    pub fn handle(&self, request: &Request) -> Reply {
        match self.execute(&request.sql, &request.params) {
            Ok(rows) => Reply::rows(request.id, rows),
            Err(e) => {
                let (class, code) = classify(&e);
                Reply::error(request.id, class, code, e.to_string())
            }
        }
    }

    fn execute(&self, sql: &str, params: &[Param]) -> rusqlite::Result<Vec<Vec<String>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(params.iter().map(sql_value)))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let cells = (0..columns)
                .map(|i| row.get_ref(i).map(encode_cell))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            out.push(cells);
        }
        Ok(out)
    }

    /// Serve requests until `reader` reaches end of input.
    ///
    /// Writes the greeting first. Returns the number of requests served.
    pub fn serve<R: Read, W: Write>(&self, reader: &mut R, writer: &mut W) -> Result<u64, Error> {
        write_hello(writer, &Self::hello())?;

        let mut served = 0u64;
        while let Some(frame) = read_frame(reader)? {
            let request = decode_request(&frame)?;
            debug!(request = request.id, sql = %request.sql, params = request.params.len(), "executing");

            let reply = self.handle(&request);
            if let Reply::Error {
                class, code, message, ..
            } = &reply
            {
                debug!(request = request.id, %class, code, %message, "statement failed");
            }

            write_frame(writer, &encode_reply(&reply)?)?;
            writer.flush()?;
            served += 1;
        }

        info!(requests = served, "input closed, shutting down");
        Ok(served)
    }
}

/// Write a greeting frame.
pub fn write_hello<W: Write>(writer: &mut W, hello: &Hello) -> Result<(), Error> {
    write_frame(writer, &encode_hello(hello)?)?;
    writer.flush()?;
    Ok(())
}

/// Open the database at `path` and serve stdin/stdout until stdin closes.
///
/// A database that cannot be opened is reported in the greeting.
pub fn run(path: &Path) -> Result<u64, Error> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut reader = stdin.lock();
    let mut writer = stdout.lock();

    let engine = match Engine::open(path) {
        Ok(engine) => engine,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to open database");
            write_hello(&mut writer, &Hello::failed(ENGINE_NAME, e.to_string()))?;
            return Err(e);
        }
    };
    info!(path = %path.display(), "database opened");
    engine.serve(&mut reader, &mut writer)
}

fn sql_value(param: &Param) -> SqlValue {
    match param {
        Param::Null => SqlValue::Null,
        Param::Integer(i) => SqlValue::Integer(*i),
        Param::Real(f) => SqlValue::Real(*f),
        Param::Text(text) => SqlValue::Text(text.clone()),
    }
}

/// Encode a result cell in codec form.
fn encode_cell(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => SQL_NULL.to_string(),
        ValueRef::Integer(i) => i.to_string(),
        // Debug keeps the fraction, so 2.0 does not read back as an integer.
        ValueRef::Real(f) => format!("{:?}", f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            quote_text(&String::from_utf8_lossy(bytes))
        }
    }
}

/// Map a SQLite failure to an error class and code.
fn classify(error: &rusqlite::Error) -> (ErrorClass, i32) {
    let rusqlite::Error::SqliteFailure(failure, _) = error else {
        return (ErrorClass::Other, 0);
    };
    let class = match failure.code {
        ErrorCode::ConstraintViolation => ErrorClass::Constraint,
        ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => ErrorClass::Contention,
        ErrorCode::DatabaseCorrupt
        | ErrorCode::NotADatabase
        | ErrorCode::CannotOpen
        | ErrorCode::DiskFull
        | ErrorCode::SystemIoFailure
        | ErrorCode::OutOfMemory => ErrorClass::Fatal,
        // SQLITE_ERROR: syntax errors and unknown tables or columns.
        ErrorCode::Unknown => ErrorClass::Syntax,
        _ => ErrorClass::Other,
    };
    (class, failure.extended_code)
}
