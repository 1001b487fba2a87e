//! Connection state machine.
//!
//! A connection owns one backend session and runs at most one request on it
//! at a time. Statements are compiled through the statement cache, bound
//! according to the backend's binding style, sent, and their reply rows are
//! decoded back into values.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use symql_lang::{codec, Binding, CompiledStatement, Dialect};
use symql_proto::{encode_request, ErrorClass, Param, Reply, Request, Value};
use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::config::ConnectionConfig;
use crate::error::{BackendError, Error};
use crate::registry;

/// Rows returned by a statement.
pub type Rows = Vec<Vec<Value>>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The session is being established.
    Connecting,
    /// Idle and able to take a request.
    Ready,
    /// A request is in flight.
    Busy,
    /// The last statement failed; passes straight back to `Ready`.
    Errored,
    /// The session has been released.
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Busy => "busy",
            ConnectionState::Errored => "errored",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

pub(crate) struct Shared {
    id: u64,
    backend_name: String,
    dialect: Dialect,
    binding: Binding,
    config: ConnectionConfig,
    state: Mutex<ConnectionState>,
    backend: Mutex<Box<dyn Backend>>,
    closing: AtomicBool,
    released: AtomicBool,
    next_request_id: AtomicU64,
    transaction_depth: AtomicUsize,
}

impl Shared {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if *state != next {
            debug!(connection = self.id, from = %*state, to = %next, "state transition");
            *state = next;
        }
    }

    /// Ready -> Busy, refusing a second request.
    fn begin_request(&self) -> Result<(), Error> {
        let mut state = self.state.lock();
        match *state {
            ConnectionState::Ready => {
                debug!(connection = self.id, from = %*state, to = "busy", "state transition");
                *state = ConnectionState::Busy;
                Ok(())
            }
            ConnectionState::Busy => Err(Error::Busy),
            ConnectionState::Closed => Err(Error::ConnectionClosed),
            other => Err(Error::Connection(format!(
                "cannot run a request while {}",
                other
            ))),
        }
    }

    fn finish_request(&self, failed_statement: bool) {
        if self.released.load(Ordering::SeqCst) {
            return;
        }
        if failed_statement {
            self.set_state(ConnectionState::Errored);
        }
        self.set_state(ConnectionState::Ready);
    }

    /// Release the backend session. Runs its body at most once per session.
    fn release(&self, backend: &mut dyn Backend) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.closing.store(true, Ordering::SeqCst);
        self.set_state(ConnectionState::Closed);
        registry::deregister(self.id);
        backend.close();
        info!(connection = self.id, backend = %self.backend_name, "connection closed");
    }

    /// Close now if the backend is idle, otherwise leave it to the request
    /// in flight, which checks the closing flag while it waits.
    fn request_close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        if let Some(mut backend) = self.backend.try_lock() {
            self.release(&mut **backend);
        }
    }

    fn close_now(&self) {
        self.closing.store(true, Ordering::SeqCst);
        let mut backend = self.backend.lock();
        self.release(&mut **backend);
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Run one SQL request through the state machine.
    fn run(&self, shape: &str, sql: String, params: Vec<Param>) -> Result<Rows, Error> {
        if self.is_closing() {
            return Err(Error::ConnectionClosed);
        }
        self.begin_request()?;

        let result = {
            let mut backend = self.backend.lock();
            let result = self.exchange(&mut **backend, shape, sql, params);
            if let Err(e) = &result {
                if ends_session(e) {
                    if let Error::SessionFatal(message) = e {
                        error!(connection = self.id, shape, %message, "session is no longer usable");
                    }
                    self.release(&mut **backend);
                }
            }
            result
        };

        self.finish_request(matches!(result, Err(Error::Backend(_))));
        // A close requested while the backend was locked lands here.
        if self.is_closing() {
            self.close_now();
        }
        result
    }

    /// Send one request and turn its reply into rows or a typed error.
    fn exchange(
        &self,
        backend: &mut dyn Backend,
        shape: &str,
        sql: String,
        params: Vec<Param>,
    ) -> Result<Rows, Error> {
        if self.is_closing() {
            return Err(Error::ConnectionClosed);
        }

        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let request = Request::with_params(id, sql, params);
        let size = encode_request(&request)?.len();
        if size > self.config.max_message_size {
            return Err(Error::Protocol(symql_proto::Error::FrameTooLarge {
                size,
                max: self.config.max_message_size,
            }));
        }

        debug!(connection = self.id, request = id, sql = %request.sql, "sending request");
        backend.send(&request)?;

        let deadline = Instant::now() + self.config.timeout;
        loop {
            if self.is_closing() {
                return Err(Error::ConnectionClosed);
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(connection = self.id, request = id, shape, "request timed out");
                return Err(Error::Timeout);
            }
            let wait = self.config.poll_interval.min(deadline - now);
            if backend.poll_ready(wait)? {
                break;
            }
        }

        let reply = backend.parse_reply()?;
        if reply.id() != id {
            return Err(Error::Protocol(symql_proto::Error::InvalidMessage(format!(
                "reply for request {} while waiting for {}",
                reply.id(),
                id
            ))));
        }

        match reply {
            Reply::Rows { rows, .. } => Ok(rows
                .iter()
                .map(|row| codec::decode_row(row))
                .collect::<Result<Rows, _>>()?),
            Reply::Error {
                class: ErrorClass::Fatal,
                code,
                message,
                ..
            } => Err(Error::SessionFatal(format!("{} (code {})", message, code))),
            Reply::Error {
                class,
                code,
                message,
                ..
            } => {
                warn!(connection = self.id, %class, code, %message, shape, "statement failed");
                Err(Error::Backend(BackendError {
                    class,
                    code,
                    message,
                    shape: shape.to_string(),
                }))
            }
        }
    }

    /// Apply the configured session settings on a freshly opened session.
    fn apply_session_defaults(&self, backend: &mut dyn Backend) -> Result<(), Error> {
        for sql in backend.session_defaults(&self.config.session) {
            let shape = sql.clone();
            self.exchange(backend, &shape, sql, Vec::new())?;
        }
        Ok(())
    }
}

/// Errors after which the session cannot be trusted.
fn ends_session(e: &Error) -> bool {
    // An oversized request is refused before anything is sent.
    !matches!(
        e,
        Error::Backend(_)
            | Error::Decode(_)
            | Error::Busy
            | Error::Protocol(symql_proto::Error::FrameTooLarge { .. })
    )
}

/// A connection to a backend engine.
///
/// Owned by one caller. Dropping a connection that was not closed releases
/// it and logs a leak warning; [`with_connection`](crate::with_connection)
/// closes on every exit path.
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Open a connection over an established backend session.
    ///
    /// The session settings of `config` are applied before the connection
    /// becomes `Ready`; if that fails the session is released.
    pub fn open<B>(backend: B, config: ConnectionConfig) -> Result<Self, Error>
    where
        B: Backend + 'static,
    {
        Self::open_boxed(Box::new(backend), config)
    }

    /// Open a connection over a boxed backend.
    pub fn open_boxed(backend: Box<dyn Backend>, config: ConnectionConfig) -> Result<Self, Error> {
        let shared = Arc::new(Shared {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            backend_name: backend.name().to_string(),
            dialect: backend.dialect().clone(),
            binding: backend.binding(),
            config,
            state: Mutex::new(ConnectionState::Connecting),
            backend: Mutex::new(backend),
            closing: AtomicBool::new(false),
            released: AtomicBool::new(false),
            next_request_id: AtomicU64::new(1),
            transaction_depth: AtomicUsize::new(0),
        });
        let connection = Self { shared };
        connection.establish()?;
        info!(
            connection = connection.id(),
            backend = %connection.shared.backend_name,
            "connection opened"
        );
        Ok(connection)
    }

    /// Connecting -> Ready, or Closed with a connection error.
    fn establish(&self) -> Result<(), Error> {
        let shared = &self.shared;
        let mut backend = shared.backend.lock();
        if let Err(e) = shared.apply_session_defaults(&mut **backend) {
            shared.release(&mut **backend);
            return Err(match e {
                Error::Connection(message) => Error::Connection(message),
                other => Error::Connection(format!("failed to apply session settings: {}", other)),
            });
        }
        shared.set_state(ConnectionState::Ready);
        registry::register(shared);
        Ok(())
    }

    /// Connection identifier, unique within the process.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Backend engine name.
    pub fn backend_name(&self) -> &str {
        &self.shared.backend_name
    }

    /// Dialect statements are compiled for.
    pub fn dialect(&self) -> &Dialect {
        &self.shared.dialect
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Check if the connection can still take requests.
    pub fn is_live(&self) -> bool {
        !self.shared.is_closing() && self.state() != ConnectionState::Closed
    }

    /// Compile a statement through the statement cache.
    pub fn prepare(&self, statement: &Value) -> Result<Arc<CompiledStatement>, Error> {
        let cache = self.shared.config.statement_cache();
        let (compiled, hit) = cache.lookup(statement, &self.shared.dialect)?;
        if hit {
            debug!(connection = self.id(), shape = compiled.shape(), "statement cache hit");
        } else {
            debug!(connection = self.id(), shape = compiled.shape(), "statement cache miss");
        }
        Ok(compiled)
    }

    /// Execute a statement with its template arguments and return the rows.
    ///
    /// Compile and binding errors are returned before anything reaches the
    /// backend. Statement-level backend errors leave the connection `Ready`;
    /// session-level failures close it.
    pub fn execute(&self, statement: &Value, args: &[Value]) -> Result<Rows, Error> {
        if !self.is_live() {
            return Err(Error::ConnectionClosed);
        }
        let compiled = self.prepare(statement)?;
        let bound = compiled.bind(args, self.shared.binding, &self.shared.dialect)?;
        self.shared.run(compiled.shape(), bound.sql, bound.params)
    }

    /// Read a statement from its printed form and execute it.
    pub fn execute_str(&self, source: &str, args: &[Value]) -> Result<Rows, Error> {
        let statement = symql_lang::read(source)?;
        self.execute(&statement, args)
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok` and rolls back when it returns `Err`.
    /// A nested call joins the enclosing transaction.
    pub fn transaction<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Connection) -> Result<T, Error>,
    {
        let depth = TransactionDepth::enter(&self.shared.transaction_depth);
        if depth.nested() {
            return f(self);
        }

        // Without autocommit the session always has a transaction open.
        let autocommit = self.shared.config.session.autocommit;
        if autocommit {
            self.execute(&directive("begin"), &[])?;
        }

        let result = f(self);
        let end = match &result {
            Ok(_) => self.execute(&directive("commit"), &[]),
            Err(_) => self.execute(&directive("rollback"), &[]),
        };
        if !autocommit && self.is_live() {
            self.execute(&directive("begin"), &[])?;
        }

        match (result, end) {
            (Ok(value), Ok(_)) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(rollback)) => {
                warn!(connection = self.id(), error = %rollback, "rollback failed");
                Err(e)
            }
        }
    }

    /// Reopen the session if the backend supports it.
    ///
    /// Works on live and closed connections; the old session is replaced
    /// and the session settings are applied again.
    pub fn reconnect(&self) -> Result<(), Error> {
        let shared = &self.shared;
        let mut backend = shared.backend.lock();
        backend.reconnect()?;

        shared.closing.store(false, Ordering::SeqCst);
        shared.released.store(false, Ordering::SeqCst);
        shared.transaction_depth.store(0, Ordering::SeqCst);
        shared.set_state(ConnectionState::Connecting);
        if let Err(e) = shared.apply_session_defaults(&mut **backend) {
            shared.release(&mut **backend);
            return Err(Error::Connection(format!(
                "failed to apply session settings: {}",
                e
            )));
        }
        shared.set_state(ConnectionState::Ready);
        registry::register(shared);
        info!(connection = shared.id, backend = %shared.backend_name, "connection reopened");
        Ok(())
    }

    /// Close the connection. Closing twice is a no-op.
    ///
    /// A request in flight on another thread fails with
    /// [`Error::ConnectionClosed`].
    pub fn close(&self) {
        self.shared.request_close();
    }

    /// A handle that can close this connection from another thread.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if !self.shared.released.load(Ordering::SeqCst) {
            warn!(
                connection = self.shared.id,
                backend = %self.shared.backend_name,
                "connection dropped without close"
            );
            self.shared.close_now();
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("backend", &self.shared.backend_name)
            .field("state", &self.state())
            .finish()
    }
}

/// Cloneable handle that closes a connection without owning it.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    shared: Weak<Shared>,
}

impl CloseHandle {
    /// Close the connection if it still exists.
    pub fn close(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.request_close();
        }
    }

    /// Check if the connection is still open.
    pub fn is_live(&self) -> bool {
        self.shared
            .upgrade()
            .map(|shared| !shared.is_closing() && shared.state() != ConnectionState::Closed)
            .unwrap_or(false)
    }
}

struct TransactionDepth<'a> {
    depth: &'a AtomicUsize,
    outer: usize,
}

impl<'a> TransactionDepth<'a> {
    fn enter(depth: &'a AtomicUsize) -> Self {
        let outer = depth.fetch_add(1, Ordering::SeqCst);
        Self { depth, outer }
    }

    fn nested(&self) -> bool {
        self.outer > 0
    }
}

impl Drop for TransactionDepth<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

fn directive(name: &str) -> Value {
    Value::vector([Value::keyword(name)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;
    use crate::testing::{ScriptedBackend, Step};
    use pretty_assertions::assert_eq;
    use std::thread;
    use std::time::Duration;
    use symql_lang::{read, StatementCache};

    fn config() -> ConnectionConfig {
        ConnectionConfig::new()
            .with_poll_interval(Duration::from_millis(5))
            .with_cache(Arc::new(StatementCache::new()))
    }

    fn stmt(source: &str) -> Value {
        read(source).unwrap()
    }

    #[test]
    fn test_execute_decodes_rows() {
        let (backend, script) = ScriptedBackend::new();
        script
            .lock()
            .steps
            .push_back(Step::rows(&[&["'\"Jeff\"'", "1000"], &["NULL", "2.5"]]));

        let conn = Connection::open(backend, config()).unwrap();
        let rows = conn
            .execute(
                &stmt("[:select [name id] :from people :where (> salary $s1)]"),
                &[Value::Integer(62000)],
            )
            .unwrap();

        assert_eq!(
            rows,
            vec![
                vec![Value::String("Jeff".into()), Value::Integer(1000)],
                vec![Value::Null, Value::Float(2.5)],
            ]
        );
        assert_eq!(
            script.lock().sent_sql(),
            vec!["SELECT name, id FROM people WHERE salary > 62000"]
        );
        assert_eq!(conn.state(), ConnectionState::Ready);
        conn.close();
    }

    #[test]
    fn test_parameter_binding_backend() {
        let (backend, script) = ScriptedBackend::new();
        let backend = backend.with_binding(Binding::Parameters);
        let conn = Connection::open(backend, config()).unwrap();

        conn.execute(
            &stmt("[:insert-into people :values [$s1 $s2]]"),
            &[Value::String("Jeff".into()), Value::Integer(1000)],
        )
        .unwrap();

        let script = script.lock();
        assert_eq!(script.sent[0].params, vec![Param::Text("\"Jeff\"".into()), Param::Integer(1000)]);
        assert!(!script.sent[0].sql.contains("Jeff"));
        drop(script);
        conn.close();
    }

    #[test]
    fn test_constraint_error_keeps_connection_ready() {
        let (backend, script) = ScriptedBackend::new();
        {
            let mut script = script.lock();
            script.steps.push_back(Step::fail(
                ErrorClass::Constraint,
                2067,
                "UNIQUE constraint failed: people.id",
            ));
            script.steps.push_back(Step::rows(&[&["1"]]));
        }
        let conn = Connection::open(backend, config()).unwrap();

        let err = conn
            .execute(&stmt("[:insert-into people :values [\"Jeff\" 1000]]"), &[])
            .unwrap_err();
        let backend_error = err.backend().unwrap();
        assert_eq!(backend_error.class, ErrorClass::Constraint);
        assert_eq!(backend_error.code, 2067);
        assert_eq!(
            backend_error.shape,
            "[:insert-into people :values [\"Jeff\" 1000]]"
        );
        assert!(!err.is_retryable());
        assert_eq!(conn.state(), ConnectionState::Ready);

        let rows = conn.execute(&stmt("[:select 1]"), &[]).unwrap();
        assert_eq!(rows, vec![vec![Value::Integer(1)]]);
        conn.close();
    }

    #[test]
    fn test_contention_is_retryable() {
        let (backend, script) = ScriptedBackend::new();
        script
            .lock()
            .steps
            .push_back(Step::fail(ErrorClass::Contention, 5, "database is locked"));
        let conn = Connection::open(backend, config()).unwrap();

        let err = conn.execute(&stmt("[:select * :from t]"), &[]).unwrap_err();
        assert!(err.is_contention());
        assert!(conn.is_live());
        conn.close();
    }

    #[test]
    fn test_close_then_execute_does_not_reach_backend() {
        let (backend, script) = ScriptedBackend::new();
        let conn = Connection::open(backend, config()).unwrap();

        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(!conn.is_live());

        let err = conn.execute(&stmt("[:select 1]"), &[]).unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert!(script.lock().sent.is_empty());
    }

    #[test]
    fn test_close_is_idempotent() {
        let (backend, script) = ScriptedBackend::new();
        let conn = Connection::open(backend, config()).unwrap();
        let handle = conn.close_handle();

        conn.close();
        conn.close();
        handle.close();
        drop(conn);

        assert_eq!(script.lock().closes, 1);
        assert!(!handle.is_live());
    }

    #[test]
    fn test_compile_errors_never_reach_backend() {
        let (backend, script) = ScriptedBackend::new();
        let conn = Connection::open(backend, config()).unwrap();

        let err = conn.execute(&stmt("[:select (|| a b)]"), &[]).unwrap_err();
        assert!(matches!(err, Error::Compile(_)));

        let err = conn
            .execute(&stmt("[:select * :from t :where (= id $s1)]"), &[])
            .unwrap_err();
        assert!(matches!(err, Error::Compile(_)));

        assert!(script.lock().sent.is_empty());
        assert_eq!(conn.state(), ConnectionState::Ready);
        conn.close();
    }

    #[test]
    fn test_fatal_reply_closes_session() {
        let (backend, script) = ScriptedBackend::new();
        script
            .lock()
            .steps
            .push_back(Step::fail(ErrorClass::Fatal, 11, "database disk image is malformed"));
        let conn = Connection::open(backend, config()).unwrap();

        let err = conn.execute(&stmt("[:select 1]"), &[]).unwrap_err();
        assert!(matches!(err, Error::SessionFatal(_)));
        assert!(err.is_fatal());
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(script.lock().closes, 1);
    }

    #[test]
    fn test_engine_exit_closes_session() {
        let (backend, script) = ScriptedBackend::new();
        script.lock().steps.push_back(Step::Exit);
        let conn = Connection::open(backend, config()).unwrap();

        assert!(matches!(
            conn.execute(&stmt("[:select 1]"), &[]),
            Err(Error::SessionFatal(_))
        ));
        assert!(!conn.is_live());
    }

    #[test]
    fn test_mismatched_reply_id_is_protocol_error() {
        let (backend, script) = ScriptedBackend::new();
        script.lock().steps.push_back(Step::WrongId);
        let conn = Connection::open(backend, config()).unwrap();

        assert!(matches!(
            conn.execute(&stmt("[:select 1]"), &[]),
            Err(Error::Protocol(_))
        ));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_timeout_closes_session() {
        let (backend, script) = ScriptedBackend::new();
        script.lock().steps.push_back(Step::Hang);
        let conn = Connection::open(
            backend,
            config().with_timeout(Duration::from_millis(40)),
        )
        .unwrap();

        assert!(matches!(
            conn.execute(&stmt("[:select 1]"), &[]),
            Err(Error::Timeout)
        ));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(script.lock().closes, 1);
    }

    #[test]
    fn test_close_unblocks_pending_execute() {
        let (backend, script) = ScriptedBackend::new();
        script.lock().steps.push_back(Step::Hang);
        let conn = Arc::new(Connection::open(backend, config()).unwrap());
        let handle = conn.close_handle();

        let worker = {
            let conn = Arc::clone(&conn);
            thread::spawn(move || conn.execute(&stmt("[:select 1]"), &[]))
        };

        // Wait until the request is in flight.
        while script.lock().sent.is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        handle.close();

        let result = worker.join().unwrap();
        assert!(matches!(result, Err(Error::ConnectionClosed)));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(script.lock().closes, 1);
    }

    #[test]
    fn test_concurrent_execute_is_refused() {
        let (backend, script) = ScriptedBackend::new();
        script.lock().steps.push_back(Step::Hang);
        let conn = Arc::new(
            Connection::open(backend, config().with_timeout(Duration::from_secs(5))).unwrap(),
        );

        let worker = {
            let conn = Arc::clone(&conn);
            thread::spawn(move || conn.execute(&stmt("[:select 1]"), &[]))
        };
        while script.lock().sent.is_empty() {
            thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(conn.state(), ConnectionState::Busy);
        assert!(matches!(
            conn.execute(&stmt("[:select 2]"), &[]),
            Err(Error::Busy)
        ));

        conn.close();
        assert!(matches!(worker.join().unwrap(), Err(Error::ConnectionClosed)));
        assert_eq!(script.lock().sent.len(), 1);
    }

    #[test]
    fn test_oversized_request_keeps_connection() {
        let (backend, script) = ScriptedBackend::new();
        let conn = Connection::open(backend, config().with_max_message_size(64)).unwrap();

        let long = Value::String("x".repeat(256));
        let err = conn
            .execute(&stmt("[:select $s1]"), &[long])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(symql_proto::Error::FrameTooLarge { .. })
        ));
        assert!(script.lock().sent.is_empty());
        assert_eq!(conn.state(), ConnectionState::Ready);
        conn.close();
    }

    #[test]
    fn test_session_defaults_applied_on_open() {
        let (backend, script) = ScriptedBackend::new();
        script.lock().defaults = vec!["PRAGMA foreign_keys = ON".into()];
        let conn = Connection::open(backend, config()).unwrap();

        assert_eq!(script.lock().sent_sql(), vec!["PRAGMA foreign_keys = ON"]);
        assert_eq!(conn.state(), ConnectionState::Ready);
        conn.close();
    }

    #[test]
    fn test_failed_session_defaults_is_connection_error() {
        let (backend, script) = ScriptedBackend::new();
        {
            let mut script = script.lock();
            script.defaults = vec!["PRAGMA nonsense".into()];
            script
                .steps
                .push_back(Step::fail(ErrorClass::Syntax, 1, "near \"nonsense\": syntax error"));
        }

        let err = Connection::open(backend, config()).unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
        assert_eq!(script.lock().closes, 1);
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let (backend, script) = ScriptedBackend::new();
        let conn = Connection::open(backend, config()).unwrap();

        let value = conn
            .transaction(|conn| {
                conn.execute(&stmt("[:delete-from t]"), &[])?;
                conn.transaction(|conn| conn.execute(&stmt("[:delete-from u]"), &[]))?;
                Ok(7)
            })
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(
            script.lock().sent_sql(),
            vec!["BEGIN", "DELETE FROM t", "DELETE FROM u", "COMMIT"]
        );
        conn.close();
    }

    #[test]
    fn test_transaction_rolls_back_on_err() {
        let (backend, script) = ScriptedBackend::new();
        {
            let mut script = script.lock();
            script.steps.push_back(Step::rows(&[]));
            script
                .steps
                .push_back(Step::fail(ErrorClass::Constraint, 19, "CHECK constraint failed"));
        }
        let conn = Connection::open(backend, config()).unwrap();

        let err = conn
            .transaction(|conn| conn.execute(&stmt("[:delete-from t]"), &[]))
            .unwrap_err();

        assert!(matches!(err, Error::Backend(_)));
        assert_eq!(
            script.lock().sent_sql(),
            vec!["BEGIN", "DELETE FROM t", "ROLLBACK"]
        );
        conn.close();
    }

    #[test]
    fn test_reconnect_unsupported() {
        let (backend, _script) = ScriptedBackend::new();
        let conn = Connection::open(backend, config()).unwrap();
        conn.close();
        assert!(matches!(conn.reconnect(), Err(Error::Unsupported(_))));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_reconnect_after_fatal() {
        let (backend, script) = ScriptedBackend::new();
        {
            let mut script = script.lock();
            script.can_reconnect = true;
            script.steps.push_back(Step::Exit);
        }
        let conn = Connection::open(backend, config()).unwrap();
        assert!(conn.execute(&stmt("[:select 1]"), &[]).is_err());
        assert!(!conn.is_live());

        conn.reconnect().unwrap();
        assert!(conn.is_live());
        assert!(registry::is_registered(conn.id()));
        assert_eq!(conn.execute(&stmt("[:select 1]"), &[]).unwrap(), Vec::<Vec<Value>>::new());

        conn.close();
        assert_eq!(script.lock().closes, 2);
    }

    #[test]
    fn test_registry_tracks_open_connections() {
        let (backend, _script) = ScriptedBackend::new();
        let conn = Connection::open(backend, config()).unwrap();
        let id = conn.id();

        assert!(registry::is_registered(id));
        assert!(registry::live_connections()
            .iter()
            .any(|info| info.id == id && info.backend == "scripted"));

        conn.close();
        assert!(!registry::is_registered(id));
    }

    #[test]
    fn test_drop_releases_session() {
        let (backend, script) = ScriptedBackend::new();
        let conn = Connection::open(backend, config()).unwrap();
        let id = conn.id();
        drop(conn);

        assert_eq!(script.lock().closes, 1);
        assert!(!registry::is_registered(id));
    }

    #[test]
    fn test_statement_cache_shared_across_arguments() {
        let cache = Arc::new(StatementCache::new());
        let (backend, _script) = ScriptedBackend::new();
        let conn = Connection::open(backend, config().with_cache(Arc::clone(&cache))).unwrap();
        let statement = stmt("[:select * :from people :where (= id $s1)]");

        conn.execute(&statement, &[Value::Integer(1)]).unwrap();
        conn.execute(&statement, &[Value::Integer(2)]).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().misses(), 1);
        assert_eq!(cache.stats().hits(), 1);
        conn.close();
    }
}
