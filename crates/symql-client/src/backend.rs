//! Backend capability interface.
//!
//! A backend owns the session with one engine. The [`Connection`] drives it
//! through a fixed sequence per request: [`send`](Backend::send), then
//! [`poll_ready`](Backend::poll_ready) until a reply is available, then
//! [`parse_reply`](Backend::parse_reply). Everything engine specific (the
//! process, its reserved words, how it binds arguments) stays behind this
//! trait.
//!
//! [`Connection`]: crate::Connection

use std::time::Duration;

use symql_lang::{Binding, Dialect};
use symql_proto::{Reply, Request};

use crate::config::SessionSettings;
use crate::error::Error;

/// Contract between a connection and an engine session.
pub trait Backend: Send {
    /// Engine name used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Identifier rules, reserved words and placeholders of the engine.
    fn dialect(&self) -> &Dialect;

    /// How template arguments reach the engine.
    fn binding(&self) -> Binding {
        Binding::Inline
    }

    /// SQL the connection runs once a session opens to apply `settings`.
    fn session_defaults(&self, _settings: &SessionSettings) -> Vec<String> {
        Vec::new()
    }

    /// Send one request. Errors here leave the session unusable.
    fn send(&mut self, request: &Request) -> Result<(), Error>;

    /// Wait up to `timeout` for the reply to the last request.
    ///
    /// Returns `Ok(false)` when nothing arrived in time.
    fn poll_ready(&mut self, timeout: Duration) -> Result<bool, Error>;

    /// Take the reply that [`poll_ready`](Backend::poll_ready) reported.
    fn parse_reply(&mut self) -> Result<Reply, Error>;

    /// Release the session. Called exactly once per open session.
    fn close(&mut self);

    /// Open a fresh session after a close.
    fn reconnect(&mut self) -> Result<(), Error> {
        Err(Error::Unsupported(format!(
            "backend {} cannot reconnect",
            self.name()
        )))
    }
}
