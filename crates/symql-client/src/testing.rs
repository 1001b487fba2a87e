//! Scripted in-memory backend for connection tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use symql_lang::{Binding, Dialect};
use symql_proto::{ErrorClass, Reply, Request};

use crate::backend::Backend;
use crate::config::SessionSettings;
use crate::error::Error;

/// What the backend does with the next request.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Rows(Vec<Vec<String>>),
    Fail(ErrorClass, i32, String),
    /// Never becomes ready.
    Hang,
    /// Replies to a different request id.
    WrongId,
    /// The engine goes away.
    Exit,
}

impl Step {
    pub(crate) fn rows(rows: &[&[&str]]) -> Self {
        Step::Rows(
            rows.iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        )
    }

    pub(crate) fn fail(class: ErrorClass, code: i32, message: &str) -> Self {
        Step::Fail(class, code, message.to_string())
    }
}

#[derive(Debug, Default)]
pub(crate) struct Script {
    pub steps: VecDeque<Step>,
    pub sent: Vec<Request>,
    pub defaults: Vec<String>,
    pub closes: usize,
    pub reconnects: usize,
    pub can_reconnect: bool,
}

impl Script {
    pub(crate) fn sent_sql(&self) -> Vec<&str> {
        self.sent.iter().map(|r| r.sql.as_str()).collect()
    }
}

pub(crate) struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
    dialect: Dialect,
    binding: Binding,
    current: Option<(u64, Step)>,
    open: bool,
}

impl ScriptedBackend {
    pub(crate) fn new() -> (Self, Arc<Mutex<Script>>) {
        let script = Arc::new(Mutex::new(Script::default()));
        let backend = Self {
            script: Arc::clone(&script),
            dialect: Dialect::new("scripted"),
            binding: Binding::Inline,
            current: None,
            open: true,
        };
        (backend, script)
    }

    pub(crate) fn with_binding(mut self, binding: Binding) -> Self {
        self.binding = binding;
        self
    }
}

impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    fn binding(&self) -> Binding {
        self.binding
    }

    fn session_defaults(&self, _settings: &SessionSettings) -> Vec<String> {
        self.script.lock().defaults.clone()
    }

    fn send(&mut self, request: &Request) -> Result<(), Error> {
        if !self.open {
            return Err(Error::SessionFatal("session is not open".into()));
        }
        let mut script = self.script.lock();
        script.sent.push(request.clone());
        let step = script.steps.pop_front().unwrap_or(Step::Rows(Vec::new()));
        self.current = Some((request.id, step));
        Ok(())
    }

    fn poll_ready(&mut self, timeout: Duration) -> Result<bool, Error> {
        match &self.current {
            Some((_, Step::Hang)) => {
                thread::sleep(timeout);
                Ok(false)
            }
            Some((_, Step::Exit)) => Err(Error::SessionFatal("engine exited".into())),
            _ => Ok(true),
        }
    }

    fn parse_reply(&mut self) -> Result<Reply, Error> {
        match self.current.take() {
            Some((id, Step::Rows(rows))) => Ok(Reply::rows(id, rows)),
            Some((id, Step::Fail(class, code, message))) => {
                Ok(Reply::error(id, class, code, message))
            }
            Some((id, Step::WrongId)) => Ok(Reply::rows(id + 1, Vec::new())),
            _ => Err(Error::SessionFatal("no reply".into())),
        }
    }

    fn close(&mut self) {
        self.open = false;
        self.script.lock().closes += 1;
    }

    fn reconnect(&mut self) -> Result<(), Error> {
        let mut script = self.script.lock();
        if !script.can_reconnect {
            return Err(Error::Unsupported("scripted backend cannot reconnect".into()));
        }
        script.reconnects += 1;
        self.open = true;
        Ok(())
    }
}
