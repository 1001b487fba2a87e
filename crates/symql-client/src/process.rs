//! Engine process transport shared by process-based backends.
//!
//! The engine runs as a child process speaking length-prefixed frames on
//! its stdin and stdout. A reader thread turns stdout into frames and hands
//! them over a channel, so waiting for a reply can be bounded by a timeout.

use std::ffi::OsString;
use std::io::{Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use symql_proto::framing::{write_frame, FrameDecoder};
use symql_proto::{decode_hello, decode_reply, encode_request, Hello, Reply, Request};
use tracing::{debug, warn};

use crate::error::Error;

/// How long an engine gets to write its greeting.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// How long an engine gets to exit after its stdin closes.
const EXIT_GRACE: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 64 * 1024;

type Frame = Result<Bytes, symql_proto::Error>;

struct Running {
    child: Child,
    stdin: Option<ChildStdin>,
    frames: Receiver<Frame>,
    reader: Option<JoinHandle<()>>,
    pending: Option<Bytes>,
}

/// A running engine child process.
pub struct EngineProcess {
    program: OsString,
    args: Vec<OsString>,
    running: Option<Running>,
    hello: Option<Hello>,
}

impl EngineProcess {
    /// Describe an engine process without starting it.
    pub fn new<I, A>(program: impl Into<OsString>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            running: None,
            hello: None,
        }
    }

    /// Start the process and wait for its greeting.
    pub fn spawn<I, A>(program: impl Into<OsString>, args: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        let mut process = Self::new(program, args);
        process.start()?;
        Ok(process)
    }

    /// Start the process if it is not running.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.running.is_some() {
            return Ok(());
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                Error::Connection(format!(
                    "failed to start engine {}: {}",
                    self.program.to_string_lossy(),
                    e
                ))
            })?;

        let stdin = child.stdin.take();
        let Some(stdout) = child.stdout.take() else {
            discard(&mut child);
            return Err(Error::Connection("engine stdout is not piped".into()));
        };

        let (tx, rx) = channel::unbounded();
        let reader = match thread::Builder::new()
            .name("symql-engine-reader".into())
            .spawn(move || read_frames(stdout, tx))
        {
            Ok(reader) => reader,
            Err(e) => {
                discard(&mut child);
                return Err(Error::Connection(format!(
                    "failed to start reader thread: {}",
                    e
                )));
            }
        };

        let mut running = Running {
            child,
            stdin,
            frames: rx,
            reader: Some(reader),
            pending: None,
        };

        match wait_for_hello(&running.frames) {
            Ok(hello) => {
                debug!(
                    engine = %hello.engine,
                    version = %hello.engine_version,
                    pid = running.child.id(),
                    "engine started"
                );
                self.hello = Some(hello);
                self.running = Some(running);
                Ok(())
            }
            Err(e) => {
                shutdown(&mut running);
                Err(e)
            }
        }
    }

    /// Greeting from the current process.
    pub fn hello(&self) -> Option<&Hello> {
        self.hello.as_ref()
    }

    /// Check if the process is running.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Write a request frame.
    pub fn send(&mut self, request: &Request) -> Result<(), Error> {
        let running = self.running.as_mut().ok_or(Error::ConnectionClosed)?;
        let stdin = running.stdin.as_mut().ok_or(Error::ConnectionClosed)?;
        let payload = encode_request(request)?;
        write_frame(stdin, &payload)
            .and_then(|()| stdin.flush().map_err(symql_proto::Error::from))
            .map_err(|e| Error::SessionFatal(format!("failed to write to engine: {}", e)))
    }

    /// Wait up to `timeout` for a reply frame.
    pub fn poll_ready(&mut self, timeout: Duration) -> Result<bool, Error> {
        let running = self.running.as_mut().ok_or(Error::ConnectionClosed)?;
        if running.pending.is_some() {
            return Ok(true);
        }
        match running.frames.recv_timeout(timeout) {
            Ok(Ok(frame)) => {
                running.pending = Some(frame);
                Ok(true)
            }
            Ok(Err(e)) => Err(Error::SessionFatal(format!(
                "unreadable frame from engine: {}",
                e
            ))),
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::SessionFatal("engine exited".into()))
            }
        }
    }

    /// Decode the frame found by [`poll_ready`](Self::poll_ready).
    pub fn parse_reply(&mut self) -> Result<Reply, Error> {
        let running = self.running.as_mut().ok_or(Error::ConnectionClosed)?;
        let frame = running
            .pending
            .take()
            .ok_or_else(|| Error::Protocol(symql_proto::Error::InvalidMessage(
                "no reply is ready".into(),
            )))?;
        Ok(decode_reply(&frame)?)
    }

    /// Stop the process. Does nothing if it is not running.
    pub fn close(&mut self) {
        if let Some(mut running) = self.running.take() {
            shutdown(&mut running);
        }
    }

    /// Stop the process and start a new one.
    pub fn restart(&mut self) -> Result<(), Error> {
        self.close();
        self.start()
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for EngineProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineProcess")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("running", &self.is_running())
            .finish()
    }
}

fn read_frames(mut stdout: ChildStdout, tx: Sender<Frame>) {
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = match stdout.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(Err(e.into()));
                return;
            }
        };
        decoder.push(&buf[..n]);
        loop {
            match decoder.next_frame() {
                Ok(Some(frame)) => {
                    if tx.send(Ok(frame)).is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.send(Err(e));
                    return;
                }
            }
        }
    }
}

fn wait_for_hello(frames: &Receiver<Frame>) -> Result<Hello, Error> {
    let frame = match frames.recv_timeout(STARTUP_TIMEOUT) {
        Ok(frame) => frame?,
        Err(RecvTimeoutError::Timeout) => {
            return Err(Error::Connection("engine did not greet in time".into()))
        }
        Err(RecvTimeoutError::Disconnected) => {
            return Err(Error::Connection("engine exited during startup".into()))
        }
    };
    let hello = decode_hello(&frame)?;
    hello.check()?;
    if let Some(error) = &hello.error {
        return Err(Error::Connection(format!(
            "engine {} failed to start: {}",
            hello.engine, error
        )));
    }
    Ok(hello)
}

/// Kill a child that never became a running engine.
fn discard(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn shutdown(running: &mut Running) {
    // Closing stdin asks the engine to exit.
    running.stdin.take();

    let deadline = Instant::now() + EXIT_GRACE;
    loop {
        match running.child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
            Ok(None) | Err(_) => {
                warn!(pid = running.child.id(), "engine did not exit, killing it");
                let _ = running.child.kill();
                let _ = running.child.wait();
                break;
            }
        }
    }

    if let Some(reader) = running.reader.take() {
        let _ = reader.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_connection_error() {
        let err = EngineProcess::spawn("symql-engine-that-does-not-exist", Vec::<String>::new())
            .unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[test]
    fn test_silent_exit_is_connection_error() {
        // `true` exits immediately without a greeting.
        let err = EngineProcess::spawn("true", Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[test]
    fn test_discard_reaps_child() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        discard(&mut child);
        assert!(child.try_wait().unwrap().is_some());
    }

    #[test]
    fn test_not_running_until_started() {
        let mut process = EngineProcess::new("true", Vec::<String>::new());
        assert!(!process.is_running());
        assert!(process.hello().is_none());
        assert!(matches!(
            process.send(&Request::new(1, "SELECT 1")),
            Err(Error::ConnectionClosed)
        ));
        process.close();
    }
}
