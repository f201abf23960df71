//! Integration harness for the scry REPL.
//!
//! Shared fixtures for end-to-end tests over real loopback TCP:
//!
//! - [`ScriptedEvaluator`] - deterministic evaluator with invocation
//!   counting and failure injection
//! - [`LineClient`] - line-oriented client that reads up to the prompt
//!   marker, the way the spawned terminal would
//! - [`RecordingSpawner`] - terminal spawner double that records spawn
//!   requests instead of opening windows

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::{
    io,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use scry_core::{EvalError, Evaluator, PROMPT, Value};
use scry_server::{LaunchError, SpawnContext, TerminalSpawner};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

/// Deterministic evaluator for end-to-end tests.
///
/// Uppercases its input, answers `2+2` with `4`, fails on lines whose
/// trimmed form starts with `fail:`, and records both the invocation
/// count and the last line it received (untrimmed).
#[derive(Default)]
pub struct ScriptedEvaluator {
    calls: AtomicUsize,
    last_line: Mutex<Option<String>>,
}

impl ScriptedEvaluator {
    /// Create a fresh evaluator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `evaluate` ran.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The exact line the evaluator last received.
    pub fn last_line(&self) -> Option<String> {
        self.last_line.lock().ok().and_then(|guard| guard.clone())
    }
}

impl Evaluator for ScriptedEvaluator {
    fn evaluate(&self, line: &str) -> Result<Value, EvalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_line.lock() {
            *guard = Some(line.to_string());
        }

        let trimmed = line.trim();
        if let Some(msg) = trimmed.strip_prefix("fail:") {
            return Err(EvalError::new(msg));
        }
        if trimmed == "2+2" {
            return Ok(Value::from(4));
        }

        Ok(Value::from(trimmed.to_uppercase()))
    }
}

/// Line-oriented client over a loopback TCP stream.
pub struct LineClient {
    stream: TcpStream,
    buffer: Vec<u8>,
}

impl LineClient {
    /// Connect to a listener on the loopback interface.
    pub async fn connect(port: u16) -> io::Result<Self> {
        let stream = TcpStream::connect(("127.0.0.1", port)).await?;
        Ok(Self { stream, buffer: Vec::new() })
    }

    /// Send one newline-terminated line.
    pub async fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.stream.write_all(format!("{line}\n").as_bytes()).await
    }

    /// Send raw bytes, no terminator appended (fragmentation tests).
    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await
    }

    /// Read until the next prompt marker; returns everything received
    /// before it (the response text). Errors with `UnexpectedEof` if
    /// the connection closes first.
    pub async fn read_until_prompt(&mut self) -> io::Result<String> {
        loop {
            if let Some(pos) = find_subsequence(&self.buffer, PROMPT.as_bytes()) {
                let text = String::from_utf8_lossy(&self.buffer[..pos]).into_owned();
                self.buffer.drain(..pos + PROMPT.len());
                return Ok(text);
            }

            let mut chunk = [0u8; 1024];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed before prompt",
                ));
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Read until the peer closes, returning everything received
    /// (including anything already buffered).
    pub async fn read_to_eof(mut self) -> io::Result<String> {
        let mut rest = Vec::new();
        self.stream.read_to_end(&mut rest).await?;
        self.buffer.extend_from_slice(&rest);
        Ok(String::from_utf8_lossy(&self.buffer).into_owned())
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Terminal spawner double: records every spawn request and opens
/// nothing. Can be scripted to fail preflight or spawn.
#[derive(Default)]
pub struct RecordingSpawner {
    contexts: Mutex<Vec<SpawnContext>>,
    fail_preflight: bool,
    fail_spawn: bool,
}

impl RecordingSpawner {
    /// Spawner that succeeds and records.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawner whose preflight check reports an unsupported platform.
    pub fn failing_preflight() -> Self {
        Self { fail_preflight: true, ..Self::default() }
    }

    /// Spawner whose spawn call fails.
    pub fn failing_spawn() -> Self {
        Self { fail_spawn: true, ..Self::default() }
    }

    /// Every spawn request received so far.
    pub fn spawned(&self) -> Vec<SpawnContext> {
        self.contexts.lock().map(|guard| guard.clone()).unwrap_or_default()
    }
}

impl TerminalSpawner for RecordingSpawner {
    fn preflight(&self) -> Result<(), LaunchError> {
        if self.fail_preflight {
            return Err(LaunchError::PlatformUnsupported("scripted preflight failure".to_string()));
        }
        Ok(())
    }

    fn spawn(&self, ctx: &SpawnContext) -> Result<(), LaunchError> {
        if let Ok(mut guard) = self.contexts.lock() {
            guard.push(ctx.clone());
        }
        if self.fail_spawn {
            return Err(LaunchError::Spawn("scripted spawn failure".to_string()));
        }
        Ok(())
    }
}
