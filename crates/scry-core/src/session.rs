//! Session state machine.
//!
//! One `Session` per accepted connection. Pure state machine in the
//! event/action style: the connection driver feeds [`SessionEvent`]s and
//! executes the returned [`SessionAction`]s in order; the session never
//! touches a socket.
//!
//! ## States
//!
//! ```text
//! AwaitingAuth ──(first full line == secret)──► Active ──► Closed
//!      │                                          ▲  │
//!      └──(mismatch)──► Closed        (no secret)─┘  └─(peer closed)
//! ```
//!
//! ## Invariants
//!
//! - `Closed` is terminal: no event produces actions afterwards.
//! - At most one authentication attempt; a mismatch closes the stream.
//! - No prompt is ever written before authentication succeeds.
//! - Lines are processed strictly in arrival order, one at a time.

use std::sync::Arc;

use crate::{
    config::ReplConfig,
    eval::evaluate_guarded,
    format::format_value,
};

/// Prompt marker written whenever the session is ready for input.
pub const PROMPT: &str = "> ";

/// Cap on buffered input awaiting a newline. A peer streaming bytes
/// without ever sending a terminator gets disconnected instead of
/// growing the buffer forever.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Secret configured, first full line not yet received.
    AwaitingAuth,
    /// Prompt loop running.
    Active,
    /// Terminal state.
    Closed,
}

/// Inbound events fed by the connection driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Connection established.
    Start,
    /// Raw bytes read from the stream, with whatever fragmentation the
    /// transport produced.
    DataReceived(Vec<u8>),
    /// Peer closed the stream.
    PeerClosed,
}

/// Outbound actions for the driver to execute in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Write this text to the stream.
    SendText(String),
    /// Close the stream. Always the final action of a session.
    Close,
}

/// Per-connection REPL session.
pub struct Session {
    config: Arc<ReplConfig>,
    state: SessionState,
    buffer: Vec<u8>,
}

impl Session {
    /// Create a session over the shared configuration.
    ///
    /// Starts in `AwaitingAuth` when a secret is configured, otherwise
    /// directly in `Active`.
    pub fn new(config: Arc<ReplConfig>) -> Self {
        let state = if config.secret.is_some() {
            SessionState::AwaitingAuth
        } else {
            SessionState::Active
        };

        Self { config, state, buffer: Vec::new() }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Process one event and return the actions to execute.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<SessionAction> {
        if self.state == SessionState::Closed {
            return Vec::new();
        }

        match event {
            SessionEvent::Start => self.handle_start(),
            SessionEvent::DataReceived(bytes) => self.handle_data(&bytes),
            SessionEvent::PeerClosed => {
                tracing::debug!("peer closed, session done");
                self.state = SessionState::Closed;
                Vec::new()
            },
        }
    }

    /// Emit the initial prompt - but only for sessions that start
    /// unauthenticated. An `AwaitingAuth` session stays silent until
    /// the handshake succeeds.
    fn handle_start(&mut self) -> Vec<SessionAction> {
        match self.state {
            SessionState::Active => vec![SessionAction::SendText(PROMPT.to_string())],
            SessionState::AwaitingAuth | SessionState::Closed => Vec::new(),
        }
    }

    fn handle_data(&mut self, bytes: &[u8]) -> Vec<SessionAction> {
        self.buffer.extend_from_slice(bytes);

        if self.buffer.len() > MAX_LINE_BYTES && !self.buffer.contains(&b'\n') {
            tracing::warn!("unterminated input exceeds {MAX_LINE_BYTES} bytes, closing session");
            self.state = SessionState::Closed;
            return vec![SessionAction::Close];
        }

        let mut actions = Vec::new();

        while let Some(line) = self.take_line() {
            match self.state {
                SessionState::AwaitingAuth => actions.extend(self.handle_auth_line(&line)),
                SessionState::Active => actions.push(self.handle_input_line(&line)),
                SessionState::Closed => break,
            }

            if self.state == SessionState::Closed {
                break;
            }
        }

        actions
    }

    /// Pop the next complete newline-terminated line from the buffer,
    /// stripping the terminator and a trailing `\r`.
    fn take_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let mut raw: Vec<u8> = self.buffer.drain(..=pos).collect();
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }

        Some(String::from_utf8_lossy(&raw).into_owned())
    }

    /// Single-shot secret check against the first complete line.
    ///
    /// Comparing a buffered full line (not the first raw read) means a
    /// client whose write arrives fragmented still authenticates.
    fn handle_auth_line(&mut self, line: &str) -> Vec<SessionAction> {
        let matched = self.config.secret.as_deref().is_some_and(|secret| line.trim() == secret);

        if matched {
            tracing::debug!("session authenticated");
            self.state = SessionState::Active;
            vec![SessionAction::SendText(PROMPT.to_string())]
        } else {
            tracing::debug!("authentication failed, closing session");
            self.state = SessionState::Closed;
            vec![SessionAction::Close]
        }
    }

    /// Evaluate one input line and produce the response plus the next
    /// prompt. Eval failures render inline; the session stays `Active`.
    fn handle_input_line(&self, line: &str) -> SessionAction {
        let rendered = if line.trim().is_empty() {
            format_value(self.config.default_value.as_ref())
        } else {
            // Blankness is decided on the trimmed copy; the evaluator
            // receives the original, untrimmed line.
            match evaluate_guarded(self.config.evaluator.as_ref(), line) {
                Ok(value) => format_value(Some(&value)),
                Err(err) => err.to_string(),
            }
        };

        SessionAction::SendText(format!("{rendered}\n{PROMPT}"))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("buffered_bytes", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::{Value, json};

    use super::*;
    use crate::eval::{EvalError, Evaluator};

    /// Uppercases input, fails on `fail:<msg>`, counts invocations.
    struct TestEvaluator {
        calls: AtomicUsize,
    }

    impl TestEvaluator {
        fn new() -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0) })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Evaluator for TestEvaluator {
        fn evaluate(&self, line: &str) -> Result<Value, EvalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some(msg) = line.trim().strip_prefix("fail:") {
                return Err(EvalError::new(msg));
            }
            if line.trim() == "2+2" {
                return Ok(Value::from(4));
            }

            Ok(Value::from(line.to_uppercase()))
        }
    }

    fn open_session(evaluator: Arc<TestEvaluator>) -> Session {
        Session::new(Arc::new(ReplConfig::new(evaluator)))
    }

    fn auth_session(evaluator: Arc<TestEvaluator>, secret: &str) -> Session {
        Session::new(Arc::new(ReplConfig::new(evaluator).with_secret(secret)))
    }

    fn data(bytes: &[u8]) -> SessionEvent {
        SessionEvent::DataReceived(bytes.to_vec())
    }

    #[test]
    fn open_session_starts_active_with_prompt() {
        let mut session = open_session(TestEvaluator::new());
        assert_eq!(session.state(), SessionState::Active);

        let actions = session.handle(SessionEvent::Start);
        assert_eq!(actions, vec![SessionAction::SendText("> ".to_string())]);
    }

    #[test]
    fn auth_session_starts_silent() {
        let mut session = auth_session(TestEvaluator::new(), "xyz");
        assert_eq!(session.state(), SessionState::AwaitingAuth);
        assert!(session.handle(SessionEvent::Start).is_empty());
    }

    #[test]
    fn blank_line_returns_default_without_evaluating() {
        let evaluator = TestEvaluator::new();
        let config = ReplConfig::new(Arc::clone(&evaluator) as Arc<dyn Evaluator>)
            .with_default_value(json!("ready"));
        let mut session = Session::new(Arc::new(config));

        let actions = session.handle(data(b"   \n"));
        assert_eq!(actions, vec![SessionAction::SendText("ready\n> ".to_string())]);
        assert_eq!(evaluator.calls(), 0);
    }

    #[test]
    fn blank_line_without_default_renders_null() {
        let mut session = open_session(TestEvaluator::new());
        let actions = session.handle(data(b"\n"));
        assert_eq!(actions, vec![SessionAction::SendText("null\n> ".to_string())]);
    }

    #[test]
    fn nonblank_line_invokes_evaluator_exactly_once() {
        let evaluator = TestEvaluator::new();
        let mut session = open_session(Arc::clone(&evaluator));

        let actions = session.handle(data(b"hello\n"));
        assert_eq!(actions, vec![SessionAction::SendText("HELLO\n> ".to_string())]);
        assert_eq!(evaluator.calls(), 1);
    }

    #[test]
    fn evaluator_receives_original_untrimmed_line() {
        let seen = Arc::new(std::sync::Mutex::new(String::new()));
        let witness = Arc::clone(&seen);
        let evaluator = move |line: &str| -> Result<Value, EvalError> {
            *witness.lock().unwrap() = line.to_string();
            Ok(Value::Null)
        };

        let mut session = Session::new(Arc::new(ReplConfig::new(Arc::new(evaluator))));
        session.handle(data(b"  spaced  \n"));
        assert_eq!(*seen.lock().unwrap(), "  spaced  ");
    }

    #[test]
    fn eval_failure_keeps_session_alive() {
        let evaluator = TestEvaluator::new();
        let mut session = open_session(Arc::clone(&evaluator));

        let first = session.handle(data(b"fail:boom\n"));
        assert_eq!(first, vec![SessionAction::SendText("error: boom\n> ".to_string())]);
        assert_eq!(session.state(), SessionState::Active);

        let second = session.handle(data(b"2+2\n"));
        assert_eq!(second, vec![SessionAction::SendText("4\n> ".to_string())]);
    }

    #[test]
    fn panicking_evaluator_keeps_session_alive() {
        let evaluator =
            |_: &str| -> Result<Value, EvalError> { std::panic::panic_any("broke".to_string()) };
        let mut session = Session::new(Arc::new(ReplConfig::new(Arc::new(evaluator))));

        let actions = session.handle(data(b"boom\n"));
        assert_eq!(actions, vec![SessionAction::SendText("error: broke\n> ".to_string())]);
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn correct_secret_transitions_to_active_with_prompt() {
        let mut session = auth_session(TestEvaluator::new(), "xyz");

        let actions = session.handle(data(b"xyz\n"));
        assert_eq!(actions, vec![SessionAction::SendText("> ".to_string())]);
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn wrong_secret_closes_without_prompt() {
        let mut session = auth_session(TestEvaluator::new(), "xyz");

        let actions = session.handle(data(b"wrong\n"));
        assert_eq!(actions, vec![SessionAction::Close]);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn fragmented_secret_still_authenticates() {
        let mut session = auth_session(TestEvaluator::new(), "xyz");

        assert!(session.handle(data(b"x")).is_empty());
        assert!(session.handle(data(b"y")).is_empty());
        assert_eq!(session.state(), SessionState::AwaitingAuth);

        let actions = session.handle(data(b"z\n"));
        assert_eq!(actions, vec![SessionAction::SendText("> ".to_string())]);
    }

    #[test]
    fn secret_comparison_trims_line_endings() {
        let mut session = auth_session(TestEvaluator::new(), "xyz");
        let actions = session.handle(data(b"xyz\r\n"));
        assert_eq!(actions, vec![SessionAction::SendText("> ".to_string())]);
    }

    #[test]
    fn pipelined_input_after_secret_is_processed_in_order() {
        let evaluator = TestEvaluator::new();
        let mut session = auth_session(Arc::clone(&evaluator), "xyz");

        let actions = session.handle(data(b"xyz\nhello\n"));
        assert_eq!(
            actions,
            vec![
                SessionAction::SendText("> ".to_string()),
                SessionAction::SendText("HELLO\n> ".to_string()),
            ]
        );
        assert_eq!(evaluator.calls(), 1);
    }

    #[test]
    fn input_after_failed_auth_is_ignored() {
        let evaluator = TestEvaluator::new();
        let mut session = auth_session(Arc::clone(&evaluator), "xyz");

        let actions = session.handle(data(b"wrong\nhello\n"));
        assert_eq!(actions, vec![SessionAction::Close]);
        assert_eq!(evaluator.calls(), 0);
    }

    #[test]
    fn closed_is_terminal() {
        let mut session = open_session(TestEvaluator::new());
        session.handle(SessionEvent::PeerClosed);
        assert_eq!(session.state(), SessionState::Closed);

        assert!(session.handle(data(b"hello\n")).is_empty());
        assert!(session.handle(SessionEvent::Start).is_empty());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn multiple_lines_in_one_chunk_stay_ordered() {
        let mut session = open_session(TestEvaluator::new());

        let actions = session.handle(data(b"a\nb\n"));
        assert_eq!(
            actions,
            vec![
                SessionAction::SendText("A\n> ".to_string()),
                SessionAction::SendText("B\n> ".to_string()),
            ]
        );
    }

    #[test]
    fn unterminated_flood_closes_session() {
        let mut session = open_session(TestEvaluator::new());

        let actions = session.handle(data(&vec![b'x'; MAX_LINE_BYTES + 1]));
        assert_eq!(actions, vec![SessionAction::Close]);
        assert_eq!(session.state(), SessionState::Closed);
    }

    proptest::proptest! {
        // No chunking of arbitrary bytes ever produces a prompt (or a
        // panic) before authentication succeeds.
        #[test]
        fn prop_no_prompt_before_auth(chunks in proptest::collection::vec(
            proptest::collection::vec(proptest::prelude::any::<u8>(), 0..64),
            0..16,
        )) {
            let mut session = auth_session(TestEvaluator::new(), "pr0ptest-secret");
            session.handle(SessionEvent::Start);

            for chunk in chunks {
                let actions = session.handle(SessionEvent::DataReceived(chunk));
                for action in &actions {
                    if let SessionAction::SendText(text) = action {
                        // Only reachable by a chunk sequence that spelled
                        // out the secret line.
                        proptest::prop_assert_eq!(session.state(), SessionState::Active);
                        proptest::prop_assert!(text.ends_with(PROMPT));
                    }
                }
            }
        }
    }
}
