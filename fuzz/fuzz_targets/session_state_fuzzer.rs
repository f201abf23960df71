//! Fuzz target for the [`Session`] state machine
//!
//! Prevent authentication bypass via arbitrary byte sequences
//!
//! # Strategy
//!
//! - Event sequences: arbitrary interleavings of data chunks, start
//!   events, and peer closes
//! - Fragmentation: chunks split at arbitrary byte boundaries
//! - Auth probing: near-miss secrets, secrets split across chunks,
//!   input pipelined behind the secret line
//!
//! # Invariants
//!
//! - `Closed` is terminal: no actions after it, ever
//! - No prompt is emitted while `AwaitingAuth`
//! - A failed auth closes: `Close` emitted, state `Closed`
//! - At most one auth attempt: once `Active`, no later line can close
//!   the session except a peer disconnect
//! - NEVER panic on arbitrary input bytes

#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use scry_core::{
    EvalError, ReplConfig, Session, SessionAction, SessionEvent, SessionState, Value,
};

#[derive(Debug, Clone, Arbitrary)]
enum FuzzEvent {
    Start,
    Data(Vec<u8>),
    SecretFragment { take: u8 },
    SecretLine,
    PeerClosed,
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    secret: Option<Vec<u8>>,
    events: Vec<FuzzEvent>,
}

fn fuzz_evaluate(line: &str) -> Result<Value, EvalError> {
    if line.len() % 3 == 0 {
        return Err(EvalError::new("scripted failure"));
    }
    Ok(Value::from(line.len()))
}

fuzz_target!(|input: FuzzInput| {
    let secret: Option<String> =
        input.secret.map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string());
    let has_secret = secret.as_deref().is_some_and(|s| !s.is_empty());

    let mut config = ReplConfig::new(Arc::new(fuzz_evaluate));
    if let Some(s) = secret.clone().filter(|s| !s.is_empty()) {
        config = config.with_secret(s);
    }

    let mut session = Session::new(Arc::new(config));
    let expected_initial =
        if has_secret { SessionState::AwaitingAuth } else { SessionState::Active };
    assert_eq!(session.state(), expected_initial);

    let mut sent_fragment = 0usize;

    for event in input.events {
        let previous = session.state();

        let actions = match event {
            FuzzEvent::Start => session.handle(SessionEvent::Start),
            FuzzEvent::Data(bytes) => session.handle(SessionEvent::DataReceived(bytes)),
            FuzzEvent::SecretFragment { take } => {
                // Feed a prefix of the secret without a newline.
                let Some(s) = secret.as_deref() else { continue };
                let take = (take as usize).min(s.len().saturating_sub(sent_fragment));
                let chunk = s.as_bytes()[sent_fragment..sent_fragment + take].to_vec();
                sent_fragment += take;
                session.handle(SessionEvent::DataReceived(chunk))
            },
            FuzzEvent::SecretLine => {
                let Some(s) = secret.as_deref() else { continue };
                let remainder = &s.as_bytes()[sent_fragment.min(s.len())..];
                let mut bytes = remainder.to_vec();
                bytes.push(b'\n');
                sent_fragment = 0;
                session.handle(SessionEvent::DataReceived(bytes))
            },
            FuzzEvent::PeerClosed => session.handle(SessionEvent::PeerClosed),
        };

        // Closed is terminal: nothing comes out of a closed session.
        if previous == SessionState::Closed {
            assert!(actions.is_empty(), "closed session produced actions: {actions:?}");
            assert_eq!(session.state(), SessionState::Closed);
        }

        // No prompt may ever be sent while unauthenticated.
        if previous == SessionState::AwaitingAuth {
            for action in &actions {
                if let SessionAction::SendText(text) = action {
                    assert_eq!(
                        session.state(),
                        SessionState::Active,
                        "text {text:?} sent without authentication"
                    );
                }
            }
        }

        // A Close action always lands in the Closed state.
        if actions.iter().any(|a| matches!(a, SessionAction::Close)) {
            assert_eq!(session.state(), SessionState::Closed);
            assert!(
                matches!(actions.last(), Some(SessionAction::Close)),
                "Close must be the final action"
            );
        }

        // Sessions never move backwards into AwaitingAuth.
        if previous == SessionState::Active {
            assert_ne!(session.state(), SessionState::AwaitingAuth);
        }
    }

    // Poke a finished session once more; it must stay silent.
    if session.state() == SessionState::Closed {
        assert!(session.handle(SessionEvent::DataReceived(b"late\n".to_vec())).is_empty());
        assert!(session.handle(SessionEvent::Start).is_empty());
        assert_eq!(session.state(), SessionState::Closed);
    }
});
