//! Evaluation contract.
//!
//! The evaluator is an injected capability: Rust has no ambient `eval`,
//! so every launch supplies one. The session treats it as an opaque
//! side-effecting function and makes no consistency guarantees about
//! concurrent invocations from multiple sessions - any state it touches
//! belongs to the host application.

use std::panic::{AssertUnwindSafe, catch_unwind};

use serde_json::Value;
use thiserror::Error;

/// Failure produced by one evaluation.
///
/// Per-line by construction: the session renders the message inline and
/// keeps running. An eval error never closes the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("error: {message}")]
pub struct EvalError {
    /// Human-readable failure description.
    pub message: String,
}

impl EvalError {
    /// Create an error carrying the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Caller-supplied line evaluator.
///
/// Blankness is decided on a trimmed copy of the line; blank lines never
/// reach the evaluator. Non-blank lines arrive exactly as received, with
/// the line terminator stripped but leading/trailing whitespace intact.
pub trait Evaluator: Send + Sync {
    /// Evaluate one input line.
    fn evaluate(&self, line: &str) -> Result<Value, EvalError>;
}

impl<F> Evaluator for F
where
    F: Fn(&str) -> Result<Value, EvalError> + Send + Sync,
{
    fn evaluate(&self, line: &str) -> Result<Value, EvalError> {
        self(line)
    }
}

/// Run the evaluator with a panic boundary.
///
/// A panicking evaluator is converted into an [`EvalError`] instead of
/// unwinding through the session. The panic payload's message is kept
/// when it is a string.
///
/// The guard assumes unwinding panics. Under `panic = "abort"` (the
/// workspace release profile) an evaluator panic aborts the process
/// before this boundary can catch it.
pub fn evaluate_guarded(evaluator: &dyn Evaluator, line: &str) -> Result<Value, EvalError> {
    match catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(line))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "evaluator panicked".to_string());
            tracing::warn!("evaluator panicked: {message}");
            Err(EvalError::new(message))
        },
    }
}
