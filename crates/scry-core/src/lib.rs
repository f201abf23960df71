//! Scry protocol core.
//!
//! Sans-IO building blocks for the loopback REPL:
//!
//! ```text
//! scry-core
//!   ├─ ReplConfig    (shared, read-only configuration)
//!   ├─ Evaluator     (caller-supplied line evaluation contract)
//!   ├─ format_value  (total, depth-bounded result rendering)
//!   └─ Session       (per-connection state machine, event in / actions out)
//! ```
//!
//! Nothing in this crate touches a socket. The `scry-server` crate feeds
//! [`SessionEvent`]s into a [`Session`] and executes the [`SessionAction`]s
//! it returns, so the whole protocol is testable without I/O.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod eval;
mod format;
mod session;

pub use config::ReplConfig;
pub use eval::{EvalError, Evaluator, evaluate_guarded};
pub use format::{MAX_RENDER_DEPTH, NULL_PLACEHOLDER, format_value};
/// Structured result value produced by an [`Evaluator`].
pub use serde_json::Value;
pub use session::{PROMPT, Session, SessionAction, SessionEvent, SessionState};
