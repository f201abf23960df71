//! Launch-time error taxonomy.

use thiserror::Error;

/// Fatal startup errors, funneled through the launch readiness channel.
///
/// Session-local failures never appear here: a rejected secret closes
/// only its own connection, and a failing evaluator line is rendered
/// into that session's transcript.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The host environment cannot run the configured terminal spawner.
    /// Raised by the preflight check before any resource is allocated.
    #[error("platform unsupported: {0}")]
    PlatformUnsupported(String),

    /// The loopback socket could not be bound or could not report a
    /// valid local address. Fatal, never retried.
    #[error("bind failed: {0}")]
    Bind(String),

    /// The external terminal could not be spawned. The already-bound
    /// listener is closed before this is reported.
    #[error("terminal spawn failed: {0}")]
    Spawn(String),

    /// Failure outside the stages above (RNG unavailable, launch task
    /// lost).
    #[error("internal error: {0}")]
    Internal(String),
}
