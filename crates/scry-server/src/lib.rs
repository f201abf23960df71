//! Scry production runtime.
//!
//! This crate wires the sans-IO protocol core to real I/O:
//!
//! ```text
//! scry-server
//!   ├─ launch            (coordinator: preflight → bind → spawn)
//!   ├─ Listener          (loopback TCP, ephemeral port, accept loop)
//!   ├─ connection driver (feeds bytes into scry-core Session)
//!   └─ TerminalSpawner   (external terminal collaborator interface)
//! ```
//!
//! The listener binds `127.0.0.1:0` so the operating system assigns an
//! unused ephemeral port; the terminal spawner receives that port (and
//! the secret, via an environment variable) and bridges a visible
//! terminal window to the socket.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod error;
mod launch;
mod listener;
mod spawn;

pub use error::LaunchError;
pub use launch::{LaunchHandle, launch};
pub use listener::Listener;
pub use spawn::{CommandSpawner, SpawnContext, TOKEN_ENV_VAR, TerminalSpawner, escape_title};
