//! Terminal spawner interface.
//!
//! The runtime consumes the external terminal collaborator through a
//! narrow contract: it hands over the window title, the bound port, and
//! (when configured) the secret. How the terminal window is actually
//! opened, and how its stdin/stdout get bridged to the socket, is the
//! collaborator's business. The spawned process runs detached: closing
//! the terminal never terminates the host, and vice versa.

use std::{fmt, path::Path, process::Stdio};

use tokio::process::Command;

use crate::error::LaunchError;

/// Environment variable carrying the secret to the spawned client.
///
/// The secret never appears on the command line, where other local
/// processes could read it from the process table.
pub const TOKEN_ENV_VAR: &str = "SCRY_REPL_TOKEN";

/// Everything the external terminal needs to connect back.
#[derive(Clone, PartialEq, Eq)]
pub struct SpawnContext {
    /// Terminal window title.
    pub title: String,
    /// Bound loopback port to connect to.
    pub port: u16,
    /// Shared secret, delivered via [`TOKEN_ENV_VAR`].
    pub secret: Option<String>,
}

impl fmt::Debug for SpawnContext {
    // Redacts the secret so spawn logging cannot leak credentials.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnContext")
            .field("title", &self.title)
            .field("port", &self.port)
            .field("secret", &self.secret.as_ref().map(|s| format!("<redacted {} bytes>", s.len())))
            .finish()
    }
}

/// External terminal-spawning collaborator.
pub trait TerminalSpawner: Send + Sync {
    /// Platform precondition check, run before any resource is
    /// allocated. An unsupported environment aborts the launch with
    /// [`LaunchError::PlatformUnsupported`].
    fn preflight(&self) -> Result<(), LaunchError>;

    /// Launch the terminal, detached from the host lifecycle.
    fn spawn(&self, ctx: &SpawnContext) -> Result<(), LaunchError>;
}

/// Double every single quote so the title survives the terminal's own
/// single-quoted command syntax. The terminal's unescaping restores the
/// original title exactly.
pub fn escape_title(title: &str) -> String {
    title.replace('\'', "''")
}

/// Spawner that launches a configured terminal program.
///
/// Arguments are templated: `{title}` expands to the escaped window
/// title and `{port}` to the bound port. The secret travels only in the
/// [`TOKEN_ENV_VAR`] environment variable.
///
/// ```no_run
/// use scry_server::CommandSpawner;
///
/// // xterm -T 'My Title' -e scry-client --port 49152
/// let spawner = CommandSpawner::new(
///     "xterm",
///     ["-T", "{title}", "-e", "scry-client", "--port", "{port}"],
/// );
/// ```
pub struct CommandSpawner {
    program: String,
    args: Vec<String>,
}

impl CommandSpawner {
    /// Create a spawner for the given terminal program and argument
    /// template.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { program: program.into(), args: args.into_iter().map(Into::into).collect() }
    }

    fn render_args(&self, ctx: &SpawnContext) -> Vec<String> {
        let title = escape_title(&ctx.title);
        let port = ctx.port.to_string();

        self.args.iter().map(|arg| arg.replace("{title}", &title).replace("{port}", &port)).collect()
    }

    fn program_exists(&self) -> bool {
        let path = Path::new(&self.program);
        if path.components().count() > 1 {
            return path.is_file();
        }

        std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(path).is_file()))
            .unwrap_or(false)
    }
}

impl TerminalSpawner for CommandSpawner {
    fn preflight(&self) -> Result<(), LaunchError> {
        if self.program_exists() {
            Ok(())
        } else {
            Err(LaunchError::PlatformUnsupported(format!(
                "terminal program not found: {}",
                self.program
            )))
        }
    }

    fn spawn(&self, ctx: &SpawnContext) -> Result<(), LaunchError> {
        let mut command = Command::new(&self.program);
        command
            .args(self.render_args(ctx))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        if let Some(secret) = &ctx.secret {
            command.env(TOKEN_ENV_VAR, secret);
        }

        // The child is dropped without kill-on-drop: it outlives the
        // handle and the host lifecycle, as the contract requires.
        let child = command.spawn().map_err(|e| LaunchError::Spawn(e.to_string()))?;
        tracing::info!("spawned terminal '{}' (pid {:?})", self.program, child.id());

        Ok(())
    }
}
