//! Launch coordination.
//!
//! `launch` runs the whole startup sequence on a supervised task:
//! preflight → bind → secret generation → terminal spawn. The caller
//! gets a [`LaunchHandle`] immediately; the bound port or the first
//! fatal error arrives through the handle's readiness channel. Nothing
//! in this path panics the host - even a panic inside the launch task
//! surfaces as [`LaunchError::Internal`] on the channel.

use std::sync::{Arc, Mutex};

use scry_core::ReplConfig;
use tokio::sync::oneshot;

use crate::{
    error::LaunchError,
    listener::Listener,
    spawn::{SpawnContext, TerminalSpawner},
};

/// Handle to a launched REPL.
pub struct LaunchHandle {
    ready: Option<oneshot::Receiver<Result<u16, LaunchError>>>,
    listener: Arc<Mutex<Option<Listener>>>,
}

impl LaunchHandle {
    /// Wait for startup to finish.
    ///
    /// Resolves to the bound port on success or the first fatal error
    /// otherwise. This is the single error-reporting channel: launch
    /// failures are delivered here (and logged), never thrown at the
    /// caller. One-shot; a second await reports an internal error.
    pub async fn ready(&mut self) -> Result<u16, LaunchError> {
        let Some(rx) = self.ready.take() else {
            return Err(LaunchError::Internal("launch outcome already consumed".to_string()));
        };

        rx.await
            .unwrap_or_else(|_| Err(LaunchError::Internal("launch task vanished".to_string())))
    }

    /// Stop the listener and all active sessions. Idempotent; safe to
    /// call before startup has finished.
    pub fn shutdown(&self) {
        if let Ok(guard) = self.listener.lock() {
            if let Some(listener) = guard.as_ref() {
                listener.stop();
            }
        }
    }
}

/// Start the REPL: validate the environment, bind the loopback
/// listener, ensure a secret exists, then hand port + title + secret to
/// the terminal spawner.
///
/// Returns immediately. A spawn failure closes the already-bound
/// listener so no socket leaks past a failed launch. Calling from
/// outside a tokio runtime is reported through the readiness channel
/// like any other fatal error.
pub fn launch(config: ReplConfig, spawner: Arc<dyn TerminalSpawner>) -> LaunchHandle {
    let (tx, rx) = oneshot::channel();
    let slot: Arc<Mutex<Option<Listener>>> = Arc::new(Mutex::new(None));
    let task_slot = Arc::clone(&slot);

    let runtime = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            let err = LaunchError::Internal("no tokio runtime available".to_string());
            tracing::error!("launch failed: {err}");
            let _ = tx.send(Err(err));
            return LaunchHandle { ready: Some(rx), listener: slot };
        },
    };

    runtime.spawn(async move {
        let outcome = start(config, spawner.as_ref(), &task_slot).await;
        if let Err(err) = &outcome {
            tracing::error!("launch failed: {err}");
        }
        let _ = tx.send(outcome);
    });

    LaunchHandle { ready: Some(rx), listener: slot }
}

async fn start(
    mut config: ReplConfig,
    spawner: &dyn TerminalSpawner,
    slot: &Mutex<Option<Listener>>,
) -> Result<u16, LaunchError> {
    spawner.preflight()?;

    if config.secret.is_none() {
        config.secret = Some(generate_token()?);
    }

    let title = config.title.clone();
    let secret = config.secret.clone();

    let listener = Listener::bind(Arc::new(config)).await?;
    let port = listener.port();
    store_listener(slot, listener);

    let ctx = SpawnContext { title, port, secret };
    if let Err(err) = spawner.spawn(&ctx) {
        // Don't leak the bound socket past a failed launch.
        if let Ok(guard) = slot.lock() {
            if let Some(listener) = guard.as_ref() {
                listener.stop();
            }
        }
        return Err(err);
    }

    tracing::info!("REPL ready on 127.0.0.1:{port}");
    Ok(port)
}

fn store_listener(slot: &Mutex<Option<Listener>>, listener: Listener) {
    if let Ok(mut guard) = slot.lock() {
        *guard = Some(listener);
    }
}

/// 128-bit random hex token, generated once per launch when the caller
/// did not configure a secret.
fn generate_token() -> Result<String, LaunchError> {
    let mut buf = [0u8; 16];
    getrandom::fill(&mut buf)
        .map_err(|e| LaunchError::Internal(format!("rng unavailable: {e}")))?;

    Ok(buf.iter().map(|b| format!("{b:02x}")).collect())
}
