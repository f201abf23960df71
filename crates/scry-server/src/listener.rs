//! Loopback listener.

use std::sync::Arc;

use scry_core::ReplConfig;
use tokio::{net::TcpListener, sync::watch};

use crate::{connection, error::LaunchError};

/// Loopback TCP listener owning the accept loop and all session tasks.
///
/// Bound to `127.0.0.1:0`: the operating system assigns an ephemeral
/// port, so two independent listeners in the same process always get
/// distinct ports.
pub struct Listener {
    port: u16,
    shutdown: watch::Sender<bool>,
}

impl Listener {
    /// Bind the loopback socket and start accepting connections.
    ///
    /// Each accepted connection runs a [`scry_core::Session`] on its own
    /// task; sessions never block each other.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::Bind`] if the socket cannot be created or
    /// its local address cannot be determined.
    pub async fn bind(config: Arc<ReplConfig>) -> Result<Self, LaunchError> {
        let socket = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| LaunchError::Bind(e.to_string()))?;
        let addr = socket.local_addr().map_err(|e| LaunchError::Bind(e.to_string()))?;
        let port = addr.port();

        tracing::info!("listener bound on {addr}");

        let (shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(accept_loop(socket, config, shutdown_rx));

        Ok(Self { port, shutdown })
    }

    /// The OS-assigned loopback port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop accepting and close every open session.
    ///
    /// Idempotent: calling it again (or on an already-finished listener)
    /// does nothing.
    pub fn stop(&self) {
        if self.shutdown.send(true).is_err() {
            tracing::debug!("listener already stopped");
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn accept_loop(
    socket: TcpListener,
    config: Arc<ReplConfig>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::debug!("listener shutting down");
                    break;
                }
            },
            accepted = socket.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!("accepted connection from {peer}");
                    let config = Arc::clone(&config);
                    let shutdown = shutdown.clone();

                    tokio::spawn(async move {
                        if let Err(e) = connection::drive(stream, config, shutdown).await {
                            tracing::debug!("session ended with error: {e}");
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("accept error: {e}");
                },
            },
        }
    }
}
