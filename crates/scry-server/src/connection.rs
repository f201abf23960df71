//! Per-connection driver.
//!
//! Reads raw chunks from the stream, feeds them to the sans-IO
//! [`Session`], and executes the actions it returns, in order. The
//! driver never interprets the protocol itself, so every behavior the
//! wire exhibits is decided (and tested) in `scry-core`.

use std::{io, sync::Arc};

use scry_core::{ReplConfig, Session, SessionAction, SessionEvent};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::watch,
};

const READ_BUF_SIZE: usize = 4096;

/// Drive one accepted connection until the session closes, the peer
/// disconnects, or shutdown is signaled.
///
/// Reads and writes alternate: the next chunk is not read until the
/// previous actions are fully written, which keeps prompt/response
/// pairing intact within the session.
pub(crate) async fn drive(
    mut stream: TcpStream,
    config: Arc<ReplConfig>,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<()> {
    let mut session = Session::new(config);

    if execute(&mut stream, session.handle(SessionEvent::Start)).await? {
        return Ok(());
    }

    let mut buf = [0u8; READ_BUF_SIZE];

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::debug!("session closed by shutdown");
                    let _ = stream.shutdown().await;
                    return Ok(());
                }
            },
            read = stream.read(&mut buf) => {
                let n = read?;
                let event = if n == 0 {
                    SessionEvent::PeerClosed
                } else {
                    SessionEvent::DataReceived(buf[..n].to_vec())
                };

                let closed = execute(&mut stream, session.handle(event)).await?;
                if closed || n == 0 {
                    return Ok(());
                }
            },
        }
    }
}

/// Execute session actions in order. Returns true once the session
/// asked for the stream to be closed.
async fn execute(stream: &mut TcpStream, actions: Vec<SessionAction>) -> io::Result<bool> {
    for action in actions {
        match action {
            SessionAction::SendText(text) => {
                stream.write_all(text.as_bytes()).await?;
            },
            SessionAction::Close => {
                stream.shutdown().await?;
                return Ok(true);
            },
        }
    }

    Ok(false)
}
