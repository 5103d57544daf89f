//! TCP accept loop. Every connection gets its own task: sniff the
//! first bytes, then hand the stream to the legacy or framed driver.

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::detector::{detect, Verdict};
use super::{framed, legacy, ConnectionError};
use crate::state::ServerState;

/// Bind the configured address and serve until the shutdown flag flips.
pub async fn run(
    state: Arc<ServerState>,
    shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(state.config.bind_addr()).await?;
    info!("listening on {}", listener.local_addr()?);
    serve(listener, state, shutdown).await
}

async fn serve(
    listener: TcpListener,
    state: Arc<ServerState>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("set_nodelay for {peer}: {e}");
                    }
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        debug!("connection from {peer}");
                        if let Err(e) = dispatch(stream, state).await {
                            debug!("connection {peer} closed: {e}");
                        }
                    });
                }
                Err(e) => warn!("accept error: {e}"),
            },
            changed = shutdown.changed() => {
                // A dropped sender counts as shutdown too.
                if changed.is_err() || *shutdown.borrow() {
                    info!("listener stopped");
                    return Ok(());
                }
            }
        }
    }
}

async fn dispatch(mut stream: TcpStream, state: Arc<ServerState>) -> Result<(), ConnectionError> {
    match detect(&mut stream, &state).await? {
        Verdict::Legacy(seed) => legacy::run(stream, seed, state).await,
        Verdict::Framed(seed) => framed::run(stream, seed, state).await,
        Verdict::Handled => Ok(()),
    }
}
