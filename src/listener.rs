//! Shared TCP accept loop for the SOCKS5 and tunnel listeners

use crate::error::SocksVpnError;
use crate::helper::{shutdown_pending, shutdown_signal};
use crate::transport::SocketOpts;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Pause after a failed accept, e.g. when the fd limit is hit
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Bind a listener, naming the address on failure
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, SocksVpnError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| SocksVpnError::Bind { addr, source })
}

/// Accept connections until shutdown, handing each one to `on_accept`
///
/// Every accepted stream comes with its own shutdown receiver, subscribed
/// before the loop checks for a pending signal: a connection is either
/// handed over with a receiver that will see the signal, or dropped.
/// Accept errors are logged and never end the loop.
pub async fn accept_loop<F>(
    name: &str,
    listener: &TcpListener,
    socket_opts: &SocketOpts,
    shutdown_rx: &mut broadcast::Receiver<bool>,
    mut on_accept: F,
) where
    F: FnMut(TcpStream, SocketAddr, broadcast::Receiver<bool>),
{
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let session_rx = shutdown_rx.resubscribe();
                    if shutdown_pending(shutdown_rx) {
                        debug!("{} dropping {} accepted during shutdown", name, peer);
                        info!("{} listener stopping", name);
                        break;
                    }
                    socket_opts.hint(&stream);
                    on_accept(stream, peer, session_rx);
                }
                Err(e) => {
                    warn!("{} accept failed: {}", name, e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
            _ = shutdown_signal(shutdown_rx) => {
                info!("{} listener stopping", name);
                break;
            }
        }
    }
}
