//! Tunnel listener
//!
//! Accepts framed tunnel clients and feeds every frame to a
//! [`PacketProcessor`]. Nothing is written back to the client.

use super::codec::read_frame;
use super::packet::{PacketProcessor, TunnelPacket};
use crate::config::{TcpConfig, TunnelConfig};
use crate::error::{FrameError, SocksVpnError};
use crate::helper::shutdown_signal;
use crate::listener::{accept_loop, bind};
use crate::registry::{SessionKind, SessionRegistry};
use crate::transport::SocketOpts;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, info_span, warn, Instrument};

/// Read frames from one tunnel client until EOF, error or shutdown
///
/// Returns the number of frames handed to `processor`.
pub async fn serve_tunnel<S>(
    stream: &mut S,
    processor: &dyn PacketProcessor,
    shutdown_rx: &mut broadcast::Receiver<bool>,
) -> Result<u64, FrameError>
where
    S: AsyncRead + Unpin,
{
    let mut frames = 0u64;
    loop {
        tokio::select! {
            frame = read_frame(stream) => match frame? {
                Some(payload) => {
                    frames += 1;
                    processor.process(TunnelPacket::new(payload)).await;
                }
                None => return Ok(frames),
            },
            _ = shutdown_signal(shutdown_rx) => {
                debug!("Tunnel client interrupted by shutdown");
                return Ok(frames);
            }
        }
    }
}

/// Framed tunnel server bound to a local address
#[derive(Debug)]
pub struct TunnelServer {
    listener: TcpListener,
    processor: Arc<dyn PacketProcessor>,
    socket_opts: SocketOpts,
    registry: Arc<SessionRegistry>,
}

impl TunnelServer {
    /// Bind the listener configured in `config`
    pub async fn bind(
        config: &TunnelConfig,
        tcp: &TcpConfig,
        processor: Arc<dyn PacketProcessor>,
        registry: Arc<SessionRegistry>,
    ) -> Result<Self, SocksVpnError> {
        let listener = bind(config.listen).await?;
        Ok(TunnelServer {
            listener,
            processor,
            socket_opts: SocketOpts::from_tcp_config(tcp),
            registry,
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> Result<SocketAddr, SocksVpnError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept tunnel clients until shutdown
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("Tunnel server listening on {}", addr);
        }

        accept_loop(
            "Tunnel",
            &self.listener,
            &self.socket_opts,
            &mut shutdown_rx,
            |stream, peer, session_rx| self.spawn_client(stream, peer, session_rx),
        )
        .await;
    }

    fn spawn_client(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
        mut shutdown_rx: broadcast::Receiver<bool>,
    ) {
        let guard = self.registry.register(SessionKind::Tunnel, peer);
        let span = info_span!("tunnel", id = guard.id(), %peer);
        let processor = self.processor.clone();

        tokio::spawn(
            async move {
                info!("Tunnel client connected");
                match serve_tunnel(&mut stream, processor.as_ref(), &mut shutdown_rx).await {
                    Ok(frames) => info!("Tunnel client disconnected after {} frames", frames),
                    Err(e) => warn!("Tunnel client dropped: {}", e),
                }
                drop(guard);
            }
            .instrument(span),
        );
    }
}
