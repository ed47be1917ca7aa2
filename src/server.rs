//! Top-level server
//!
//! Binds the SOCKS5 listener and, when enabled, the tunnel listener, runs
//! them until shutdown and then gives live sessions a grace period.

use crate::config::Config;
use crate::helper::{local_ip, shutdown_signal};
use crate::registry::SessionRegistry;
use crate::socks::SocksServer;
use crate::transport::TcpConnector;
use crate::tunnel::{PacketInspector, PacketProcessor, TunnelServer};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Bound listeners sharing one session registry
#[derive(Debug)]
pub struct Server {
    config: Config,
    socks: SocksServer<TcpConnector>,
    tunnel: Option<TunnelServer>,
    registry: Arc<SessionRegistry>,
}

impl Server {
    /// Bind every configured listener with the default packet inspector
    pub async fn bind(config: Config) -> Result<Self> {
        Self::bind_with_processor(config, Arc::new(PacketInspector::new())).await
    }

    /// Bind every configured listener, sending tunnel packets to `processor`
    pub async fn bind_with_processor(
        config: Config,
        processor: Arc<dyn PacketProcessor>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(SessionRegistry::new());
        let connector = TcpConnector::new(&config.tcp);

        let socks = SocksServer::bind(&config.socks, &config.tcp, connector, registry.clone())
            .await
            .with_context(|| "Failed to start SOCKS5 listener")?;

        let tunnel = if config.tunnel.enabled {
            let tunnel =
                TunnelServer::bind(&config.tunnel, &config.tcp, processor, registry.clone())
                    .await
                    .with_context(|| "Failed to start tunnel listener")?;
            Some(tunnel)
        } else {
            None
        };

        Ok(Server {
            config,
            socks,
            tunnel,
            registry,
        })
    }

    /// Bound SOCKS5 address
    pub fn socks_addr(&self) -> Result<SocketAddr> {
        Ok(self.socks.local_addr()?)
    }

    /// Bound tunnel address, if the tunnel is enabled
    pub fn tunnel_addr(&self) -> Result<Option<SocketAddr>> {
        match &self.tunnel {
            Some(tunnel) => Ok(Some(tunnel.local_addr()?)),
            None => Ok(None),
        }
    }

    /// Shared session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Serve until a shutdown signal, then wait for sessions to finish
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        if let Some(addr) = self.tunnel_addr()? {
            info!("Tunnel server reachable at {}:{}", local_ip(), addr.port());
        }

        // Listeners subscribe to a channel owned here, so a signal already
        // queued on `shutdown_rx` cannot be missed by them
        let (stop_tx, _) = broadcast::channel(1);
        let socks_task = tokio::spawn(self.socks.run(stop_tx.subscribe()));
        let tunnel_task = self
            .tunnel
            .map(|tunnel| tokio::spawn(tunnel.run(stop_tx.subscribe())));

        shutdown_signal(&mut shutdown_rx).await;
        info!("Shutting down");
        let _ = stop_tx.send(true);

        socks_task.await.with_context(|| "SOCKS5 listener task failed")?;
        if let Some(task) = tunnel_task {
            task.await.with_context(|| "Tunnel listener task failed")?;
        }

        let live = self.registry.snapshot();
        if !live.is_empty() {
            info!("Waiting for {} sessions to close", live.len());
            for entry in &live {
                debug!(
                    "Session {} ({}) from {} open for {:?}",
                    entry.id,
                    entry.kind,
                    entry.peer,
                    entry.age()
                );
            }
        }

        if !self.registry.wait_idle(self.config.shutdown_grace()).await {
            warn!(
                "{} sessions still open after {:?}",
                self.registry.len(),
                self.config.shutdown_grace()
            );
        }

        info!("Server stopped");
        Ok(())
    }
}

/// Bind and run the server until `shutdown_rx` fires
pub async fn run_server(config: Config, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    Server::bind(config).await?.run(shutdown_rx).await
}
