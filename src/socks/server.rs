//! SOCKS5 listener
//!
//! Accepts client connections and runs one [`Session`] task per connection.

use super::session::{Session, SessionSettings};
use crate::config::{SocksConfig, TcpConfig};
use crate::error::SocksVpnError;
use crate::listener::{accept_loop, bind};
use crate::registry::{SessionKind, SessionRegistry};
use crate::transport::{Connector, SocketOpts};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{info, info_span, Instrument};

/// SOCKS5 server bound to a local address
#[derive(Debug)]
pub struct SocksServer<C: Connector> {
    listener: TcpListener,
    connector: Arc<C>,
    settings: Arc<SessionSettings>,
    socket_opts: SocketOpts,
    registry: Arc<SessionRegistry>,
}

impl<C: Connector> SocksServer<C> {
    /// Bind the listener configured in `config`
    pub async fn bind(
        config: &SocksConfig,
        tcp: &TcpConfig,
        connector: C,
        registry: Arc<SessionRegistry>,
    ) -> Result<Self, SocksVpnError> {
        let listener = bind(config.listen).await?;
        Ok(SocksServer {
            listener,
            connector: Arc::new(connector),
            settings: Arc::new(SessionSettings::from(config)),
            socket_opts: SocketOpts::from_tcp_config(tcp),
            registry,
        })
    }

    /// Address actually bound, useful when port 0 was requested
    pub fn local_addr(&self) -> Result<SocketAddr, SocksVpnError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients until shutdown
    ///
    /// Sessions spawned before the signal receive it too and wind down on
    /// their own.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("SOCKS5 proxy listening on {}", addr);
        }

        accept_loop(
            "SOCKS5",
            &self.listener,
            &self.socket_opts,
            &mut shutdown_rx,
            |stream, peer, session_rx| self.spawn_session(stream, peer, session_rx),
        )
        .await;
    }

    fn spawn_session(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        mut shutdown_rx: broadcast::Receiver<bool>,
    ) {
        let guard = self.registry.register(SessionKind::Socks, peer);
        let span = info_span!("socks", id = guard.id(), %peer);
        let connector = self.connector.clone();
        let settings = self.settings.clone();

        tokio::spawn(
            async move {
                let report = Session::new(guard.id(), stream)
                    .run(connector.as_ref(), &settings, &mut shutdown_rx)
                    .await;
                report.log();
                drop(guard);
            }
            .instrument(span),
        );
    }
}
