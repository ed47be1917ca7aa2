//! Plain TCP connector
//!
//! Opens outbound TCP streams for SOCKS5 CONNECT requests.

use super::{Connector, SocketOpts};
use crate::config::TcpConfig;
use async_trait::async_trait;
use std::io;
use tokio::net::TcpStream;

/// TCP connector for outbound destinations
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    /// Socket options to apply to connections
    socket_opts: SocketOpts,
}

impl TcpConnector {
    /// Create a connector from TCP config
    pub fn new(config: &TcpConfig) -> Self {
        TcpConnector {
            socket_opts: SocketOpts::from_tcp_config(config),
        }
    }

    /// Socket options applied to each connection
    pub fn socket_opts(&self) -> &SocketOpts {
        &self.socket_opts
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, host: &str, port: u16) -> io::Result<Self::Stream> {
        // Domain names are resolved here; every returned address is tried in order
        let stream = TcpStream::connect((host, port)).await?;
        self.socket_opts.hint(&stream);

        tracing::debug!(
            "TCP connection established to {}",
            stream.peer_addr().map(|a| a.to_string()).unwrap_or_default()
        );

        Ok(stream)
    }
}
