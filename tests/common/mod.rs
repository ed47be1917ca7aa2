//! Test utilities for Socksvpn
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use socksvpn::config::Config;
use socksvpn::Server;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Start an echo server; each connection echoes until EOF
pub async fn spawn_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// Start a server that writes `payload` to every connection and closes it
pub async fn spawn_sender(payload: Vec<u8>) -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let payload = payload.clone();
            tokio::spawn(async move {
                let _ = stream.write_all(&payload).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    addr
}

/// Port on localhost with nothing listening
pub async fn closed_port() -> u16 {
    let (listener, addr) = create_test_listener().await;
    drop(listener);
    addr.port()
}

/// Test configuration builder
pub struct TestConfigBuilder {
    config: Config,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        let mut config = Config::default();
        config.socks.listen = "127.0.0.1:0".parse().unwrap();
        config.tunnel.listen = "127.0.0.1:0".parse().unwrap();
        config.shutdown_grace = 1;
        TestConfigBuilder { config }
    }
}

impl TestConfigBuilder {
    /// Create a new test config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set connect timeout in seconds
    pub fn connect_timeout(mut self, secs: u64) -> Self {
        self.config.socks.connect_timeout = secs;
        self
    }

    /// Set handshake timeout in seconds
    pub fn handshake_timeout(mut self, secs: u64) -> Self {
        self.config.socks.handshake_timeout = secs;
        self
    }

    /// Set idle timeout in seconds
    pub fn idle_timeout(mut self, secs: u64) -> Self {
        self.config.socks.idle_timeout = secs;
        self
    }

    /// Enable or disable the tunnel listener
    pub fn tunnel(mut self, enabled: bool) -> Self {
        self.config.tunnel.enabled = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        self.config
    }
}

/// A server running in the background
pub struct TestServer {
    pub socks_addr: SocketAddr,
    pub tunnel_addr: Option<SocketAddr>,
    pub registry: std::sync::Arc<socksvpn::registry::SessionRegistry>,
    pub shutdown_tx: broadcast::Sender<bool>,
    pub task: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    /// Bind and run a server with `config`
    pub async fn start(config: Config) -> Self {
        let server = Server::bind(config).await.unwrap();
        let socks_addr = server.socks_addr().unwrap();
        let tunnel_addr = server.tunnel_addr().unwrap();
        let registry = server.registry().clone();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(server.run(shutdown_rx));

        TestServer {
            socks_addr,
            tunnel_addr,
            registry,
            shutdown_tx,
            task,
        }
    }

    /// Signal shutdown and wait for the server to return
    pub async fn stop(self) {
        self.shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }

    /// Wait until exactly `count` sessions are registered
    pub async fn wait_for_sessions(&self, count: usize) {
        for _ in 0..200 {
            if self.registry.len() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} sessions, have {}", count, self.registry.len());
    }
}

/// Perform the no-auth greeting and return the method reply
pub async fn greet(stream: &mut TcpStream) -> [u8; 2] {
    stream.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await.unwrap();
    reply
}

/// Build a CONNECT request for an IPv4 destination
pub fn connect_request(addr: SocketAddr) -> Vec<u8> {
    let SocketAddr::V4(v4) = addr else {
        panic!("IPv4 address expected");
    };
    let mut request = vec![0x05, 0x01, 0x00, 0x01];
    request.extend_from_slice(&v4.ip().octets());
    request.extend_from_slice(&v4.port().to_be_bytes());
    request
}

/// Build a CONNECT request for a domain destination
pub fn connect_domain_request(host: &str, port: u16) -> Vec<u8> {
    let mut request = vec![0x05, 0x01, 0x00, 0x03, host.len() as u8];
    request.extend_from_slice(host.as_bytes());
    request.extend_from_slice(&port.to_be_bytes());
    request
}

/// Read a 10-byte CONNECT reply
pub async fn read_reply(stream: &mut TcpStream) -> [u8; 10] {
    let mut reply = [0u8; 10];
    stream.read_exact(&mut reply).await.unwrap();
    reply
}
