//! Server configuration types
//!
//! Defines the root configuration and the SOCKS5 and tunnel listener
//! sections.

use super::TcpConfig;
use crate::error::SocksVpnError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Default SOCKS5 listen address
fn default_socks_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 1080))
}

/// Default tunnel listen address
fn default_tunnel_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9876))
}

/// Default outbound connect timeout in seconds
fn default_connect_timeout() -> u64 {
    10
}

/// Default handshake timeout in seconds
fn default_handshake_timeout() -> u64 {
    10
}

/// Default relay idle timeout in seconds
fn default_idle_timeout() -> u64 {
    300
}

/// Default shutdown grace period in seconds
fn default_shutdown_grace() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// SOCKS5 listener configuration
    #[serde(default)]
    pub socks: SocksConfig,

    /// Tunnel listener configuration
    #[serde(default)]
    pub tunnel: TunnelConfig,

    /// Socket options for accepted and outbound TCP streams
    #[serde(default)]
    pub tcp: TcpConfig,

    /// Seconds to wait for live sessions to finish after a shutdown signal
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            socks: SocksConfig::default(),
            tunnel: TunnelConfig::default(),
            tcp: TcpConfig::default(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

impl Config {
    /// Shutdown grace period as a [`Duration`]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), SocksVpnError> {
        self.socks.validate()?;
        // Port 0 asks the OS for a fresh port, so equal addresses never clash
        if self.tunnel.enabled
            && self.tunnel.listen.port() != 0
            && self.tunnel.listen == self.socks.listen
        {
            return Err(SocksVpnError::Config(format!(
                "SOCKS5 and tunnel listeners both use {}",
                self.socks.listen
            )));
        }
        Ok(())
    }
}

/// SOCKS5 server configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SocksConfig {
    /// Address the SOCKS5 listener binds to
    #[serde(default = "default_socks_listen")]
    pub listen: SocketAddr,

    /// Outbound connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Greeting + request timeout in seconds
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout: u64,

    /// Relay idle timeout in seconds (0 disables)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
}

impl Default for SocksConfig {
    fn default() -> Self {
        Self {
            listen: default_socks_listen(),
            connect_timeout: default_connect_timeout(),
            handshake_timeout: default_handshake_timeout(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

impl SocksConfig {
    /// Outbound connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Handshake timeout
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout)
    }

    /// Relay idle timeout, `None` when disabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        match self.idle_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), SocksVpnError> {
        if self.connect_timeout == 0 {
            return Err(SocksVpnError::Config(
                "connect_timeout must be at least 1 second".to_string(),
            ));
        }
        if self.handshake_timeout == 0 {
            return Err(SocksVpnError::Config(
                "handshake_timeout must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tunnel listener configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TunnelConfig {
    /// Run the tunnel listener at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address the tunnel listener binds to
    #[serde(default = "default_tunnel_listen")]
    pub listen: SocketAddr,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        TunnelConfig {
            enabled: true,
            listen: default_tunnel_listen(),
        }
    }
}
