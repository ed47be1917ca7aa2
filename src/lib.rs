//! # Socksvpn - SOCKS5 Proxy and Framed Packet Tunnel
//!
//! Socksvpn runs two listeners side by side: a SOCKS5 proxy that relays TCP
//! CONNECT sessions to their destinations, and a tunnel endpoint that reads
//! length-prefixed IP packets from its clients.
//!
//! ## Features
//!
//! - **SOCKS5 CONNECT**: No-auth method negotiation, IPv4/IPv6/domain targets
//! - **Full-Duplex Relay**: Both directions pumped concurrently with one teardown
//! - **Bounded Waits**: Handshake, connect and idle timeouts
//! - **Framed Tunnel**: 4-byte big-endian length prefix, 1 to 65535 byte payloads
//! - **Graceful Shutdown**: Live sessions are tracked and drained on exit
//!
//! ## Usage
//!
//! ```rust,ignore
//! use socksvpn::config::load_config;
//! use socksvpn::server::run_server;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_server(config, shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SOCKS5 Client -> SocksServer -> Session -> Connector -> Target
//! Tunnel Client -> TunnelServer -> read_frame -> PacketProcessor
//! ```
//!
//! Every accepted connection is registered in the [`registry::SessionRegistry`]
//! for as long as its task runs.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod helper;
pub mod listener;
pub mod registry;
pub mod server;
pub mod socks;
pub mod transport;
pub mod tunnel;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{SessionError, SocksVpnError};
pub use server::{run_server, Server};

/// Version of the Socksvpn library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
