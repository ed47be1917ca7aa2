//! SOCKS5 module for Socksvpn
//!
//! This module implements the no-auth, CONNECT-only subset of SOCKS5:
//! method negotiation, request parsing, outbound connection setup and the
//! bidirectional relay, plus the listener that runs one session per client.

mod address;
mod connect;
mod consts;
mod handshake;
mod relay;
mod server;
mod session;
mod types;

pub use address::read_address;
pub use connect::{build_reply, establish, send_reply};
pub use consts::*;
pub use handshake::{negotiate_method, read_request};
pub use relay::{relay, CloseReason, RelayOptions, RelayOutcome, RelayPair};
pub use server::SocksServer;
pub use session::{Session, SessionReport, SessionSettings};
pub use types::{Address, AddressFamily, Destination, SessionState};
