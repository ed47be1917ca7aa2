//! Error types for Socksvpn
//!
//! Every error below is session-local: it ends the session or tunnel
//! connection it happened on and is logged there. Only [`SocksVpnError`]
//! reaches the process level, and only during startup.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Application-level error for startup and listener management
#[derive(Error, Debug)]
pub enum SocksVpnError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: SocketAddr,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },
}

/// SOCKS5 negotiation errors (bad version or command, short input)
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Version byte was not 5
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// Command other than CONNECT
    #[error("Command not supported: {0}")]
    UnsupportedCommand(u8),

    /// Peer closed or failed before the message was complete
    #[error("Truncated SOCKS5 message: {0}")]
    Truncated(#[source] io::Error),
}

/// Destination address parsing errors
#[derive(Error, Debug)]
pub enum AddressError {
    /// ATYP outside {0x01, 0x03, 0x04}
    #[error("Unsupported address type: {0}")]
    UnsupportedType(u8),

    /// Empty or non UTF-8 domain name
    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),

    /// Peer closed or failed before the address was complete
    #[error("Truncated address: {0}")]
    Truncated(#[source] io::Error),
}

/// Outbound connection errors
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Connect attempt did not finish in time
    #[error("Connection to {destination} timed out after {after:?}")]
    Timeout {
        /// Requested destination, `host:port`
        destination: String,
        /// Configured limit
        after: Duration,
    },

    /// Refused, unreachable or unresolvable
    #[error("Failed to connect to {destination}: {source}")]
    Failed {
        /// Requested destination, `host:port`
        destination: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

/// Direction of a relay pump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to destination
    Upstream,
    /// Destination to client
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => write!(f, "client->target"),
            Direction::Downstream => write!(f, "target->client"),
        }
    }
}

/// Errors while relaying an established pair (reset, broken pipe)
#[derive(Error, Debug)]
pub enum StreamError {
    /// Read or write failed on one side of the pair
    #[error("Relay {direction} failed: {source}")]
    Io {
        /// Which pump failed
        direction: Direction,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

/// Tunnel framing errors; all of them terminate the tunnel connection
#[derive(Error, Debug)]
pub enum FrameError {
    /// Declared length was 0 or larger than the maximum
    #[error("Invalid frame length: {0}")]
    InvalidLength(u32),

    /// Payload to encode is empty or too large
    #[error("Payload of {0} bytes cannot be framed")]
    PayloadSize(usize),

    /// Stream ended inside a frame
    #[error("Truncated frame, expected {expected} bytes: {source}")]
    Truncated {
        /// Bytes the reader committed to read
        expected: usize,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Other IO failure on the tunnel stream
    #[error("Tunnel IO error: {0}")]
    Io(#[from] io::Error),
}

/// Everything that can end a SOCKS5 session
#[derive(Error, Debug)]
pub enum SessionError {
    /// Handshake violation
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Bad destination address
    #[error(transparent)]
    Address(#[from] AddressError),

    /// Destination could not be reached
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Handshake did not finish in time
    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Writing a reply to the client failed
    #[error("Failed to write reply: {0}")]
    Reply(#[source] io::Error),

    /// Server shutdown arrived before the relay started
    #[error("Interrupted by shutdown")]
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::UnsupportedVersion(4);
        assert_eq!(format!("{}", err), "Unsupported SOCKS version: 4");

        let err = ProtocolError::UnsupportedCommand(0x03);
        assert_eq!(format!("{}", err), "Command not supported: 3");
    }

    #[test]
    fn test_address_error_display() {
        let err = AddressError::UnsupportedType(0x99);
        assert_eq!(format!("{}", err), "Unsupported address type: 153");

        let err = AddressError::InvalidDomain("empty".to_string());
        assert_eq!(format!("{}", err), "Invalid domain name: empty");
    }

    #[test]
    fn test_connect_error_display() {
        let err = ConnectError::Timeout {
            destination: "example.com:80".to_string(),
            after: Duration::from_secs(3),
        };
        assert_eq!(
            format!("{}", err),
            "Connection to example.com:80 timed out after 3s"
        );

        let err = ConnectError::Failed {
            destination: "127.0.0.1:9".to_string(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(format!("{}", err), "Failed to connect to 127.0.0.1:9: refused");
    }

    #[test]
    fn test_frame_error_display() {
        assert_eq!(
            format!("{}", FrameError::InvalidLength(0)),
            "Invalid frame length: 0"
        );
        assert_eq!(
            format!("{}", FrameError::PayloadSize(65536)),
            "Payload of 65536 bytes cannot be framed"
        );
    }

    #[test]
    fn test_session_error_is_transparent() {
        let err: SessionError = ProtocolError::UnsupportedVersion(4).into();
        assert_eq!(format!("{}", err), "Unsupported SOCKS version: 4");

        let err: SessionError = AddressError::UnsupportedType(7).into();
        assert!(matches!(err, SessionError::Address(_)));

        assert_eq!(SessionError::Shutdown.to_string(), "Interrupted by shutdown");
    }

    #[test]
    fn test_stream_error_display() {
        let err = StreamError::Io {
            direction: Direction::Upstream,
            source: io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"),
        };
        assert_eq!(format!("{}", err), "Relay client->target failed: broken pipe");
    }

    #[test]
    fn test_socksvpn_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::Other, "io error");
        let err: SocksVpnError = io_err.into();
        assert!(matches!(err, SocksVpnError::Io(_)));
    }
}
