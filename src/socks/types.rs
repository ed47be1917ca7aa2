//! SOCKS5 type definitions
//!
//! Defines the destination value objects and the session state machine
//! states used in SOCKS5 protocol handling.

use super::consts::*;
use std::fmt;

/// Address family of a SOCKS5 destination, as tagged by ATYP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// 4-byte IPv4 address
    Ipv4,
    /// Length-prefixed domain name
    Domain,
    /// 16-byte IPv6 address
    Ipv6,
}

impl AddressFamily {
    /// Parse an ATYP byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_ADDR_TYPE_IPV4 => Some(AddressFamily::Ipv4),
            SOCKS5_ADDR_TYPE_DOMAIN => Some(AddressFamily::Domain),
            SOCKS5_ADDR_TYPE_IPV6 => Some(AddressFamily::Ipv6),
            _ => None,
        }
    }

    /// Convert to ATYP byte
    pub fn to_byte(self) -> u8 {
        match self {
            AddressFamily::Ipv4 => SOCKS5_ADDR_TYPE_IPV4,
            AddressFamily::Domain => SOCKS5_ADDR_TYPE_DOMAIN,
            AddressFamily::Ipv6 => SOCKS5_ADDR_TYPE_IPV6,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "IPv4"),
            AddressFamily::Domain => write!(f, "domain"),
            AddressFamily::Ipv6 => write!(f, "IPv6"),
        }
    }
}

/// A parsed destination host, before the port is known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Family tag from the request
    pub family: AddressFamily,
    /// Dotted decimal, hostname or colon-hex text
    pub host: String,
}

impl Address {
    /// Create a new address
    pub fn new(family: AddressFamily, host: impl Into<String>) -> Self {
        Address {
            family,
            host: host.into(),
        }
    }
}

/// Destination requested by a SOCKS5 client
///
/// Immutable once built; the host is kept as text and resolved only when
/// the outbound connection is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    address: Address,
    port: u16,
}

impl Destination {
    /// Attach a port to a parsed address
    pub fn new(address: Address, port: u16) -> Self {
        Destination { address, port }
    }

    /// Address family of the host
    pub fn family(&self) -> AddressFamily {
        self.address.family
    }

    /// Textual host
    pub fn host(&self) -> &str {
        &self.address.host
    }

    /// Destination port
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address.family {
            AddressFamily::Ipv6 => write!(f, "[{}]:{}", self.address.host, self.port),
            _ => write!(f, "{}:{}", self.address.host, self.port),
        }
    }
}

/// States of one SOCKS5 session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for version + method list
    AwaitingGreeting,
    /// Waiting for the CONNECT request
    AwaitingRequest,
    /// Opening the outbound connection
    Connecting,
    /// Pumping bytes between client and destination
    Relaying,
    /// Relay finished, streams closed
    Closed,
    /// Terminated by an error
    Failed,
}

impl SessionState {
    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::AwaitingGreeting => "awaiting-greeting",
            SessionState::AwaitingRequest => "awaiting-request",
            SessionState::Connecting => "connecting",
            SessionState::Relaying => "relaying",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_family_from_byte() {
        assert_eq!(AddressFamily::from_byte(0x01), Some(AddressFamily::Ipv4));
        assert_eq!(AddressFamily::from_byte(0x03), Some(AddressFamily::Domain));
        assert_eq!(AddressFamily::from_byte(0x04), Some(AddressFamily::Ipv6));
        assert_eq!(AddressFamily::from_byte(0x02), None);
        assert_eq!(AddressFamily::from_byte(0xFF), None);
    }

    #[test]
    fn test_address_family_to_byte() {
        for family in [AddressFamily::Ipv4, AddressFamily::Domain, AddressFamily::Ipv6] {
            assert_eq!(AddressFamily::from_byte(family.to_byte()), Some(family));
        }
    }

    #[test]
    fn test_destination_accessors() {
        let dest = Destination::new(Address::new(AddressFamily::Domain, "example.com"), 443);
        assert_eq!(dest.family(), AddressFamily::Domain);
        assert_eq!(dest.host(), "example.com");
        assert_eq!(dest.port(), 443);
    }

    #[test]
    fn test_destination_display() {
        let dest = Destination::new(Address::new(AddressFamily::Ipv4, "1.2.3.4"), 80);
        assert_eq!(dest.to_string(), "1.2.3.4:80");

        let dest = Destination::new(Address::new(AddressFamily::Ipv6, "::1"), 8080);
        assert_eq!(dest.to_string(), "[::1]:8080");
    }

    #[test]
    fn test_session_state_terminal() {
        assert!(SessionState::Closed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::AwaitingGreeting.is_terminal());
        assert!(!SessionState::Relaying.is_terminal());
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::AwaitingGreeting.to_string(), "awaiting-greeting");
        assert_eq!(SessionState::Failed.to_string(), "failed");
    }
}
