//! SOCKS5 protocol constants
//!
//! Defines the constants of the SOCKS5 subset this server speaks.

/// SOCKS5 protocol version
pub const SOCKS5_VERSION: u8 = 0x05;

// Authentication methods
/// No authentication required
pub const SOCKS5_AUTH_METHOD_NONE: u8 = 0x00;

// Commands
/// TCP CONNECT command
pub const SOCKS5_CMD_TCP_CONNECT: u8 = 0x01;

// Address types
/// IPv4 address
pub const SOCKS5_ADDR_TYPE_IPV4: u8 = 0x01;
/// Domain name
pub const SOCKS5_ADDR_TYPE_DOMAIN: u8 = 0x03;
/// IPv6 address
pub const SOCKS5_ADDR_TYPE_IPV6: u8 = 0x04;

// Reply codes
/// Succeeded
pub const SOCKS5_REPLY_SUCCEEDED: u8 = 0x00;
/// Sent for every failed connect attempt, whatever the cause
pub const SOCKS5_REPLY_CONNECT_FAILED: u8 = 0x05;

// Reserved byte
/// Reserved byte value (always 0x00)
pub const SOCKS5_RESERVED: u8 = 0x00;

/// Method selection reply, sent for every valid greeting
pub const METHOD_SELECTION_REPLY: [u8; 2] = [SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE];

/// Length of a CONNECT reply with an IPv4 bound address
pub const REPLY_LEN: usize = 10;

/// Chunk size of one relay read
pub const RELAY_BUFFER_SIZE: usize = 4096;
