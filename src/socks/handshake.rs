//! SOCKS5 handshake steps
//!
//! Method negotiation and CONNECT request parsing. The session driver in
//! `session.rs` calls these in order and owns the state transitions.

use super::address::read_address;
use super::consts::*;
use super::types::Destination;
use crate::error::{ProtocolError, SessionError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Read the client greeting and answer with "no authentication"
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
///
/// The offered methods are read and returned but not checked: the reply is
/// always `[0x05, 0x00]`.
pub async fn negotiate_method<S>(stream: &mut S) -> Result<Vec<u8>, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 2];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(ProtocolError::Truncated)?;

    let version = buf[0];
    let num_methods = buf[1];

    if version != SOCKS5_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version).into());
    }

    let mut methods = vec![0u8; num_methods as usize];
    stream
        .read_exact(&mut methods)
        .await
        .map_err(ProtocolError::Truncated)?;

    trace!("Client offered methods {:?}", methods);

    stream
        .write_all(&METHOD_SELECTION_REPLY)
        .await
        .map_err(SessionError::Reply)?;
    stream.flush().await.map_err(SessionError::Reply)?;

    Ok(methods)
}

/// Read a CONNECT request and return its destination
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// Nothing is written to the stream, whether parsing succeeds or not.
pub async fn read_request<S>(stream: &mut S) -> Result<Destination, SessionError>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    stream
        .read_exact(&mut header)
        .await
        .map_err(ProtocolError::Truncated)?;

    let version = header[0];
    let command = header[1];
    let _reserved = header[2];
    let addr_type = header[3];

    if version != SOCKS5_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version).into());
    }

    if command != SOCKS5_CMD_TCP_CONNECT {
        return Err(ProtocolError::UnsupportedCommand(command).into());
    }

    let address = read_address(stream, addr_type).await?;

    let port = stream
        .read_u16()
        .await
        .map_err(ProtocolError::Truncated)?;

    let destination = Destination::new(address, port);
    debug!("Parsed CONNECT request to {}", destination);

    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AddressError;
    use crate::socks::types::AddressFamily;
    use std::io::Cursor;
    use tokio_test::io::Builder;

    fn connect_request(atyp: u8, addr: &[u8], port: u16) -> Vec<u8> {
        let mut request = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            atyp,
        ];
        request.extend_from_slice(addr);
        request.extend_from_slice(&port.to_be_bytes());
        request
    }

    #[tokio::test]
    async fn test_greeting_reply_ignores_offered_methods() {
        let offers: [&[u8]; 4] = [&[0x00], &[0x02], &[0x01, 0x02, 0x80], &[0xFF]];

        for methods in offers {
            let mut greeting = vec![SOCKS5_VERSION, methods.len() as u8];
            greeting.extend_from_slice(methods);

            let mut stream = Builder::new()
                .read(&greeting)
                .write(&[0x05, 0x00])
                .build();

            let offered = negotiate_method(&mut stream).await.unwrap();
            assert_eq!(offered, methods);
        }
    }

    #[tokio::test]
    async fn test_greeting_with_zero_methods() {
        let mut stream = Builder::new().read(&[0x05, 0x00]).write(&[0x05, 0x00]).build();

        let offered = negotiate_method(&mut stream).await.unwrap();
        assert!(offered.is_empty());
    }

    #[tokio::test]
    async fn test_greeting_bad_version_writes_nothing() {
        // The mock panics on any unexpected write
        let mut stream = Builder::new().read(&[0x04, 0x01]).build();

        let result = negotiate_method(&mut stream).await;
        assert!(matches!(
            result,
            Err(SessionError::Protocol(ProtocolError::UnsupportedVersion(4)))
        ));
    }

    #[tokio::test]
    async fn test_greeting_truncated() {
        let mut stream = Builder::new().read(&[0x05, 0x03, 0x00]).build();

        let result = negotiate_method(&mut stream).await;
        assert!(matches!(
            result,
            Err(SessionError::Protocol(ProtocolError::Truncated(_)))
        ));
    }

    #[tokio::test]
    async fn test_read_request_ipv4() {
        let request = connect_request(SOCKS5_ADDR_TYPE_IPV4, &[1, 2, 3, 4], 80);
        let mut cursor = Cursor::new(request);

        let dest = read_request(&mut cursor).await.unwrap();

        assert_eq!(dest.family(), AddressFamily::Ipv4);
        assert_eq!(dest.host(), "1.2.3.4");
        assert_eq!(dest.port(), 80);
    }

    #[tokio::test]
    async fn test_read_request_domain() {
        let mut addr = vec![11u8];
        addr.extend_from_slice(b"example.com");
        let request = connect_request(SOCKS5_ADDR_TYPE_DOMAIN, &addr, 443);
        let len = request.len() as u64;
        let mut cursor = Cursor::new(request);

        let dest = read_request(&mut cursor).await.unwrap();

        assert_eq!(dest.host(), "example.com");
        assert_eq!(dest.port(), 443);
        assert_eq!(cursor.position(), len);
    }

    #[tokio::test]
    async fn test_read_request_ipv6() {
        let mut ip = [0u8; 16];
        ip[15] = 1;
        let request = connect_request(SOCKS5_ADDR_TYPE_IPV6, &ip, 8080);
        let mut cursor = Cursor::new(request);

        let dest = read_request(&mut cursor).await.unwrap();

        assert_eq!(dest.family(), AddressFamily::Ipv6);
        assert_eq!(dest.host(), "::1");
        assert_eq!(dest.port(), 8080);
    }

    #[tokio::test]
    async fn test_read_request_invalid_version() {
        let mut request = connect_request(SOCKS5_ADDR_TYPE_IPV4, &[127, 0, 0, 1], 80);
        request[0] = 4;
        let mut cursor = Cursor::new(request);

        let result = read_request(&mut cursor).await;
        assert!(matches!(
            result,
            Err(SessionError::Protocol(ProtocolError::UnsupportedVersion(4)))
        ));
    }

    #[tokio::test]
    async fn test_read_request_rejects_non_connect() {
        for cmd in [0x02u8, 0x03, 0x99] {
            let mut request = connect_request(SOCKS5_ADDR_TYPE_IPV4, &[127, 0, 0, 1], 80);
            request[1] = cmd;
            let mut cursor = Cursor::new(request);

            let result = read_request(&mut cursor).await;
            assert!(matches!(
                result,
                Err(SessionError::Protocol(ProtocolError::UnsupportedCommand(c))) if c == cmd
            ));
        }
    }

    #[tokio::test]
    async fn test_read_request_unsupported_address_type_writes_nothing() {
        // Only the header is supplied; the mock also fails if bytes are left unread
        let header = [SOCKS5_VERSION, SOCKS5_CMD_TCP_CONNECT, SOCKS5_RESERVED, 0x02];
        let mut stream = Builder::new().read(&header).build();

        let result = read_request(&mut stream).await;
        assert!(matches!(
            result,
            Err(SessionError::Address(AddressError::UnsupportedType(0x02)))
        ));
    }

    #[tokio::test]
    async fn test_read_request_missing_port() {
        let request = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_IPV4,
            10,
            0,
            0,
            1,
            0,
        ];
        let mut cursor = Cursor::new(request);

        let result = read_request(&mut cursor).await;
        assert!(matches!(
            result,
            Err(SessionError::Protocol(ProtocolError::Truncated(_)))
        ));
    }
}
