//! SOCKS5 destination address parser
//!
//! Reads the ATYP-tagged DST.ADDR field of a request. No DNS resolution
//! happens here; domain names stay textual until the connect step.

use super::types::{Address, AddressFamily};
use crate::error::AddressError;
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read the address that follows an ATYP byte
///
/// ```text
/// ATYP 0x01: | 4 bytes IPv4 |
/// ATYP 0x03: | LEN | LEN bytes domain |
/// ATYP 0x04: | 16 bytes IPv6 |
/// ```
///
/// Exactly the bytes of the address are consumed; the port is left on the
/// stream for the caller.
pub async fn read_address<S>(stream: &mut S, addr_type: u8) -> Result<Address, AddressError>
where
    S: AsyncRead + Unpin,
{
    let family =
        AddressFamily::from_byte(addr_type).ok_or(AddressError::UnsupportedType(addr_type))?;

    match family {
        AddressFamily::Ipv4 => {
            let mut addr = [0u8; 4];
            stream
                .read_exact(&mut addr)
                .await
                .map_err(AddressError::Truncated)?;

            Ok(Address::new(family, Ipv4Addr::from(addr).to_string()))
        }

        AddressFamily::Domain => {
            let domain_len = stream.read_u8().await.map_err(AddressError::Truncated)? as usize;

            if domain_len == 0 {
                return Err(AddressError::InvalidDomain("empty domain name".to_string()));
            }

            let mut domain_buf = vec![0u8; domain_len];
            stream
                .read_exact(&mut domain_buf)
                .await
                .map_err(AddressError::Truncated)?;

            let domain = String::from_utf8(domain_buf).map_err(|e| {
                AddressError::InvalidDomain(String::from_utf8_lossy(e.as_bytes()).into_owned())
            })?;

            Ok(Address::new(family, domain))
        }

        AddressFamily::Ipv6 => {
            let mut addr = [0u8; 16];
            stream
                .read_exact(&mut addr)
                .await
                .map_err(AddressError::Truncated)?;

            Ok(Address::new(family, Ipv6Addr::from(addr).to_string()))
        }
    }
}
