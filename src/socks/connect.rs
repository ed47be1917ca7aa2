//! Connection establisher for SOCKS5 CONNECT
//!
//! Opens the outbound stream for a parsed destination and answers the
//! client with a success or failure reply.

use super::consts::*;
use super::types::{AddressFamily, Destination};
use crate::error::{ConnectError, SessionError};
use crate::transport::Connector;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Build a CONNECT reply
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' | 0x01 | 0.0.0.0  |    0     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// The bound address is always reported as `0.0.0.0:0`.
pub fn build_reply(reply_code: u8) -> [u8; REPLY_LEN] {
    [
        SOCKS5_VERSION,
        reply_code,
        SOCKS5_RESERVED,
        AddressFamily::Ipv4.to_byte(),
        0,
        0,
        0,
        0,
        0,
        0,
    ]
}

/// Write a CONNECT reply and flush it
pub async fn send_reply<S>(stream: &mut S, reply_code: u8) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&build_reply(reply_code)).await?;
    stream.flush().await
}

/// Open the outbound connection for `destination` and reply to the client
///
/// The attempt is bounded by `timeout`. On any failure the client receives
/// the failure reply and the error is returned; nothing is retried.
pub async fn establish<C, S>(
    client: &mut S,
    connector: &C,
    destination: &Destination,
    timeout: Duration,
) -> Result<C::Stream, SessionError>
where
    C: Connector,
    S: AsyncWrite + Unpin,
{
    debug!("Connecting to target: {}", destination);

    let attempt = connector.connect(destination.host(), destination.port());
    let result = match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(ConnectError::Failed {
            destination: destination.to_string(),
            source: e,
        }),
        Err(_) => Err(ConnectError::Timeout {
            destination: destination.to_string(),
            after: timeout,
        }),
    };

    match result {
        Ok(target) => {
            send_reply(client, SOCKS5_REPLY_SUCCEEDED)
                .await
                .map_err(SessionError::Reply)?;
            Ok(target)
        }
        Err(e) => {
            warn!("{}", e);
            if let Err(reply_err) = send_reply(client, SOCKS5_REPLY_CONNECT_FAILED).await {
                debug!("Failed to send failure reply: {}", reply_err);
            }
            Err(e.into())
        }
    }
}
