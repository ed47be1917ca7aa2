//! Helper utilities for Socksvpn
//!
//! This module provides common utility functions used throughout the application.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

/// Upper bound for closing both sides of a relay pair
pub const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Wait until a shutdown signal arrives
///
/// A closed channel means no signal can ever arrive, so this never returns
/// in that case. A lagged receiver still counts as signalled.
pub async fn shutdown_signal(shutdown_rx: &mut broadcast::Receiver<bool>) {
    match shutdown_rx.recv().await {
        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
        Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
    }
}

/// Whether a shutdown signal is already queued on `shutdown_rx`
///
/// Consumes the signal when there is one. Like [`shutdown_signal`], a closed
/// channel counts as never signalled.
pub fn shutdown_pending(shutdown_rx: &mut broadcast::Receiver<bool>) -> bool {
    match shutdown_rx.try_recv() {
        Ok(_) | Err(TryRecvError::Lagged(_)) => true,
        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => false,
    }
}

/// Best-effort guess of the address other hosts on the LAN reach us at
///
/// Connecting a UDP socket sends nothing; it only makes the kernel pick the
/// outbound interface. Falls back to loopback.
pub fn local_ip() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("8.8.8.8:80")?;
        Ok(socket.local_addr()?.ip())
    };

    probe().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
