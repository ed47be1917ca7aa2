//! Relay engine for established SOCKS5 sessions
//!
//! Pumps bytes between the client and the destination in both directions
//! until one direction ends. The pair is torn down as a whole: when either
//! pump stops, both streams are shut down and dropped, never half-closed.

use super::consts::RELAY_BUFFER_SIZE;
use crate::error::{Direction, StreamError};
use crate::helper::{shutdown_signal, TEARDOWN_TIMEOUT};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

/// Relay tuning
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Size of one read
    pub buffer_size: usize,
    /// End the relay when no byte moved in either direction for this long
    pub idle_timeout: Option<Duration>,
}

impl Default for RelayOptions {
    fn default() -> Self {
        RelayOptions {
            buffer_size: RELAY_BUFFER_SIZE,
            idle_timeout: None,
        }
    }
}

/// Why a relay ended
#[derive(Debug)]
pub enum CloseReason {
    /// Client sent EOF
    ClientClosed,
    /// Destination sent EOF
    TargetClosed,
    /// Idle timeout elapsed
    Idle,
    /// Server shutdown
    Shutdown,
    /// A read or write failed
    Failed(StreamError),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::ClientClosed => write!(f, "client closed"),
            CloseReason::TargetClosed => write!(f, "target closed"),
            CloseReason::Idle => write!(f, "idle timeout"),
            CloseReason::Shutdown => write!(f, "shutdown"),
            CloseReason::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// Result of one relay
#[derive(Debug)]
pub struct RelayOutcome {
    /// Bytes forwarded client -> destination
    pub upstream: u64,
    /// Bytes forwarded destination -> client
    pub downstream: u64,
    /// What ended the relay
    pub reason: CloseReason,
}

/// Time of the last forwarded byte, shared by both pumps
struct Activity {
    start: Instant,
    last_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Activity {
            start: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let elapsed = self.start.elapsed().as_millis() as u64;
        self.last_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    fn last(&self) -> Instant {
        self.start + Duration::from_millis(self.last_ms.load(Ordering::Relaxed))
    }
}

/// Client and destination streams bound together for one session
///
/// The pair is consumed by [`RelayPair::run`], so neither stream can
/// outlive the relay.
#[derive(Debug)]
pub struct RelayPair<A, B> {
    client: A,
    target: B,
}

impl<A, B> RelayPair<A, B>
where
    A: AsyncRead + AsyncWrite,
    B: AsyncRead + AsyncWrite,
{
    /// Bind a client stream to its destination stream
    pub fn new(client: A, target: B) -> Self {
        RelayPair { client, target }
    }

    /// Relay until either side ends, then tear both down
    pub async fn run(
        self,
        options: &RelayOptions,
        shutdown_rx: &mut broadcast::Receiver<bool>,
    ) -> RelayOutcome {
        relay(self.client, self.target, options, shutdown_rx).await
    }
}

/// Relay bytes between `client` and `target` until one side ends
///
/// Both pumps run concurrently. The first one to finish, an idle timeout or
/// a shutdown signal ends the relay; both streams are then shut down within
/// [`TEARDOWN_TIMEOUT`] and dropped. Errors never escape: they are reported
/// in the outcome.
pub async fn relay<A, B>(
    client: A,
    target: B,
    options: &RelayOptions,
    shutdown_rx: &mut broadcast::Receiver<bool>,
) -> RelayOutcome
where
    A: AsyncRead + AsyncWrite,
    B: AsyncRead + AsyncWrite,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut target_read, mut target_write) = tokio::io::split(target);

    let upstream = AtomicU64::new(0);
    let downstream = AtomicU64::new(0);
    let activity = Activity::new();

    let reason = tokio::select! {
        result = pump(&mut client_read, &mut target_write, options.buffer_size, &upstream, &activity) => {
            match result {
                Ok(()) => CloseReason::ClientClosed,
                Err(source) => CloseReason::Failed(StreamError::Io {
                    direction: Direction::Upstream,
                    source,
                }),
            }
        }
        result = pump(&mut target_read, &mut client_write, options.buffer_size, &downstream, &activity) => {
            match result {
                Ok(()) => CloseReason::TargetClosed,
                Err(source) => CloseReason::Failed(StreamError::Io {
                    direction: Direction::Downstream,
                    source,
                }),
            }
        }
        _ = idle_expired(options.idle_timeout, &activity) => CloseReason::Idle,
        _ = shutdown_signal(shutdown_rx) => CloseReason::Shutdown,
    };

    // Full-duplex teardown
    let close = async {
        let (client_res, target_res) = tokio::join!(client_write.shutdown(), target_write.shutdown());
        if let Err(e) = client_res {
            debug!("Client shutdown error: {}", e);
        }
        if let Err(e) = target_res {
            debug!("Target shutdown error: {}", e);
        }
    };
    if tokio::time::timeout(TEARDOWN_TIMEOUT, close).await.is_err() {
        debug!("Teardown timed out, dropping streams");
    }

    RelayOutcome {
        upstream: upstream.load(Ordering::Relaxed),
        downstream: downstream.load(Ordering::Relaxed),
        reason,
    }
}

/// Copy one direction until EOF or error
async fn pump<R, W>(
    reader: &mut R,
    writer: &mut W,
    buffer_size: usize,
    transferred: &AtomicU64,
    activity: &Activity,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;

        transferred.fetch_add(n as u64, Ordering::Relaxed);
        activity.touch();
    }
}

/// Resolve once neither pump has moved a byte for `idle_timeout`
async fn idle_expired(idle_timeout: Option<Duration>, activity: &Activity) {
    let Some(limit) = idle_timeout else {
        return std::future::pending().await;
    };

    loop {
        let deadline = activity.last() + limit;
        if deadline <= Instant::now() {
            return;
        }
        tokio::time::sleep_until(deadline).await;
    }
}
