//! SOCKS5 session driver
//!
//! A [`Session`] owns one accepted client stream and walks it through the
//! state machine:
//!
//! ```text
//! AwaitingGreeting -> AwaitingRequest -> Connecting -> Relaying -> Closed
//!         \________________\_________________\____________> Failed
//! ```
//!
//! Every error ends the session; nothing is propagated past [`Session::run`].
//! A shutdown signal ends it in `Closed` from whatever state it is in.

use super::connect::establish;
use super::handshake::{negotiate_method, read_request};
use super::relay::{RelayOptions, RelayOutcome, RelayPair};
use super::types::{Destination, SessionState};
use crate::config::SocksConfig;
use crate::error::SessionError;
use crate::helper::shutdown_signal;
use crate::registry::SessionId;
use crate::transport::Connector;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tracing::{info, trace, warn};

/// Per-session limits, derived from [`SocksConfig`]
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Bound on greeting + request
    pub handshake_timeout: Duration,
    /// Bound on the outbound connect attempt
    pub connect_timeout: Duration,
    /// Relay tuning
    pub relay: RelayOptions,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings::from(&SocksConfig::default())
    }
}

impl From<&SocksConfig> for SessionSettings {
    fn from(config: &SocksConfig) -> Self {
        SessionSettings {
            handshake_timeout: config.handshake_timeout(),
            connect_timeout: config.connect_timeout(),
            relay: RelayOptions {
                idle_timeout: config.idle_timeout(),
                ..Default::default()
            },
        }
    }
}

/// Final report of a session
#[derive(Debug)]
pub struct SessionReport {
    /// Session id
    pub id: SessionId,
    /// `Closed` or `Failed`
    pub state: SessionState,
    /// Destination, if the request was parsed
    pub destination: Option<Destination>,
    /// Relay outcome or the error that ended the session
    pub result: Result<RelayOutcome, SessionError>,
}

impl SessionReport {
    /// Log the report at a level matching its outcome
    pub fn log(&self) {
        let target = self
            .destination
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());

        match &self.result {
            Ok(outcome) => info!(
                "Session {} to {} closed ({}): {} bytes up, {} bytes down",
                self.id, target, outcome.reason, outcome.upstream, outcome.downstream
            ),
            Err(SessionError::Shutdown) => {
                info!("Session {} to {} interrupted by shutdown", self.id, target)
            }
            Err(e) => warn!("Session {} to {} failed: {}", self.id, target, e),
        }
    }
}

/// One SOCKS5 client session
#[derive(Debug)]
pub struct Session<S> {
    id: SessionId,
    state: SessionState,
    client: S,
    destination: Option<Destination>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a session for a freshly accepted client stream
    pub fn new(id: SessionId, client: S) -> Self {
        Session {
            id,
            state: SessionState::AwaitingGreeting,
            client,
            destination: None,
        }
    }

    /// Session id
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Destination, once the request has been parsed
    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    fn transition(&mut self, next: SessionState) {
        trace!("Session {}: {} -> {}", self.id, self.state, next);
        self.state = next;
    }

    /// Negotiate the method and parse the CONNECT request
    ///
    /// Moves the session to `Connecting` on success and to `Failed` on any
    /// error or when `timeout` elapses first.
    pub async fn handshake(&mut self, timeout: Duration) -> Result<Destination, SessionError> {
        let steps = async {
            negotiate_method(&mut self.client).await?;
            self.transition(SessionState::AwaitingRequest);
            read_request(&mut self.client).await
        };

        let result = match tokio::time::timeout(timeout, steps).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::HandshakeTimeout(timeout)),
        };

        match result {
            Ok(destination) => {
                self.destination = Some(destination.clone());
                self.transition(SessionState::Connecting);
                Ok(destination)
            }
            Err(e) => {
                self.transition(SessionState::Failed);
                Err(e)
            }
        }
    }

    /// Drive the session from greeting to teardown
    ///
    /// A shutdown signal interrupts every step: the handshake, the connect
    /// attempt and the relay.
    pub async fn run<C>(
        mut self,
        connector: &C,
        settings: &SessionSettings,
        shutdown_rx: &mut broadcast::Receiver<bool>,
    ) -> SessionReport
    where
        C: Connector,
    {
        let target = match self.open(connector, settings, shutdown_rx).await {
            Ok(target) => target,
            Err(e) => return self.abort(e),
        };

        self.transition(SessionState::Relaying);
        if let Some(destination) = &self.destination {
            info!("SOCKS5 tunnel established to {}", destination);
        }

        let Session {
            id,
            client,
            destination,
            ..
        } = self;
        let outcome = RelayPair::new(client, target)
            .run(&settings.relay, shutdown_rx)
            .await;
        trace!("Session {}: {} -> {}", id, SessionState::Relaying, SessionState::Closed);

        SessionReport {
            id,
            state: SessionState::Closed,
            destination,
            result: Ok(outcome),
        }
    }

    /// Handshake and connect, each raced against the shutdown signal
    async fn open<C>(
        &mut self,
        connector: &C,
        settings: &SessionSettings,
        shutdown_rx: &mut broadcast::Receiver<bool>,
    ) -> Result<C::Stream, SessionError>
    where
        C: Connector,
    {
        let destination = tokio::select! {
            result = self.handshake(settings.handshake_timeout) => result?,
            _ = shutdown_signal(shutdown_rx) => return Err(SessionError::Shutdown),
        };

        let attempt = establish(
            &mut self.client,
            connector,
            &destination,
            settings.connect_timeout,
        );
        tokio::select! {
            result = attempt => result,
            _ = shutdown_signal(shutdown_rx) => Err(SessionError::Shutdown),
        }
    }

    /// End a session that never reached the relay
    fn abort(mut self, error: SessionError) -> SessionReport {
        if !self.state.is_terminal() {
            match error {
                SessionError::Shutdown => self.transition(SessionState::Closed),
                _ => self.transition(SessionState::Failed),
            }
        }

        SessionReport {
            id: self.id,
            state: self.state,
            destination: self.destination.take(),
            result: Err(error),
        }
    }
}
