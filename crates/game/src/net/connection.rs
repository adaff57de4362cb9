use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use super::protocol::{Envelope, MessageKind, Role};
use super::stats::NetworkStats;
use super::transport::{Connector, Endpoint, Handshake, Link, LinkEvent, TransportError};

const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    PermanentlyFailed,
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub base_url: String,
    pub max_reconnect_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub handshake_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_url: format!("ws://127.0.0.1:{}", super::protocol::DEFAULT_PORT),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            handshake_timeout_secs: DEFAULT_HANDSHAKE_TIMEOUT_SECS,
        }
    }
}

impl ConnectionConfig {
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let millis = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub code: String,
    pub role: Role,
    pub state: ConnectionState,
    pub reconnect_attempt: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Inbound(Envelope),
    Lost,
    Reconnected,
    Abandoned,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("invalid session code {0:?}")]
    InvalidSessionCode(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub fn is_valid_session_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= 64
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

type PendingHandshake = Pin<Box<dyn Future<Output = Result<Handshake, TransportError>> + Send>>;

pub struct ConnectionManager<C> {
    connector: C,
    config: ConnectionConfig,
    session: Option<Session>,
    link: Option<Link>,
    retry_at: Option<Instant>,
    handshake: Option<PendingHandshake>,
    final_state: ConnectionState,
    stats: NetworkStats,
}

impl<C: fmt::Debug> fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connector", &self.connector)
            .field("session", &self.session)
            .field("retry_at", &self.retry_at)
            .field("handshake_pending", &self.handshake.is_some())
            .field("final_state", &self.final_state)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, config: ConnectionConfig) -> Self {
        Self {
            connector,
            config,
            session: None,
            link: None,
            retry_at: None,
            handshake: None,
            final_state: ConnectionState::Disconnected,
            stats: NetworkStats::default(),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn role(&self) -> Option<Role> {
        self.session.as_ref().map(|s| s.role)
    }

    pub fn state(&self) -> ConnectionState {
        self.session
            .as_ref()
            .map_or(self.final_state, |session| session.state)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn stats(&self) -> NetworkStats {
        self.stats
    }

    pub fn record_rtt(&mut self, rtt_ms: u64) {
        self.stats.last_rtt_ms = Some(rtt_ms);
    }

    /// Performs one handshake. `Ok(false)` when the relay refuses or closes
    /// during the handshake; `Err` when the transport itself fails. Neither
    /// retries.
    pub async fn connect(&mut self, code: &str, role: Role) -> Result<bool, ConnectionError> {
        if !is_valid_session_code(code) {
            return Err(ConnectionError::InvalidSessionCode(code.to_string()));
        }

        if self.session.is_some() {
            self.disconnect();
        }

        log::info!("Connecting to session {} as {}", code, role);
        self.session = Some(Session {
            code: code.to_string(),
            role,
            state: ConnectionState::Connecting,
            reconnect_attempt: 0,
        });

        let outcome = match self.start_handshake() {
            Some(handshake) => handshake.await,
            None => return Ok(false),
        };

        match self.accept(outcome) {
            Ok(true) => {
                if let Some(session) = self.session.as_mut() {
                    session.state = ConnectionState::Connected;
                }
                log::info!("Connected to session {} as {}", code, role);
                Ok(true)
            }
            Ok(false) => {
                self.drop_session(ConnectionState::Disconnected);
                Ok(false)
            }
            Err(e) => {
                self.drop_session(ConnectionState::Disconnected);
                Err(e.into())
            }
        }
    }

    pub fn send(&mut self, kind: MessageKind, payload: Value) -> bool {
        let (Some(session), Some(link)) = (self.session.as_ref(), self.link.as_ref()) else {
            self.stats.envelopes_discarded += 1;
            log::trace!("Not connected, discarding {}", kind);
            return false;
        };

        if session.state != ConnectionState::Connected {
            self.stats.envelopes_discarded += 1;
            log::trace!("Connection {:?}, discarding {}", session.state, kind);
            return false;
        }

        let envelope = Envelope::new(kind, payload, Some(session.role));
        let frame = match envelope.encode() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Failed to encode {}: {}", kind, e);
                return false;
            }
        };

        let len = frame.len() as u64;
        if link.send(frame) {
            self.stats.envelopes_sent += 1;
            self.stats.bytes_sent += len;
            true
        } else {
            self.stats.envelopes_discarded += 1;
            false
        }
    }

    pub fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            log::info!("Leaving session {}", session.code);
        }
        self.link = None;
        self.retry_at = None;
        self.handshake = None;
        self.final_state = ConnectionState::Disconnected;
    }

    /// Next inbound envelope or lifecycle change. Drives reconnection after
    /// an unexpected closure. Returns `None` once there is no session.
    ///
    /// Cancel-safe: a dropped call resumes the same attempt, either waiting
    /// for the same deadline or polling the handshake already in flight.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        loop {
            match self.session.as_ref()?.state {
                ConnectionState::Connected => {
                    let Some(link) = self.link.as_mut() else {
                        self.mark_lost();
                        continue;
                    };

                    match link.recv().await {
                        LinkEvent::Frame(frame) => {
                            self.stats.bytes_received += frame.len() as u64;
                            match Envelope::decode(&frame) {
                                Ok(envelope) => {
                                    self.stats.envelopes_received += 1;
                                    return Some(ConnectionEvent::Inbound(envelope));
                                }
                                Err(e) => {
                                    self.stats.envelopes_malformed += 1;
                                    log::warn!("Dropping malformed envelope: {}", e);
                                }
                            }
                        }
                        LinkEvent::Closed => {
                            self.mark_lost();
                            return Some(ConnectionEvent::Lost);
                        }
                    }
                }
                ConnectionState::Reconnecting => {
                    if self.handshake.is_none() {
                        let retry_at = match self.retry_at {
                            Some(at) => at,
                            None => match self.schedule_retry() {
                                Some(at) => at,
                                None => return Some(self.abandon()),
                            },
                        };

                        tokio::time::sleep_until(retry_at).await;
                        self.handshake = self.start_handshake();
                    }

                    let outcome = match self.handshake.as_mut() {
                        Some(handshake) => handshake.await,
                        None => continue,
                    };
                    self.handshake = None;
                    self.retry_at = None;

                    match self.accept(outcome) {
                        Ok(true) => {
                            let session = self.session.as_mut()?;
                            session.state = ConnectionState::Connected;
                            session.reconnect_attempt = 0;
                            self.stats.reconnects += 1;
                            log::info!("Reconnected to session {}", session.code);
                            return Some(ConnectionEvent::Reconnected);
                        }
                        Ok(false) => {}
                        Err(e) => log::warn!("Reconnect attempt failed: {}", e),
                    }
                }
                ConnectionState::Disconnected
                | ConnectionState::Connecting
                | ConnectionState::PermanentlyFailed => return None,
            }
        }
    }

    fn start_handshake(&self) -> Option<PendingHandshake> {
        let session = self.session.as_ref()?;
        let endpoint = Endpoint::new(&self.config.base_url, &session.code, session.role);
        let connector = self.connector.clone();
        Some(Box::pin(async move { connector.connect(&endpoint).await }))
    }

    fn accept(&mut self, outcome: Result<Handshake, TransportError>) -> Result<bool, TransportError> {
        match outcome? {
            Handshake::Accepted(link) => {
                self.link = Some(link);
                Ok(true)
            }
            Handshake::Rejected(reason) => {
                if let Some(session) = self.session.as_ref() {
                    log::warn!("Handshake for session {} rejected: {}", session.code, reason);
                }
                Ok(false)
            }
        }
    }

    fn mark_lost(&mut self) {
        self.link = None;
        self.handshake = None;
        if let Some(session) = self.session.as_mut() {
            log::warn!("Connection to session {} lost", session.code);
            session.state = ConnectionState::Reconnecting;
        }
    }

    fn schedule_retry(&mut self) -> Option<Instant> {
        let session = self.session.as_mut()?;
        if session.reconnect_attempt >= self.config.max_reconnect_attempts {
            return None;
        }

        session.reconnect_attempt += 1;
        let delay = self.config.reconnect_delay(session.reconnect_attempt);
        log::warn!(
            "Reconnecting to session {} in {} ms (attempt {}/{})",
            session.code,
            delay.as_millis(),
            session.reconnect_attempt,
            self.config.max_reconnect_attempts
        );

        let at = Instant::now() + delay;
        self.retry_at = Some(at);
        Some(at)
    }

    fn abandon(&mut self) -> ConnectionEvent {
        if let Some(session) = self.session.as_ref() {
            log::error!(
                "Giving up on session {} after {} reconnect attempts",
                session.code,
                session.reconnect_attempt
            );
        }
        self.drop_session(ConnectionState::PermanentlyFailed);
        ConnectionEvent::Abandoned
    }

    fn drop_session(&mut self, final_state: ConnectionState) {
        self.session = None;
        self.link = None;
        self.retry_at = None;
        self.handshake = None;
        self.final_state = final_state;
    }
}
