use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::protocol::Envelope;
use super::stats::FrameLoss;
use super::transport::{Connector, Endpoint, Handshake, Link, LinkEvent, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedHandshake {
    Accept,
    Reject(String),
    Fail,
}

#[derive(Debug)]
pub struct RemoteEnd {
    pub endpoint: Endpoint,
    from_local: mpsc::UnboundedReceiver<String>,
    to_local: mpsc::UnboundedSender<LinkEvent>,
    loss: FrameLoss,
    received: u64,
}

impl RemoteEnd {
    pub fn push(&self, envelope: &Envelope) -> bool {
        match envelope.encode() {
            Ok(frame) => self.push_raw(frame),
            Err(e) => {
                log::warn!("Simulated remote could not encode {}: {}", envelope.kind, e);
                false
            }
        }
    }

    pub fn push_raw(&self, frame: impl Into<String>) -> bool {
        self.to_local.send(LinkEvent::Frame(frame.into())).is_ok()
    }

    pub fn close(self) {
        let _ = self.to_local.send(LinkEvent::Closed);
    }

    pub fn try_next(&mut self) -> Option<Envelope> {
        while let Ok(frame) = self.from_local.try_recv() {
            if let Some(envelope) = self.accept_frame(&frame) {
                return Some(envelope);
            }
        }
        None
    }

    pub async fn next(&mut self) -> Option<Envelope> {
        while let Some(frame) = self.from_local.recv().await {
            if let Some(envelope) = self.accept_frame(&frame) {
                return Some(envelope);
            }
        }
        None
    }

    pub fn drain(&mut self) -> Vec<Envelope> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    fn accept_frame(&mut self, frame: &str) -> Option<Envelope> {
        self.received += 1;
        if self.loss.drops(self.received) {
            log::trace!("Simulated loss dropped a frame");
            return None;
        }
        Envelope::decode(frame).ok()
    }
}

#[derive(Debug, Default)]
struct SimulatorState {
    script: VecDeque<ScriptedHandshake>,
    attempts: Vec<(Instant, Endpoint)>,
    remotes: VecDeque<RemoteEnd>,
    loss: FrameLoss,
    handshake_delay: Duration,
}

/// In-memory [`Connector`] with scripted handshake outcomes. Unscripted
/// attempts are accepted.
#[derive(Debug, Clone, Default)]
pub struct SimulatedConnector {
    state: Arc<Mutex<SimulatorState>>,
}

impl SimulatedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, outcomes: impl IntoIterator<Item = ScriptedHandshake>) {
        self.lock().script.extend(outcomes);
    }

    pub fn set_loss(&self, loss: FrameLoss) {
        self.lock().loss = loss;
    }

    /// How long each handshake takes to resolve. The outcome is decided when
    /// the attempt starts.
    pub fn set_handshake_delay(&self, delay: Duration) {
        self.lock().handshake_delay = delay;
    }

    pub fn attempts(&self) -> usize {
        self.lock().attempts.len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.lock().attempts.iter().map(|(at, _)| *at).collect()
    }

    pub fn last_endpoint(&self) -> Option<Endpoint> {
        self.lock().attempts.last().map(|(_, endpoint)| endpoint.clone())
    }

    pub fn take_remote(&self) -> Option<RemoteEnd> {
        self.lock().remotes.pop_front()
    }

    fn lock(&self) -> MutexGuard<'_, SimulatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self, endpoint: &Endpoint) -> Result<Handshake, TransportError> {
        let mut state = self.lock();
        state.attempts.push((Instant::now(), endpoint.clone()));

        match state.script.pop_front().unwrap_or(ScriptedHandshake::Accept) {
            ScriptedHandshake::Accept => {
                let (out_tx, out_rx) = mpsc::unbounded_channel();
                let (in_tx, in_rx) = mpsc::unbounded_channel();
                let remote = RemoteEnd {
                    endpoint: endpoint.clone(),
                    from_local: out_rx,
                    to_local: in_tx,
                    loss: state.loss,
                    received: 0,
                };
                state.remotes.push_back(remote);
                Ok(Handshake::Accepted(Link::new(out_tx, in_rx)))
            }
            ScriptedHandshake::Reject(reason) => Ok(Handshake::Rejected(reason)),
            ScriptedHandshake::Fail => Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "simulated connection refused",
            ))),
        }
    }
}

impl Connector for SimulatedConnector {
    fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<Handshake, TransportError>> + Send {
        let outcome = self.open(endpoint);
        let delay = self.lock().handshake_delay;

        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            outcome
        }
    }
}
