use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::net::{
    CommandResultPayload, ConnectionConfig, ConnectionError, ConnectionEvent, ConnectionManager,
    ConnectionState, Connector, Envelope, MessageKind, NetworkStats, PingPayload,
    PlayerStatePayload, Role, SystemMessagePayload, now_millis, to_payload,
};
use crate::params::{ParameterStore, ParameterUpdate};
use crate::round::{CountdownTimer, Effect, Round, RoundConfig, RoundCoordinator};
use crate::router::{Router, Topic};
use crate::simulation::{GameMode, GameStateUpdate, Simulation, SimulationCommand, SimulationEvent};

const DEFAULT_PING_INTERVAL_SECS: u64 = 15;

const SESSION_KINDS: [MessageKind; 9] = [
    MessageKind::StartGame,
    MessageKind::PlayerState,
    MessageKind::CommandResult,
    MessageKind::ItemPlaced,
    MessageKind::CountdownStarted,
    MessageKind::GameEvent,
    MessageKind::GameState,
    MessageKind::Pong,
    MessageKind::PeerJoined,
];

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connection: ConnectionConfig,
    pub round: RoundConfig,
    pub ping_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            round: RoundConfig::default(),
            ping_interval_secs: DEFAULT_PING_INTERVAL_SECS,
        }
    }
}

impl SessionConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    LocalClosed,
    ConnectionFailed,
}

pub struct GameSession<C, S> {
    connection: ConnectionManager<C>,
    router: Router,
    coordinator: RoundCoordinator,
    params: ParameterStore,
    simulation: S,
    inbox: mpsc::UnboundedReceiver<Envelope>,
    countdown: CountdownTimer,
    ping_interval: Duration,
    failure_reported: bool,
}

impl<C: Connector, S: Simulation> GameSession<C, S> {
    pub fn new(connector: C, simulation: S, role: Role, config: SessionConfig) -> Self {
        let params = ParameterStore::new();
        let coordinator = RoundCoordinator::new(role, config.round.clone(), &params);
        let ping_interval = config.ping_interval();

        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let mut router = Router::new();
        for kind in SESSION_KINDS {
            let tx = inbox_tx.clone();
            router.subscribe(Topic::Kind(kind), move |envelope: &Envelope| {
                tx.send(envelope.clone())
                    .map_err(|_| anyhow::anyhow!("session inbox closed"))
            });
        }

        Self {
            connection: ConnectionManager::new(connector, config.connection),
            router,
            coordinator,
            params,
            simulation,
            inbox,
            countdown: CountdownTimer::default(),
            ping_interval,
            failure_reported: false,
        }
    }

    pub fn role(&self) -> Role {
        self.coordinator.role()
    }

    pub fn round(&self) -> &Round {
        self.coordinator.round()
    }

    pub fn coordinator(&self) -> &RoundCoordinator {
        &self.coordinator
    }

    pub fn params(&self) -> &ParameterStore {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParameterStore {
        &mut self.params
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    pub fn simulation(&self) -> &S {
        &self.simulation
    }

    pub fn simulation_mut(&mut self) -> &mut S {
        &mut self.simulation
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn stats(&self) -> NetworkStats {
        self.connection.stats()
    }

    pub async fn start(&mut self, code: &str) -> Result<bool, ConnectionError> {
        let effects = self.coordinator.start();
        self.apply(effects);

        if self.coordinator.mode() == GameMode::SinglePlayer {
            log::info!("Starting single-player session as {}", self.role());
            return Ok(true);
        }

        let connected = self.connection.connect(code, self.role()).await?;
        if !connected {
            log::warn!("Session {} refused the connection", code);
        }
        Ok(connected)
    }

    pub async fn run(&mut self, events: &mut mpsc::Receiver<SimulationEvent>) -> SessionEnd {
        let mut ping = interval_at(Instant::now() + self.ping_interval, self.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = self.connection.next_event(), if self.connection.has_session() => {
                    if let Some(event) = event {
                        if let Some(end) = self.on_connection_event(event) {
                            return end;
                        }
                    }
                }
                local = events.recv() => match local {
                    Some(event) => self.on_local(event),
                    None => {
                        log::info!("Simulation closed its event stream");
                        return SessionEnd::LocalClosed;
                    }
                },
                _ = self.countdown.tick() => {
                    let effects = self.coordinator.countdown_tick();
                    self.apply(effects);
                }
                _ = ping.tick(), if self.connection.is_connected() => self.send_ping(),
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.countdown.disarm();
        self.connection.disconnect();
    }

    fn on_connection_event(&mut self, event: ConnectionEvent) -> Option<SessionEnd> {
        match event {
            ConnectionEvent::Inbound(envelope) => {
                self.router.dispatch(&envelope);
                self.drain_inbox();
            }
            ConnectionEvent::Lost => {
                self.simulation
                    .apply(SimulationCommand::GameStateUpdate(GameStateUpdate::ConnectionLost));
            }
            ConnectionEvent::Reconnected => {
                self.simulation
                    .apply(SimulationCommand::GameStateUpdate(GameStateUpdate::Reconnected));
                let effects = self.coordinator.on_reconnected();
                self.apply(effects);
            }
            ConnectionEvent::Abandoned => {
                self.report_failure();
                return Some(SessionEnd::ConnectionFailed);
            }
        }
        None
    }

    fn report_failure(&mut self) {
        if self.failure_reported {
            return;
        }
        self.failure_reported = true;
        self.router.dispatch(&Envelope::disconnect_notice());
        self.simulation
            .apply(SimulationCommand::GameStateUpdate(GameStateUpdate::ConnectionFailed));
    }

    fn drain_inbox(&mut self) {
        while let Ok(envelope) = self.inbox.try_recv() {
            self.on_inbound(envelope);
        }
    }

    fn on_inbound(&mut self, envelope: Envelope) {
        match envelope.kind {
            MessageKind::CommandResult => match envelope.payload_as::<CommandResultPayload>() {
                Ok(result) if result.success => {
                    if let Err(e) = self.params.batch_set(&result.parameter_modifications) {
                        log::warn!("Rejected parameter batch from peer: {}", e);
                    }
                }
                Ok(result) => log::debug!("Peer command failed: {}", result.response),
                Err(e) => log::warn!("Dropping envelope: {}", e),
            },
            MessageKind::PlayerState => match envelope.payload_as::<PlayerStatePayload>() {
                Ok(snapshot) => self
                    .simulation
                    .apply(SimulationCommand::RemotePlayerUpdate(snapshot)),
                Err(e) => log::warn!("Dropping envelope: {}", e),
            },
            MessageKind::Pong => match envelope.payload_as::<PingPayload>() {
                Ok(pong) => {
                    let rtt = now_millis().saturating_sub(pong.timestamp);
                    log::debug!("RTT {} ms", rtt);
                    self.connection.record_rtt(rtt);
                }
                Err(e) => log::warn!("Dropping envelope: {}", e),
            },
            MessageKind::PeerJoined => {
                let role = envelope
                    .payload_as::<SystemMessagePayload>()
                    .ok()
                    .and_then(|payload| payload.role);
                if role != Some(self.role()) {
                    log::info!("Peer joined the session");
                    self.simulation
                        .apply(SimulationCommand::GameStateUpdate(GameStateUpdate::PeerJoined(role)));
                }
            }
            MessageKind::StartGame => log::info!("Both players present, game starting"),
            _ => {
                let effects = self.coordinator.handle_envelope(&envelope, &self.params);
                self.apply(effects);
            }
        }
    }

    fn on_local(&mut self, event: SimulationEvent) {
        let multiplayer = self.coordinator.mode() == GameMode::Multiplayer;

        match &event {
            SimulationEvent::ParameterCommand { text, updates } => {
                self.parameter_command(text, updates, multiplayer);
            }
            SimulationEvent::PlayerMoved(snapshot) => {
                if multiplayer && self.role() == Role::Runner {
                    self.connection.send(MessageKind::PlayerState, to_payload(snapshot));
                }
            }
            _ => {
                let effects = self.coordinator.handle_local(&event, &self.params);
                self.apply(effects);
            }
        }
    }

    fn parameter_command(&mut self, text: &str, updates: &[ParameterUpdate], multiplayer: bool) {
        let result = match self.params.batch_set(updates) {
            Ok(changed) => {
                log::info!("Command {:?} changed {} parameter(s)", text, changed.len());
                CommandResultPayload {
                    response: format!("Applied {} change(s)", changed.len()),
                    success: true,
                    parameter_modifications: updates.to_vec(),
                }
            }
            Err(e) => {
                log::warn!("Command {:?} rejected: {}", text, e);
                CommandResultPayload {
                    response: e.to_string(),
                    success: false,
                    parameter_modifications: Vec::new(),
                }
            }
        };

        if multiplayer && self.role() == Role::Commander {
            self.connection
                .send(MessageKind::CommandResult, to_payload(&result));
        }
    }

    fn send_ping(&mut self) {
        let payload = to_payload(&PingPayload {
            timestamp: now_millis(),
        });
        self.connection.send(MessageKind::Ping, payload);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send { kind, payload } => {
                    self.connection.send(kind, payload);
                }
                Effect::Simulation(command) => {
                    log::trace!("-> simulation: {}", command.signal_name());
                    self.simulation.apply(command);
                }
            }
        }

        match (self.coordinator.countdown_active(), self.countdown.is_armed()) {
            (true, false) => self.countdown.arm(),
            (false, true) => self.countdown.disarm(),
            _ => {}
        }
    }
}
