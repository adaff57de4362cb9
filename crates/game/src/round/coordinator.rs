use serde_json::Value;

use crate::net::{
    CountdownStartedPayload, Envelope, GameEventPayload, GameStatePayload, ItemPlacedPayload,
    MessageKind, Role, to_payload,
};
use crate::params::ParameterStore;
use crate::simulation::{
    GameMode, GameStateUpdate, Placement, SimulationCommand, SimulationEvent,
};

use super::authority::{EventKind, is_authoritative};
use super::cadence::ObstacleCadence;
use super::countdown::DEFAULT_COUNTDOWN_SECS;
use super::state::{Outcome, Phase, Round};

#[derive(Debug, Clone)]
pub struct RoundConfig {
    pub mode: GameMode,
    pub countdown_secs: u8,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            mode: GameMode::Multiplayer,
            countdown_secs: DEFAULT_COUNTDOWN_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send { kind: MessageKind, payload: Value },
    Simulation(SimulationCommand),
}

impl Effect {
    fn send<T: serde::Serialize>(kind: MessageKind, payload: &T) -> Self {
        Self::Send {
            kind,
            payload: to_payload(payload),
        }
    }

    fn state(update: GameStateUpdate) -> Self {
        Self::Simulation(SimulationCommand::GameStateUpdate(update))
    }
}

#[derive(Debug)]
pub struct RoundCoordinator {
    role: Role,
    config: RoundConfig,
    round: Round,
    local_placement: Option<Placement>,
    /// Peer placement for the round after this one, received while `Over`.
    early_peer_placement: Option<(u32, Placement)>,
    countdown_initiated_locally: bool,
    cadence: ObstacleCadence,
}

impl RoundCoordinator {
    pub fn new(role: Role, config: RoundConfig, params: &ParameterStore) -> Self {
        Self {
            role,
            config,
            round: Round::first(),
            local_placement: None,
            early_peer_placement: None,
            countdown_initiated_locally: false,
            cadence: ObstacleCadence::from_params(1, params),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn mode(&self) -> GameMode {
        self.config.mode
    }

    pub fn round(&self) -> &Round {
        &self.round
    }

    pub fn phase(&self) -> Phase {
        self.round.phase
    }

    pub fn countdown_active(&self) -> bool {
        matches!(self.round.phase, Phase::CountdownRunning { .. })
    }

    pub fn countdown_initiated_locally(&self) -> bool {
        self.countdown_active() && self.countdown_initiated_locally
    }

    fn multiplayer(&self) -> bool {
        self.config.mode == GameMode::Multiplayer
    }

    pub fn start(&self) -> Vec<Effect> {
        vec![Effect::Simulation(SimulationCommand::GameModeConfig {
            mode: self.config.mode,
            role: self.role,
            cadence: self.cadence,
        })]
    }

    pub fn handle_local(&mut self, event: &SimulationEvent, params: &ParameterStore) -> Vec<Effect> {
        match event {
            SimulationEvent::ItemSelected(item) => self.item_selected(*item),
            SimulationEvent::ItemPlaced(placement) => self.item_placed(*placement),
            SimulationEvent::EnteredPlaying => self.entered_playing(),
            SimulationEvent::GameOver(cause) => self.local_terminal(Outcome::GameOver(*cause)),
            SimulationEvent::Win => self.local_terminal(Outcome::Win),
            SimulationEvent::Continue => self.continue_round(params),
            SimulationEvent::LiveItemPlaced(placement) => self.live_item_placed(*placement),
            SimulationEvent::PlayerMoved(_) | SimulationEvent::ParameterCommand { .. } => Vec::new(),
        }
    }

    pub fn handle_envelope(&mut self, envelope: &Envelope, params: &ParameterStore) -> Vec<Effect> {
        if envelope.sender_role == Some(self.role) {
            log::debug!("Ignoring {} echoed from our own role", envelope.kind);
            return Vec::new();
        }

        match envelope.kind {
            MessageKind::ItemPlaced => match envelope.payload_as::<ItemPlacedPayload>() {
                Ok(payload) if payload.live => self.remote_live_item(envelope.sender_role, &payload),
                Ok(payload) => self.remote_item_placed(&payload),
                Err(e) => malformed(e),
            },
            MessageKind::CountdownStarted => match envelope.payload_as::<CountdownStartedPayload>() {
                Ok(payload) => self.remote_countdown(payload),
                Err(e) => malformed(e),
            },
            MessageKind::GameEvent => match envelope.payload_as::<GameEventPayload>() {
                Ok(payload) => self.remote_game_event(envelope.sender_role, payload),
                Err(e) => malformed(e),
            },
            MessageKind::GameState => match envelope.payload_as::<GameStatePayload>() {
                Ok(payload) => self.round_sync(payload, params),
                Err(e) => malformed(e),
            },
            _ => Vec::new(),
        }
    }

    pub fn countdown_tick(&mut self) -> Vec<Effect> {
        let Phase::CountdownRunning { remaining } = self.round.phase else {
            return Vec::new();
        };

        let remaining = remaining.saturating_sub(1);
        if remaining == 0 {
            self.transition(Phase::Playing);
            vec![
                Effect::state(GameStateUpdate::Countdown { remaining: 0 }),
                Effect::state(GameStateUpdate::Playing),
            ]
        } else {
            self.round.phase = Phase::CountdownRunning { remaining };
            vec![Effect::state(GameStateUpdate::Countdown { remaining })]
        }
    }

    /// Asks the peer for its view of the round after the link came back, and
    /// repeats our placement if the peer may have missed it.
    pub fn on_reconnected(&self) -> Vec<Effect> {
        if !self.multiplayer() {
            return Vec::new();
        }

        let mut effects = vec![Effect::send(
            MessageKind::GameState,
            &GameStatePayload::Request {
                round: self.round.number,
            },
        )];

        if self.round.phase == Phase::AwaitingPeerPlacement {
            if let Some(placement) = self.local_placement {
                effects.push(self.item_placed_effect(placement, false));
            }
        }

        effects
    }

    fn item_selected(&mut self, item: crate::simulation::ItemKind) -> Vec<Effect> {
        match self.round.phase {
            Phase::Selecting => {
                self.transition(Phase::Placing);
                vec![Effect::Simulation(SimulationCommand::EnterPlacementMode(item))]
            }
            Phase::Placing => vec![Effect::Simulation(SimulationCommand::EnterPlacementMode(item))],
            phase => {
                log::debug!("Item selection ignored while {}", phase);
                Vec::new()
            }
        }
    }

    fn item_placed(&mut self, placement: Placement) -> Vec<Effect> {
        if self.round.phase != Phase::Placing {
            log::debug!("Placement ignored while {}", self.round.phase);
            return Vec::new();
        }

        self.round.local_placement_done = true;
        self.local_placement = Some(placement);

        let mut effects = vec![
            Effect::Simulation(SimulationCommand::ExitPlacementMode),
            Effect::Simulation(SimulationCommand::ConfirmPlacement(placement)),
        ];

        if !self.multiplayer() {
            self.begin_countdown(self.config.countdown_secs, true, &mut effects);
            return effects;
        }

        effects.push(self.item_placed_effect(placement, false));

        if self.round.peer_placement_done {
            self.begin_countdown(self.config.countdown_secs, true, &mut effects);
        } else {
            self.transition(Phase::AwaitingPeerPlacement);
            effects.push(Effect::state(GameStateUpdate::WaitingForPeer));
        }

        effects
    }

    fn entered_playing(&mut self) -> Vec<Effect> {
        if self.countdown_active() {
            self.transition(Phase::Playing);
        }
        Vec::new()
    }

    fn local_terminal(&mut self, outcome: Outcome) -> Vec<Effect> {
        if !is_authoritative(self.role, outcome.into()) {
            log::debug!(
                "Local {} ignored: {} mirrors the runner's outcome",
                outcome,
                self.role
            );
            return Vec::new();
        }

        if self.round.phase != Phase::Playing {
            log::debug!("Local {} ignored while {}", outcome, self.round.phase);
            return Vec::new();
        }

        self.transition(Phase::Over(outcome));

        let mut effects = vec![Effect::state(GameStateUpdate::RoundOver(outcome))];
        if self.multiplayer() {
            effects.push(Effect::send(
                MessageKind::GameEvent,
                &outcome.to_payload(self.round.number),
            ));
        }
        effects
    }

    fn continue_round(&mut self, params: &ParameterStore) -> Vec<Effect> {
        if !self.round.phase.is_over() {
            log::debug!("Continue ignored while {}", self.round.phase);
            return Vec::new();
        }

        self.round = self.round.next();
        self.local_placement = None;
        self.countdown_initiated_locally = false;
        self.cadence = ObstacleCadence::from_params(self.round.number, params);
        log::info!("Round {} begins", self.round.number);

        let mut effects = vec![Effect::Simulation(SimulationCommand::ContinueToNextRound(
            self.cadence,
        ))];

        if let Some((round, placement)) = self.early_peer_placement.take() {
            if round == self.round.number {
                self.round.peer_placement_done = true;
                effects.push(Effect::Simulation(SimulationCommand::PlaceItem(placement)));
            }
        }

        effects
    }

    fn live_item_placed(&mut self, placement: Placement) -> Vec<Effect> {
        if !is_authoritative(self.role, EventKind::LiveItemPlaced) {
            log::debug!("{} cannot place live items", self.role);
            return Vec::new();
        }
        if self.round.phase != Phase::Playing {
            log::debug!("Live placement ignored while {}", self.round.phase);
            return Vec::new();
        }

        let mut effects = vec![Effect::Simulation(SimulationCommand::ConfirmPlacement(
            placement,
        ))];
        if self.multiplayer() {
            effects.push(self.item_placed_effect(placement, true));
        }
        effects
    }

    fn remote_item_placed(&mut self, payload: &ItemPlacedPayload) -> Vec<Effect> {
        if !self.multiplayer() {
            return Vec::new();
        }

        let placement = Placement::new(payload.item_type, payload.x, payload.y);

        if payload.round < self.round.number {
            log::debug!("Stale item_placed for round {}", payload.round);
            return Vec::new();
        }

        if payload.round > self.round.number {
            if payload.round == self.round.number + 1 && self.round.phase.is_over() {
                log::debug!("Peer already placed for round {}", payload.round);
                self.early_peer_placement = Some((payload.round, placement));
            } else {
                log::warn!(
                    "item_placed for round {} while on round {}",
                    payload.round,
                    self.round.number
                );
            }
            return Vec::new();
        }

        if self.round.peer_placement_done {
            log::debug!("Duplicate item_placed for round {}", payload.round);
            return Vec::new();
        }

        self.round.peer_placement_done = true;
        let mut effects = vec![Effect::Simulation(SimulationCommand::PlaceItem(placement))];

        // Only the peer that was already waiting starts the countdown.
        if self.round.phase == Phase::AwaitingPeerPlacement {
            self.begin_countdown(self.config.countdown_secs, true, &mut effects);
        }

        effects
    }

    fn remote_live_item(&mut self, sender: Option<Role>, payload: &ItemPlacedPayload) -> Vec<Effect> {
        let reporter = sender.unwrap_or(self.role.peer());
        if !is_authoritative(reporter, EventKind::LiveItemPlaced) {
            log::warn!("Ignoring live placement from {}", reporter);
            return Vec::new();
        }
        if payload.round != self.round.number || self.round.phase != Phase::Playing {
            log::debug!("Live placement for round {} ignored while {}", payload.round, self.round.phase);
            return Vec::new();
        }

        vec![Effect::Simulation(SimulationCommand::PlaceLiveItem(
            Placement::new(payload.item_type, payload.x, payload.y),
        ))]
    }

    fn remote_countdown(&mut self, payload: CountdownStartedPayload) -> Vec<Effect> {
        if payload.round != self.round.number {
            log::debug!("Stale countdown_started for round {}", payload.round);
            return Vec::new();
        }

        match self.round.phase {
            Phase::CountdownRunning { .. } => {
                log::debug!("Countdown already running, ignoring duplicate countdown_started");
                Vec::new()
            }
            Phase::AwaitingPeerPlacement => {
                let seconds = if payload.seconds == 0 {
                    self.config.countdown_secs
                } else {
                    payload.seconds
                };
                let mut effects = Vec::new();
                self.begin_countdown(seconds, false, &mut effects);
                effects
            }
            phase => {
                log::debug!("countdown_started ignored while {}", phase);
                Vec::new()
            }
        }
    }

    fn remote_game_event(&mut self, sender: Option<Role>, payload: GameEventPayload) -> Vec<Effect> {
        let Some(outcome) = Outcome::from_payload(&payload) else {
            log::warn!("game_event without a usable outcome: {:?}", payload);
            return Vec::new();
        };

        let reporter = sender.unwrap_or(self.role.peer());
        if !is_authoritative(reporter, outcome.into()) {
            log::warn!("Ignoring {} reported by {}", outcome, reporter);
            return Vec::new();
        }

        if payload.round.is_some_and(|round| round != self.round.number) {
            log::debug!("Stale game_event for round {:?}", payload.round);
            return Vec::new();
        }

        // The runner can finish before our own countdown display reaches zero.
        match self.round.phase {
            Phase::Playing | Phase::CountdownRunning { .. } => {
                self.transition(Phase::Over(outcome));
                vec![Effect::state(GameStateUpdate::RoundOver(outcome))]
            }
            phase => {
                log::debug!("game_event ignored while {}", phase);
                Vec::new()
            }
        }
    }

    fn round_sync(&mut self, payload: GameStatePayload, params: &ParameterStore) -> Vec<Effect> {
        match payload {
            GameStatePayload::Request { round } => self.answer_sync_request(round),
            GameStatePayload::Snapshot {
                round,
                placement_done,
                ..
            } => self.apply_snapshot(round, placement_done, params),
        }
    }

    fn answer_sync_request(&self, requester_round: u32) -> Vec<Effect> {
        let placement = self
            .local_placement
            .filter(|_| !self.round.phase.is_over())
            .map(|placement| self.item_placed_effect(placement, false));
        let snapshot = Effect::send(
            MessageKind::GameState,
            &GameStatePayload::Snapshot {
                round: self.round.number,
                phase: self.round.phase.name().to_string(),
                placement_done: self.round.local_placement_done,
            },
        );

        // A requester on our round takes the placement straight away; one that
        // is behind only accepts it after the snapshot moved it forward.
        match placement {
            Some(placement) if requester_round == self.round.number => vec![placement, snapshot],
            Some(placement) if requester_round < self.round.number => vec![snapshot, placement],
            _ => vec![snapshot],
        }
    }

    fn apply_snapshot(&mut self, round: u32, peer_placed: bool, params: &ParameterStore) -> Vec<Effect> {
        if round < self.round.number {
            log::debug!("Stale snapshot for round {}", round);
            return Vec::new();
        }

        if round > self.round.number {
            return self.jump_to_round(round, params);
        }

        if !peer_placed || self.round.peer_placement_done {
            return Vec::new();
        }

        self.round.peer_placement_done = true;
        let mut effects = Vec::new();
        if self.round.phase == Phase::AwaitingPeerPlacement {
            self.begin_countdown(self.config.countdown_secs, true, &mut effects);
        }
        effects
    }

    fn jump_to_round(&mut self, round: u32, params: &ParameterStore) -> Vec<Effect> {
        log::info!("Peer is on round {}, resynchronising from round {}", round, self.round.number);
        self.round = Round::new(round);
        self.local_placement = None;
        self.countdown_initiated_locally = false;
        self.cadence = ObstacleCadence::from_params(round, params);

        let mut effects = vec![Effect::Simulation(SimulationCommand::ContinueToNextRound(
            self.cadence,
        ))];

        match self.early_peer_placement.take() {
            Some((early_round, placement)) if early_round == round => {
                self.round.peer_placement_done = true;
                effects.push(Effect::Simulation(SimulationCommand::PlaceItem(placement)));
            }
            Some((early_round, _)) => log::debug!("Dropping buffered placement for round {}", early_round),
            None => {}
        }
        effects
    }

    fn begin_countdown(&mut self, seconds: u8, initiated_locally: bool, effects: &mut Vec<Effect>) {
        self.countdown_initiated_locally = initiated_locally;

        if initiated_locally && self.multiplayer() {
            effects.push(Effect::send(
                MessageKind::CountdownStarted,
                &CountdownStartedPayload {
                    round: self.round.number,
                    seconds,
                },
            ));
        }

        if seconds == 0 {
            self.transition(Phase::Playing);
            effects.push(Effect::state(GameStateUpdate::Playing));
            return;
        }

        self.transition(Phase::CountdownRunning { remaining: seconds });
        effects.push(Effect::state(GameStateUpdate::Countdown { remaining: seconds }));
    }

    fn item_placed_effect(&self, placement: Placement, live: bool) -> Effect {
        Effect::send(
            MessageKind::ItemPlaced,
            &ItemPlacedPayload {
                round: self.round.number,
                item_type: placement.item,
                x: placement.x,
                y: placement.y,
                live,
            },
        )
    }

    fn transition(&mut self, phase: Phase) {
        log::info!(
            "Round {} ({}): {} -> {}",
            self.round.number,
            self.role,
            self.round.phase,
            phase
        );
        self.round.phase = phase;
    }
}

fn malformed(error: crate::net::EnvelopeError) -> Vec<Effect> {
    log::warn!("Dropping envelope: {}", error);
    Vec::new()
}
