use std::time::Duration;

use tokio::sync::mpsc;

use goatshell::params::ParameterUpdate;
use goatshell::{
    DeathCause, GameMode, GameStateUpdate, ItemKind, Outcome, Placement, PlayerSnapshot, Role,
    Simulation, SimulationCommand, SimulationEvent, Vec2,
};

use crate::config::BotConfig;

const LEVEL_WIDTH: f32 = 1200.0;
const GROUND_Y: f32 = 560.0;

/// Stands in for the physics game: answers coordination commands with the
/// events a human player would eventually produce.
pub struct BotSimulation {
    role: Role,
    mode: GameMode,
    config: BotConfig,
    events: Option<mpsc::Sender<SimulationEvent>>,
    round: u32,
    rounds_finished: u32,
}

impl BotSimulation {
    pub fn new(role: Role, config: BotConfig, events: mpsc::Sender<SimulationEvent>) -> Self {
        Self {
            role,
            mode: GameMode::Multiplayer,
            config,
            events: Some(events),
            round: 1,
            rounds_finished: 0,
        }
    }

    pub fn rounds_finished(&self) -> u32 {
        self.rounds_finished
    }

    fn think(&self) -> Duration {
        Duration::from_millis(self.config.think_time_ms)
    }

    fn later(&self, delay: Duration, event: SimulationEvent) {
        let Some(events) = self.events.clone() else {
            return;
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(event).await;
        });
    }

    fn choose_item(&self) {
        let item = ItemKind::ALL[(self.round as usize) % ItemKind::ALL.len()];
        log::info!("Round {}: choosing {:?}", self.round, item);
        self.later(self.think(), SimulationEvent::ItemSelected(item));
    }

    fn place(&self, item: ItemKind) {
        let lane = match self.role {
            Role::Runner => 0.35,
            Role::Commander => 0.65,
        };
        let placement = Placement::new(item, LEVEL_WIDTH * lane, GROUND_Y - 40.0);
        self.later(self.think(), SimulationEvent::ItemPlaced(placement));
    }

    fn play(&self) {
        match self.role {
            Role::Runner => self.run_level(),
            Role::Commander => {
                let placement = Placement::new(ItemKind::DartWall, LEVEL_WIDTH * 0.8, GROUND_Y - 150.0);
                self.later(self.think() * 2, SimulationEvent::LiveItemPlaced(placement));
            }
        }
    }

    fn run_level(&self) {
        let Some(events) = self.events.clone() else {
            return;
        };
        let run_time = Duration::from_millis(self.config.run_time_ms);
        let steps = 4u32;
        let outcome = if self.round % 2 == 1 {
            SimulationEvent::Win
        } else {
            SimulationEvent::GameOver(DeathCause::Spike)
        };

        tokio::spawn(async move {
            for step in 1..=steps {
                tokio::time::sleep(run_time / steps).await;
                let snapshot = PlayerSnapshot {
                    position: Vec2 {
                        x: LEVEL_WIDTH * step as f32 / steps as f32,
                        y: GROUND_Y,
                    },
                    velocity: Vec2 { x: 200.0, y: 0.0 },
                    is_on_ground: true,
                };
                if events.send(SimulationEvent::PlayerMoved(snapshot)).await.is_err() {
                    return;
                }
            }
            let _ = events.send(outcome).await;
        });
    }

    fn round_over(&mut self, outcome: Outcome) {
        self.rounds_finished += 1;
        log::info!("Round {} over: {}", self.round, outcome);

        if self.rounds_finished >= self.config.rounds {
            log::info!("Played {} round(s), stopping", self.rounds_finished);
            self.events = None;
            return;
        }
        self.later(self.think(), SimulationEvent::Continue);
    }

    fn tune(&self) {
        if self.role != Role::Commander || self.mode != GameMode::Multiplayer {
            return;
        }
        let updates = vec![
            ParameterUpdate::normalized("dart_frequency", -0.5),
            ParameterUpdate::normalized("gravity", 0.25),
        ];
        self.later(
            self.think(),
            SimulationEvent::ParameterCommand {
                text: String::from("faster darts, heavier goat"),
                updates,
            },
        );
    }
}

impl Simulation for BotSimulation {
    fn apply(&mut self, command: SimulationCommand) {
        log::debug!("{}", command.signal_name());

        match command {
            SimulationCommand::GameModeConfig { mode, role, cadence } => {
                self.mode = mode;
                self.role = role;
                log::info!(
                    "Playing {:?} as {}, darts every {:?}",
                    mode,
                    role,
                    cadence.dart_interval
                );
                self.tune();
                self.choose_item();
            }
            SimulationCommand::EnterPlacementMode(item) => self.place(item),
            SimulationCommand::ConfirmPlacement(placement) => {
                log::info!("Placed {:?} at ({}, {})", placement.item, placement.x, placement.y);
            }
            SimulationCommand::PlaceItem(placement) => {
                log::info!("Peer placed {:?} at ({}, {})", placement.item, placement.x, placement.y);
            }
            SimulationCommand::PlaceLiveItem(placement) => {
                log::info!("Live {:?} dropped at ({}, {})", placement.item, placement.x, placement.y);
            }
            SimulationCommand::ExitPlacementMode => {}
            SimulationCommand::RemotePlayerUpdate(snapshot) => {
                log::debug!("Runner at ({}, {})", snapshot.position.x, snapshot.position.y);
            }
            SimulationCommand::ContinueToNextRound(cadence) => {
                self.round = cadence.round;
                self.choose_item();
            }
            SimulationCommand::GameStateUpdate(update) => match update {
                GameStateUpdate::WaitingForPeer => log::info!("Waiting for the other player"),
                GameStateUpdate::Countdown { remaining } if remaining > 0 => {
                    log::info!("{}...", remaining)
                }
                GameStateUpdate::Countdown { .. } => {}
                GameStateUpdate::Playing => self.play(),
                GameStateUpdate::RoundOver(outcome) => self.round_over(outcome),
                GameStateUpdate::PeerJoined(role) => log::info!("Peer joined as {:?}", role),
                GameStateUpdate::ConnectionLost => log::warn!("Connection lost, reconnecting"),
                GameStateUpdate::Reconnected => log::info!("Reconnected"),
                GameStateUpdate::ConnectionFailed => log::error!("Connection failed for good"),
            },
        }
    }
}
