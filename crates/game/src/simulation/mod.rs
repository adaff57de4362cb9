use serde::{Deserialize, Serialize};

use crate::net::Role;
use crate::params::ParameterUpdate;
use crate::round::{DeathCause, ObstacleCadence, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    DartWall,
    Platform,
    Spike,
    Oscillator,
    Shield,
}

impl ItemKind {
    pub const ALL: [ItemKind; 5] = [
        Self::DartWall,
        Self::Platform,
        Self::Spike,
        Self::Oscillator,
        Self::Shield,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub item: ItemKind,
    pub x: f32,
    pub y: f32,
}

impl Placement {
    pub fn new(item: ItemKind, x: f32, y: f32) -> Self {
        Self { item, x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub position: Vec2,
    pub velocity: Vec2,
    #[serde(rename = "isOnGround")]
    pub is_on_ground: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GameMode {
    #[default]
    Multiplayer,
    SinglePlayer,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimulationEvent {
    ItemSelected(ItemKind),
    ItemPlaced(Placement),
    EnteredPlaying,
    GameOver(DeathCause),
    Win,
    Continue,
    LiveItemPlaced(Placement),
    PlayerMoved(PlayerSnapshot),
    ParameterCommand {
        text: String,
        updates: Vec<ParameterUpdate>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GameStateUpdate {
    WaitingForPeer,
    Countdown { remaining: u8 },
    Playing,
    RoundOver(Outcome),
    PeerJoined(Option<Role>),
    ConnectionLost,
    Reconnected,
    ConnectionFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimulationCommand {
    GameModeConfig {
        mode: GameMode,
        role: Role,
        cadence: ObstacleCadence,
    },
    EnterPlacementMode(ItemKind),
    ConfirmPlacement(Placement),
    PlaceItem(Placement),
    ExitPlacementMode,
    PlaceLiveItem(Placement),
    GameStateUpdate(GameStateUpdate),
    ContinueToNextRound(ObstacleCadence),
    RemotePlayerUpdate(PlayerSnapshot),
}

impl SimulationCommand {
    pub fn signal_name(&self) -> &'static str {
        match self {
            Self::GameModeConfig { .. } => "game-mode-config",
            Self::EnterPlacementMode(_) => "enter-placement-mode",
            Self::ConfirmPlacement(_) => "confirm-placement",
            Self::PlaceItem(_) => "place-item",
            Self::ExitPlacementMode => "exit-placement-mode",
            Self::PlaceLiveItem(_) => "place-live-item",
            Self::GameStateUpdate(_) => "game-state-update",
            Self::ContinueToNextRound(_) => "continue-to-next-round",
            Self::RemotePlayerUpdate(_) => "remote-player-update",
        }
    }
}

pub trait Simulation {
    fn apply(&mut self, command: SimulationCommand);
}

impl Simulation for Vec<SimulationCommand> {
    fn apply(&mut self, command: SimulationCommand) {
        self.push(command);
    }
}
