use std::fmt;

use serde::{Deserialize, Serialize};

use crate::net::{GameEventPayload, GameEventType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeathCause {
    Dart,
    Spike,
    Fall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    GameOver(DeathCause),
}

impl Outcome {
    pub fn to_payload(self, round: u32) -> GameEventPayload {
        match self {
            Self::Win => GameEventPayload {
                event_type: GameEventType::Win,
                death_type: None,
                round: Some(round),
            },
            Self::GameOver(cause) => GameEventPayload {
                event_type: GameEventType::Gameover,
                death_type: Some(cause),
                round: Some(round),
            },
        }
    }

    /// `None` for a game over that does not say how the runner died.
    pub fn from_payload(payload: &GameEventPayload) -> Option<Self> {
        match payload.event_type {
            GameEventType::Win => Some(Self::Win),
            GameEventType::Gameover => payload.death_type.map(Self::GameOver),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Win => f.write_str("win"),
            Self::GameOver(cause) => write!(f, "game over ({:?})", cause),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Selecting,
    Placing,
    AwaitingPeerPlacement,
    CountdownRunning { remaining: u8 },
    Playing,
    Over(Outcome),
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Selecting => "selecting",
            Self::Placing => "placing",
            Self::AwaitingPeerPlacement => "awaiting_peer_placement",
            Self::CountdownRunning { .. } => "countdown_running",
            Self::Playing => "playing",
            Self::Over(_) => "over",
        }
    }

    pub fn is_over(&self) -> bool {
        matches!(self, Self::Over(_))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CountdownRunning { remaining } => write!(f, "countdown_running({})", remaining),
            Self::Over(outcome) => write!(f, "over({})", outcome),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Round {
    pub number: u32,
    pub phase: Phase,
    pub local_placement_done: bool,
    pub peer_placement_done: bool,
}

impl Round {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            phase: Phase::Selecting,
            local_placement_done: false,
            peer_placement_done: false,
        }
    }

    pub fn first() -> Self {
        Self::new(1)
    }

    pub fn next(&self) -> Self {
        Self::new(self.number + 1)
    }
}

impl Default for Round {
    fn default() -> Self {
        Self::first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_payload_mapping() {
        let payload = Outcome::GameOver(DeathCause::Fall).to_payload(4);
        assert_eq!(payload.event_type, GameEventType::Gameover);
        assert_eq!(payload.death_type, Some(DeathCause::Fall));
        assert_eq!(payload.round, Some(4));
        assert_eq!(Outcome::from_payload(&payload), Some(Outcome::GameOver(DeathCause::Fall)));

        let win = Outcome::Win.to_payload(1);
        assert_eq!(win.death_type, None);
        assert_eq!(Outcome::from_payload(&win), Some(Outcome::Win));
    }

    #[test]
    fn game_over_without_cause_is_rejected() {
        let payload = GameEventPayload {
            event_type: GameEventType::Gameover,
            death_type: None,
            round: None,
        };
        assert_eq!(Outcome::from_payload(&payload), None);
    }

    #[test]
    fn next_round_resets_flags() {
        let mut round = Round::first();
        round.phase = Phase::Over(Outcome::Win);
        round.local_placement_done = true;
        round.peer_placement_done = true;

        let next = round.next();
        assert_eq!(next.number, 2);
        assert_eq!(next.phase, Phase::Selecting);
        assert!(!next.local_placement_done);
        assert!(!next.peer_placement_done);
    }
}
