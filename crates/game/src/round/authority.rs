use crate::net::Role;

use super::state::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Win,
    GameOver,
    ItemPlaced,
    LiveItemPlaced,
    CountdownStarted,
    RoundSync,
}

impl From<Outcome> for EventKind {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Win => Self::Win,
            Outcome::GameOver(_) => Self::GameOver,
        }
    }
}

/// Whether a report of `event` originating from `role` may drive a round
/// transition. Terminal outcomes belong to the Runner, who owns the physics;
/// live placements belong to the Commander.
pub fn is_authoritative(role: Role, event: EventKind) -> bool {
    match event {
        EventKind::Win | EventKind::GameOver => role == Role::Runner,
        EventKind::LiveItemPlaced => role == Role::Commander,
        EventKind::ItemPlaced | EventKind::CountdownStarted | EventKind::RoundSync => true,
    }
}
