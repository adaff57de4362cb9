mod authority;
mod cadence;
mod coordinator;
mod countdown;
mod state;

pub use authority::{EventKind, is_authoritative};
pub use cadence::ObstacleCadence;
pub use coordinator::{Effect, RoundConfig, RoundCoordinator};
pub use countdown::{CountdownTimer, DEFAULT_COUNTDOWN_SECS};
pub use state::{DeathCause, Outcome, Phase, Round};
