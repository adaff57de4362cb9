pub mod lobby;
pub mod net;
pub mod params;
pub mod round;
pub mod router;
pub mod session;
pub mod simulation;

pub use lobby::{ConnectionId, Lobby, LobbyError, LobbyManager, LobbyStatus, Member};
pub use net::{
    ConnectionConfig, ConnectionError, ConnectionEvent, ConnectionManager, ConnectionState,
    Connector, DEFAULT_PORT, Envelope, EnvelopeError, MessageKind, NetworkStats, Role,
    SimulatedConnector, TransportError, WebSocketConnector,
};
pub use params::{GameParameter, ParameterError, ParameterStore, ParameterUpdate, ParameterValue};
pub use round::{DeathCause, Effect, Outcome, Phase, Round, RoundConfig, RoundCoordinator};
pub use router::{DispatchReport, Handler, Router, SubscriptionId, Topic};
pub use session::{GameSession, SessionConfig, SessionEnd};
pub use simulation::{
    GameMode, GameStateUpdate, ItemKind, Placement, PlayerSnapshot, Simulation, SimulationCommand,
    SimulationEvent, Vec2,
};
