mod connection;
mod protocol;
mod simulator;
mod stats;
mod transport;

pub use connection::{
    ConnectionConfig, ConnectionError, ConnectionEvent, ConnectionManager, ConnectionState,
    Session, is_valid_session_code,
};
pub use protocol::{
    CommandResultPayload, CountdownStartedPayload, DEFAULT_PORT, Envelope, EnvelopeError,
    GameEventPayload, GameEventType, GameStatePayload, ItemPlacedPayload, MessageKind,
    PEER_JOINED_PATTERN, PingPayload, PlayerStatePayload, Role, SystemMessagePayload, now_millis,
    to_payload,
};
pub use simulator::{RemoteEnd, ScriptedHandshake, SimulatedConnector};
pub use stats::{FrameLoss, NetworkStats};
pub use transport::{
    Connector, Endpoint, Handshake, Link, LinkEvent, TransportError, WebSocketConnector,
    spawn_pump,
};
