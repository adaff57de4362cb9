use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::params::ParameterUpdate;
use crate::round::DeathCause;
use crate::simulation::{ItemKind, PlayerSnapshot};

pub const DEFAULT_PORT: u16 = 8000;
pub const PEER_JOINED_PATTERN: &str = "Player joined";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "goat")]
    Runner,
    #[serde(rename = "prompter")]
    Commander,
}

impl Role {
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Runner => "goat",
            Self::Commander => "prompter",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "goat" => Some(Self::Runner),
            "prompter" => Some(Self::Commander),
            _ => None,
        }
    }

    pub fn peer(&self) -> Self {
        match self {
            Self::Runner => Self::Commander,
            Self::Commander => Self::Runner,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wire(s).ok_or_else(|| format!("unknown role {s:?}, expected goat or prompter"))
    }
}

/// Every envelope kind this layer understands. `PeerJoined` and `Disconnect`
/// only ever exist locally and are refused on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    PlayerJoined,
    StartGame,
    PlayerState,
    CommandResult,
    ItemPlaced,
    CountdownStarted,
    GameEvent,
    GameState,
    SystemMessage,
    Ping,
    Pong,
    PeerJoined,
    Disconnect,
}

impl MessageKind {
    pub const ALL: [MessageKind; 13] = [
        Self::PlayerJoined,
        Self::StartGame,
        Self::PlayerState,
        Self::CommandResult,
        Self::ItemPlaced,
        Self::CountdownStarted,
        Self::GameEvent,
        Self::GameState,
        Self::SystemMessage,
        Self::Ping,
        Self::Pong,
        Self::PeerJoined,
        Self::Disconnect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlayerJoined => "player_joined",
            Self::StartGame => "start_game",
            Self::PlayerState => "player_state",
            Self::CommandResult => "command_result",
            Self::ItemPlaced => "item_placed",
            Self::CountdownStarted => "countdown_started",
            Self::GameEvent => "game_event",
            Self::GameState => "game_state",
            Self::SystemMessage => "system_message",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::PeerJoined => "peer_joined",
            Self::Disconnect => "disconnect",
        }
    }

    pub fn is_local_only(&self) -> bool {
        matches!(self, Self::PeerJoined | Self::Disconnect)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("serialization failed: {0}")]
    Serialize(serde_json::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(serde_json::Error),
    #[error("payload of {0} is not an object")]
    PayloadNotObject(MessageKind),
    #[error("{0} is not a wire message")]
    LocalOnly(MessageKind),
    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: MessageKind,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(rename = "data", default)]
    pub payload: Value,
    #[serde(rename = "playerRole", default, skip_serializing_if = "Option::is_none")]
    pub sender_role: Option<Role>,
    #[serde(rename = "timestamp", default)]
    pub sent_at_millis: u64,
}

impl Envelope {
    pub fn new(kind: MessageKind, payload: Value, sender_role: Option<Role>) -> Self {
        Self {
            kind,
            payload: object_or_empty(payload),
            sender_role,
            sent_at_millis: now_millis(),
        }
    }

    pub fn local(kind: MessageKind, payload: Value) -> Self {
        Self::new(kind, payload, None)
    }

    pub fn disconnect_notice() -> Self {
        Self::local(MessageKind::Disconnect, Value::Object(Map::new()))
    }

    pub fn encode(&self) -> Result<String, EnvelopeError> {
        if self.kind.is_local_only() {
            return Err(EnvelopeError::LocalOnly(self.kind));
        }
        serde_json::to_string(self).map_err(EnvelopeError::Serialize)
    }

    pub fn decode(text: &str) -> Result<Self, EnvelopeError> {
        let mut envelope: Self = serde_json::from_str(text).map_err(EnvelopeError::Deserialize)?;
        if envelope.kind.is_local_only() {
            return Err(EnvelopeError::LocalOnly(envelope.kind));
        }
        match envelope.payload {
            Value::Object(_) => {}
            Value::Null => envelope.payload = Value::Object(Map::new()),
            _ => return Err(EnvelopeError::PayloadNotObject(envelope.kind)),
        }
        Ok(envelope)
    }

    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, EnvelopeError> {
        T::deserialize(&self.payload).map_err(|source| EnvelopeError::Payload {
            kind: self.kind,
            source,
        })
    }

    pub fn message_text(&self) -> Option<&str> {
        self.payload.get("message").and_then(Value::as_str)
    }
}

fn object_or_empty(payload: Value) -> Value {
    match payload {
        Value::Null => Value::Object(Map::new()),
        other => other,
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

pub fn to_payload<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        log::error!("Failed to serialize payload: {}", e);
        Value::Object(Map::new())
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPlacedPayload {
    pub round: u32,
    pub item_type: ItemKind,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub live: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownStartedPayload {
    pub round: u32,
    pub seconds: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameEventType {
    Win,
    Gameover,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEventPayload {
    pub event_type: GameEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death_type: Option<DeathCause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "sync", rename_all = "snake_case")]
pub enum GameStatePayload {
    Request {
        round: u32,
    },
    Snapshot {
        round: u32,
        phase: String,
        placement_done: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMessagePayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl SystemMessagePayload {
    pub fn is_peer_joined(&self) -> bool {
        self.message.contains(PEER_JOINED_PATTERN)
    }

    /// Role named in the message text, for relays that do not send it as a
    /// separate field.
    pub fn mentioned_role(&self) -> Option<Role> {
        self.role.or_else(|| {
            self.message
                .split(|c: char| !c.is_ascii_alphanumeric())
                .find_map(Role::from_wire)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResultPayload {
    pub response: String,
    pub success: bool,
    #[serde(default)]
    pub parameter_modifications: Vec<ParameterUpdate>,
}

pub type PlayerStatePayload = PlayerSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingPayload {
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn role_wire_names() {
        assert_eq!(Role::Runner.as_wire(), "goat");
        assert_eq!(Role::Commander.as_wire(), "prompter");
        assert_eq!("prompter".parse::<Role>(), Ok(Role::Commander));
        assert!("spectator".parse::<Role>().is_err());
        assert_eq!(Role::Runner.peer(), Role::Commander);
    }

    #[test]
    fn kind_names_match_serde() {
        for kind in MessageKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, Value::String(kind.as_str().to_string()));
        }
    }

    #[test]
    fn decode_wire_envelope() {
        let text = r#"{"type":"item_placed","data":{"round":2,"item_type":"spike","x":10.0,"y":4.5},"playerRole":"prompter","timestamp":1700000000000}"#;
        let envelope = Envelope::decode(text).unwrap();

        assert_eq!(envelope.kind, MessageKind::ItemPlaced);
        assert_eq!(envelope.sender_role, Some(Role::Commander));
        assert_eq!(envelope.sent_at_millis, 1_700_000_000_000);

        let payload: ItemPlacedPayload = envelope.payload_as().unwrap();
        assert_eq!(payload.round, 2);
        assert_eq!(payload.item_type, ItemKind::Spike);
        assert!(!payload.live);
    }

    #[test]
    fn encode_uses_wire_field_names() {
        let envelope = Envelope::new(MessageKind::Ping, json!({"timestamp": 5}), Some(Role::Runner));
        let value: Value = serde_json::from_str(&envelope.encode().unwrap()).unwrap();

        assert_eq!(value["type"], "ping");
        assert_eq!(value["data"]["timestamp"], 5);
        assert_eq!(value["playerRole"], "goat");
        assert!(value["timestamp"].as_u64().unwrap() > 0);
    }

    #[test]
    fn relay_messages_may_omit_role_and_data() {
        let envelope = Envelope::decode(r#"{"type":"start_game"}"#).unwrap();
        assert_eq!(envelope.sender_role, None);
        assert_eq!(envelope.payload, json!({}));
    }

    #[test]
    fn malformed_envelopes_are_rejected() {
        assert!(matches!(
            Envelope::decode("not json"),
            Err(EnvelopeError::Deserialize(_))
        ));
        assert!(matches!(
            Envelope::decode(r#"{"type":"teleport","data":{}}"#),
            Err(EnvelopeError::Deserialize(_))
        ));
        assert!(matches!(
            Envelope::decode(r#"{"type":"command","data":{"command":"more darts"}}"#),
            Err(EnvelopeError::Deserialize(_))
        ));
        assert!(matches!(
            Envelope::decode(r#"{"type":"game_event","data":[1,2]}"#),
            Err(EnvelopeError::PayloadNotObject(MessageKind::GameEvent))
        ));
    }

    #[test]
    fn local_kinds_never_cross_the_wire() {
        assert!(matches!(
            Envelope::disconnect_notice().encode(),
            Err(EnvelopeError::LocalOnly(MessageKind::Disconnect))
        ));
        assert!(matches!(
            Envelope::decode(r#"{"type":"disconnect","data":{}}"#),
            Err(EnvelopeError::LocalOnly(MessageKind::Disconnect))
        ));
    }

    #[test]
    fn game_event_without_round() {
        let envelope = Envelope::decode(
            r#"{"type":"game_event","data":{"event_type":"gameover","death_type":"spike"}}"#,
        )
        .unwrap();
        let payload: GameEventPayload = envelope.payload_as().unwrap();

        assert_eq!(payload.event_type, GameEventType::Gameover);
        assert_eq!(payload.death_type, Some(DeathCause::Spike));
        assert_eq!(payload.round, None);
    }

    #[test]
    fn peer_joined_detection() {
        let joined = SystemMessagePayload {
            message: "Player joined as prompter".into(),
            role: None,
        };
        assert!(joined.is_peer_joined());
        assert_eq!(joined.mentioned_role(), Some(Role::Commander));

        let left = SystemMessagePayload {
            message: "Player left: goat".into(),
            role: None,
        };
        assert!(!left.is_peer_joined());
    }

    #[test]
    fn sync_payload_is_tagged() {
        let value = to_payload(&GameStatePayload::Request { round: 3 });
        assert_eq!(value, json!({"sync": "request", "round": 3}));
    }
}
