use std::net::SocketAddr;

use goatshell::{LobbyStatus, Role};

#[derive(Debug, Clone)]
pub enum RelayEvent {
    Joined {
        code: String,
        role: Role,
        addr: SocketAddr,
    },
    Left {
        code: String,
        role: Role,
        reason: DisconnectReason,
    },
    Rejected {
        addr: SocketAddr,
        reason: String,
    },
    Served {
        addr: SocketAddr,
        path: String,
    },
    Status(LobbyStatus),
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Closed,
    /// A newer connection took the same role.
    Replaced,
    Shutdown,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Closed => "disconnected",
            DisconnectReason::Replaced => "replaced by a new connection",
            DisconnectReason::Shutdown => "dropped at shutdown",
        }
    }
}
