use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;

use crate::net::{Role, is_valid_session_code};

pub type ConnectionId = u64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("invalid session code {0:?}")]
    InvalidCode(String),
    #[error("lobby limit of {0} reached")]
    Full(usize),
}

#[derive(Debug, Clone)]
pub struct Member<T> {
    pub connection_id: ConnectionId,
    pub role: Role,
    pub handle: T,
}

#[derive(Debug)]
pub struct Lobby<T> {
    pub code: String,
    pub created_at: Instant,
    goat: Option<Member<T>>,
    prompter: Option<Member<T>>,
}

impl<T> Lobby<T> {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            created_at: Instant::now(),
            goat: None,
            prompter: None,
        }
    }

    fn seat(&self, role: Role) -> &Option<Member<T>> {
        match role {
            Role::Runner => &self.goat,
            Role::Commander => &self.prompter,
        }
    }

    fn seat_mut(&mut self, role: Role) -> &mut Option<Member<T>> {
        match role {
            Role::Runner => &mut self.goat,
            Role::Commander => &mut self.prompter,
        }
    }

    pub fn member(&self, role: Role) -> Option<&Member<T>> {
        self.seat(role).as_ref()
    }

    pub fn members(&self) -> impl Iterator<Item = &Member<T>> {
        self.goat.iter().chain(self.prompter.iter())
    }

    pub fn is_complete(&self) -> bool {
        self.goat.is_some() && self.prompter.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.goat.is_none() && self.prompter.is_none()
    }

    pub fn connections(&self) -> usize {
        self.members().count()
    }

    pub fn status(&self) -> LobbyStatus {
        LobbyStatus {
            code: self.code.clone(),
            connections: self.connections(),
            has_goat: self.goat.is_some(),
            has_prompter: self.prompter.is_some(),
            open_secs: self.created_at.elapsed().as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LobbyStatus {
    pub code: String,
    pub connections: usize,
    pub has_goat: bool,
    pub has_prompter: bool,
    pub open_secs: u64,
}

#[derive(Debug)]
pub struct LobbyManager<T> {
    lobbies: HashMap<String, Lobby<T>>,
    max_lobbies: usize,
}

impl<T> Default for LobbyManager<T> {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

impl<T> LobbyManager<T> {
    pub fn new(max_lobbies: usize) -> Self {
        Self {
            lobbies: HashMap::new(),
            max_lobbies,
        }
    }

    /// Seats a connection. A connection already holding the same role is
    /// treated as stale and returned so the caller can close it.
    pub fn join(
        &mut self,
        code: &str,
        role: Role,
        connection_id: ConnectionId,
        handle: T,
    ) -> Result<Option<Member<T>>, LobbyError> {
        if !is_valid_session_code(code) {
            return Err(LobbyError::InvalidCode(code.to_string()));
        }
        if !self.lobbies.contains_key(code) && self.lobbies.len() >= self.max_lobbies {
            return Err(LobbyError::Full(self.max_lobbies));
        }

        let lobby = self
            .lobbies
            .entry(code.to_string())
            .or_insert_with(|| Lobby::new(code));

        Ok(lobby.seat_mut(role).replace(Member {
            connection_id,
            role,
            handle,
        }))
    }

    /// Frees the seat only if `connection_id` still holds it. Empty lobbies
    /// are removed.
    pub fn leave(&mut self, code: &str, role: Role, connection_id: ConnectionId) -> Option<Member<T>> {
        let lobby = self.lobbies.get_mut(code)?;
        let seat = lobby.seat_mut(role);

        if seat.as_ref()?.connection_id != connection_id {
            return None;
        }

        let member = seat.take();
        if lobby.is_empty() {
            self.lobbies.remove(code);
        }
        member
    }

    pub fn get(&self, code: &str) -> Option<&Lobby<T>> {
        self.lobbies.get(code)
    }

    pub fn peer(&self, code: &str, role: Role) -> Option<&Member<T>> {
        self.lobbies.get(code)?.member(role.peer())
    }

    pub fn members(&self, code: &str) -> Vec<&Member<T>> {
        self.lobbies
            .get(code)
            .map(|lobby| lobby.members().collect())
            .unwrap_or_default()
    }

    pub fn status(&self, code: &str) -> Option<LobbyStatus> {
        self.lobbies.get(code).map(Lobby::status)
    }

    pub fn statuses(&self) -> Vec<LobbyStatus> {
        let mut statuses: Vec<LobbyStatus> = self.lobbies.values().map(Lobby::status).collect();
        statuses.sort_by(|a, b| a.code.cmp(&b.code));
        statuses
    }

    pub fn lobby_count(&self) -> usize {
        self.lobbies.len()
    }

    pub fn connection_count(&self) -> usize {
        self.lobbies.values().map(Lobby::connections).sum()
    }

    pub fn max_lobbies(&self) -> usize {
        self.max_lobbies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lobby_lifecycle() {
        let mut manager: LobbyManager<&str> = LobbyManager::default();

        assert!(manager.join("ABCD", Role::Runner, 1, "goat").unwrap().is_none());
        assert!(!manager.get("ABCD").unwrap().is_complete());
        assert!(manager.join("ABCD", Role::Commander, 2, "prompter").unwrap().is_none());

        let lobby = manager.get("ABCD").unwrap();
        assert!(lobby.is_complete());
        assert_eq!(manager.peer("ABCD", Role::Runner).unwrap().handle, "prompter");
        assert_eq!(manager.members("ABCD").len(), 2);

        assert!(manager.leave("ABCD", Role::Runner, 1).is_some());
        let status = manager.status("ABCD").unwrap();
        assert_eq!(status.code, "ABCD");
        assert_eq!(status.connections, 1);
        assert!(!status.has_goat);
        assert!(status.has_prompter);

        manager.leave("ABCD", Role::Commander, 2);
        assert_eq!(manager.lobby_count(), 0);
    }

    #[test]
    fn test_statuses_cover_every_lobby() {
        let mut manager: LobbyManager<()> = LobbyManager::default();
        manager.join("beta", Role::Runner, 1, ()).unwrap();
        manager.join("alpha", Role::Runner, 2, ()).unwrap();
        manager.join("alpha", Role::Commander, 3, ()).unwrap();

        let statuses = manager.statuses();
        let codes: Vec<&str> = statuses.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, vec!["alpha", "beta"]);
        assert_eq!(statuses[0].connections, 2);
        assert!(!statuses[1].has_prompter);
        assert_eq!(manager.connection_count(), 3);

        let json = serde_json::to_value(&statuses[1]).unwrap();
        assert_eq!(json["has_goat"], true);
        assert_eq!(json["open_secs"], 0);
    }

    #[test]
    fn test_same_role_replaces_stale_connection() {
        let mut manager: LobbyManager<u8> = LobbyManager::default();

        manager.join("ABCD", Role::Runner, 1, 10).unwrap();
        let stale = manager.join("ABCD", Role::Runner, 2, 20).unwrap().unwrap();
        assert_eq!(stale.connection_id, 1);

        // The stale connection's late leave must not evict its replacement.
        assert!(manager.leave("ABCD", Role::Runner, 1).is_none());
        assert_eq!(manager.get("ABCD").unwrap().member(Role::Runner).unwrap().handle, 20);
    }

    #[test]
    fn test_lobby_limit_and_codes() {
        let mut manager: LobbyManager<()> = LobbyManager::new(1);

        assert_eq!(
            manager.join("bad code", Role::Runner, 1, ()).unwrap_err(),
            LobbyError::InvalidCode("bad code".into())
        );
        manager.join("one", Role::Runner, 1, ()).unwrap();
        assert_eq!(manager.join("two", Role::Runner, 2, ()).unwrap_err(), LobbyError::Full(1));
        assert!(manager.join("one", Role::Commander, 3, ()).is_ok());
    }
}
