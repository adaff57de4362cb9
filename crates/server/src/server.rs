use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, mpsc, watch};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

use goatshell::net::{LinkEvent, PingPayload, spawn_pump};
use goatshell::{
    ConnectionId, Envelope, LobbyManager, MessageKind, Role, net::is_valid_session_code,
};

use crate::config::RelayConfig;
use crate::events::{DisconnectReason, RelayEvent};
use crate::status;

#[derive(Debug, Clone)]
struct PeerHandle {
    frames: mpsc::UnboundedSender<String>,
    kick: Arc<Notify>,
}

impl PeerHandle {
    fn send(&self, envelope: &Envelope) {
        match envelope.encode() {
            Ok(frame) => {
                let _ = self.frames.send(frame);
            }
            Err(e) => log::warn!("Could not encode {}: {}", envelope.kind, e),
        }
    }
}

struct Shared {
    lobbies: Mutex<LobbyManager<PeerHandle>>,
    next_connection_id: AtomicU64,
    events: mpsc::UnboundedSender<RelayEvent>,
}

impl Shared {
    fn lobbies(&self) -> MutexGuard<'_, LobbyManager<PeerHandle>> {
        self.lobbies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: RelayEvent) {
        let _ = self.events.send(event);
    }

    fn can_open(&self, code: &str) -> bool {
        let lobbies = self.lobbies();
        lobbies.get(code).is_some() || lobbies.lobby_count() < lobbies.max_lobbies()
    }

    fn broadcast(&self, code: &str, envelope: &Envelope) {
        for member in self.lobbies().members(code) {
            member.handle.send(envelope);
        }
    }

    fn forward(&self, code: &str, from: Role, frame: String) {
        match self.lobbies().peer(code, from) {
            Some(peer) => {
                let _ = peer.handle.frames.send(frame);
            }
            None => log::trace!("No {} in {} to forward to", from.peer(), code),
        }
    }

    fn report_status(&self, code: &str) {
        if let Some(status) = self.lobbies().status(code) {
            self.emit(RelayEvent::Status(status));
        }
    }
}

/// Pairs one goat and one prompter per session code and relays envelopes
/// between them. Plain `GET`s on the status routes are answered on the same
/// port.
pub struct RelayServer {
    listener: TcpListener,
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
}

impl RelayServer {
    pub async fn bind(config: &RelayConfig) -> io::Result<(Self, mpsc::UnboundedReceiver<RelayEvent>)> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        let (events, events_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            lobbies: Mutex::new(LobbyManager::new(config.max_lobbies)),
            next_connection_id: AtomicU64::new(1),
            events,
        });

        Ok((
            Self {
                listener,
                shared,
                shutdown,
            },
            events_rx,
        ))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn lobby_count(&self) -> usize {
        self.shared.lobbies().lobby_count()
    }

    pub async fn run(&self) -> io::Result<()> {
        let mut stopping = self.shutdown.subscribe();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            self.shared.emit(RelayEvent::Error {
                                message: format!("accept failed: {}", e),
                            });
                            continue;
                        }
                    };
                    let shared = Arc::clone(&self.shared);
                    let stopping = self.shutdown.subscribe();
                    tokio::spawn(handle_connection(stream, addr, shared, stopping));
                }
                _ = stopping.changed() => break,
            }
        }

        Ok(())
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

pub fn parse_path(path: &str) -> Result<(String, Role), String> {
    let mut parts = path.trim_start_matches('/').split('/');

    let (Some("ws"), Some(code), Some(role), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("unexpected path {}", path));
    };

    if !is_valid_session_code(code) {
        return Err(format!("invalid session code {:?}", code));
    }
    let role = Role::from_wire(role).ok_or_else(|| format!("unknown role {:?}", role))?;

    Ok((code.to_string(), role))
}

fn reject(status: StatusCode, reason: String) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason));
    *response.status_mut() = status;
    response
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    shared: Arc<Shared>,
    mut stopping: watch::Receiver<bool>,
) {
    let path = match status::peek_get_path(&stream).await {
        Ok(path) => path,
        Err(e) => {
            shared.emit(RelayEvent::Rejected {
                addr,
                reason: e.to_string(),
            });
            return;
        }
    };
    let status_body = path.and_then(|path| {
        let body = status::route(&path, &shared.lobbies())?;
        Some((path, body))
    });
    if let Some((path, body)) = status_body {
        match status::respond(stream, &body).await {
            Ok(()) => shared.emit(RelayEvent::Served { addr, path }),
            Err(e) => shared.emit(RelayEvent::Rejected {
                addr,
                reason: e.to_string(),
            }),
        }
        return;
    }

    let mut route = None;
    let mut refusal = None;

    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        match parse_path(request.uri().path()) {
            Ok((code, _)) if !shared.can_open(&code) => {
                let reason = String::from("lobby limit reached");
                refusal = Some(reason.clone());
                Err(reject(StatusCode::SERVICE_UNAVAILABLE, reason))
            }
            Ok(parsed) => {
                route = Some(parsed);
                Ok(response)
            }
            Err(reason) => {
                refusal = Some(reason.clone());
                Err(reject(StatusCode::NOT_FOUND, reason))
            }
        }
    };

    let accepted = accept_hdr_async(stream, callback).await;
    let ws = match accepted {
        Ok(ws) => ws,
        Err(e) => {
            shared.emit(RelayEvent::Rejected {
                addr,
                reason: refusal.unwrap_or_else(|| e.to_string()),
            });
            return;
        }
    };
    let Some((code, role)) = route else {
        return;
    };

    let mut link = spawn_pump(ws);
    let connection_id: ConnectionId = shared.next_connection_id.fetch_add(1, Ordering::Relaxed);
    let kick = Arc::new(Notify::new());
    let handle = PeerHandle {
        frames: link.sender(),
        kick: Arc::clone(&kick),
    };

    let joined = shared.lobbies().join(&code, role, connection_id, handle);
    match joined {
        Ok(Some(stale)) => stale.handle.kick.notify_one(),
        Ok(None) => {}
        Err(e) => {
            shared.emit(RelayEvent::Rejected {
                addr,
                reason: e.to_string(),
            });
            return;
        }
    }

    shared.emit(RelayEvent::Joined {
        code: code.clone(),
        role,
        addr,
    });
    announce_join(&shared, &code, role);

    let reason = loop {
        tokio::select! {
            event = link.recv() => match event {
                LinkEvent::Frame(frame) => relay_frame(&shared, &code, role, frame),
                LinkEvent::Closed => break DisconnectReason::Closed,
            },
            _ = kick.notified() => break DisconnectReason::Replaced,
            _ = stopping.changed() => break DisconnectReason::Shutdown,
        }
    };

    let left = shared.lobbies().leave(&code, role, connection_id);
    if left.is_some() {
        let notice = Envelope::new(
            MessageKind::SystemMessage,
            json!({ "message": format!("Player left: {}", role) }),
            None,
        );
        shared.broadcast(&code, &notice);
    }

    shared.emit(RelayEvent::Left {
        code: code.clone(),
        role,
        reason,
    });
    shared.report_status(&code);
}

fn announce_join(shared: &Shared, code: &str, role: Role) {
    let notice = Envelope::new(
        MessageKind::SystemMessage,
        json!({ "message": format!("Player joined as {}", role), "role": role }),
        None,
    );
    shared.broadcast(code, &notice);

    let complete = shared
        .lobbies()
        .get(code)
        .is_some_and(|lobby| lobby.is_complete());
    if complete {
        shared.broadcast(code, &Envelope::new(MessageKind::StartGame, json!({}), None));
    }

    shared.report_status(code);
}

/// Pings are answered here; everything else goes to the other seat untouched.
fn relay_frame(shared: &Shared, code: &str, role: Role, frame: String) {
    let ping = Envelope::decode(&frame)
        .ok()
        .filter(|envelope| envelope.kind == MessageKind::Ping);

    let Some(ping) = ping else {
        shared.forward(code, role, frame);
        return;
    };

    let timestamp = ping
        .payload_as::<PingPayload>()
        .map(|p| p.timestamp)
        .unwrap_or(ping.sent_at_millis);
    let pong = Envelope::new(MessageKind::Pong, json!({ "timestamp": timestamp }), None);

    if let Some(member) = shared.lobbies().get(code).and_then(|lobby| lobby.member(role)) {
        member.handle.send(&pong);
    }
}
