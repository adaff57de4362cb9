use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use super::protocol::Role;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] Box<WsError>),
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub code: String,
    pub role: Role,
}

impl Endpoint {
    pub fn new(base_url: impl Into<String>, code: impl Into<String>, role: Role) -> Self {
        Self {
            base_url: base_url.into(),
            code: code.into(),
            role,
        }
    }

    pub fn path(&self) -> String {
        format!("/ws/{}/{}", self.code, self.role.as_wire())
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Frame(String),
    Closed,
}

/// One established connection: text frames out, frames and closure in.
/// Dropping the link closes the connection.
#[derive(Debug)]
pub struct Link {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

impl Link {
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<LinkEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }

    pub fn send(&self, frame: String) -> bool {
        self.outbound.send(frame).is_ok()
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<String> {
        self.outbound.clone()
    }

    /// Cancel-safe.
    pub async fn recv(&mut self) -> LinkEvent {
        self.inbound.recv().await.unwrap_or(LinkEvent::Closed)
    }
}

#[derive(Debug)]
pub enum Handshake {
    Accepted(Link),
    Rejected(String),
}

pub trait Connector: Clone + Send + Sync + 'static {
    fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<Handshake, TransportError>> + Send;
}

#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    handshake_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl Connector for WebSocketConnector {
    fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<Handshake, TransportError>> + Send {
        let url = endpoint.url();
        let timeout = self.handshake_timeout;

        async move {
            log::debug!("Opening {}", url);
            let attempt = tokio_tungstenite::connect_async(url);
            match tokio::time::timeout(timeout, attempt).await {
                Err(_) => Err(TransportError::HandshakeTimeout(timeout)),
                Ok(Ok((stream, _response))) => Ok(Handshake::Accepted(spawn_pump(stream))),
                Ok(Err(WsError::Http(response))) => {
                    Ok(Handshake::Rejected(format!("HTTP {}", response.status())))
                }
                Ok(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => Ok(
                    Handshake::Rejected("connection closed during handshake".to_string()),
                ),
                Ok(Err(e)) => Err(TransportError::WebSocket(Box::new(e))),
            }
        }
    }
}

pub fn spawn_pump<S>(stream: WebSocketStream<S>) -> Link
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut source) = stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let (in_tx, in_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                outgoing = out_rx.recv() => match outgoing {
                    Some(frame) => {
                        if let Err(e) = sink.send(Message::Text(frame)).await {
                            log::debug!("Websocket send failed: {}", e);
                            break;
                        }
                    }
                    None => {
                        let _ = sink.close().await;
                        break;
                    }
                },
                incoming = source.next() => match incoming {
                    Some(Ok(Message::Text(frame))) => {
                        if in_tx.send(LinkEvent::Frame(frame)).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::debug!("Websocket receive failed: {}", e);
                        break;
                    }
                },
            }
        }
        let _ = in_tx.send(LinkEvent::Closed);
    });

    Link::new(out_tx, in_rx)
}
