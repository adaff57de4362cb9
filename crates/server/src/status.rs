use std::io;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use goatshell::LobbyManager;
use goatshell::params::CATALOG;

const PEEK_LIMIT: usize = 512;
const PEEK_ATTEMPTS: usize = 20;
const PEEK_RETRY: Duration = Duration::from_millis(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Path of a plain `GET`, read without consuming anything so a websocket
/// upgrade can still take the stream.
pub async fn peek_get_path(stream: &TcpStream) -> io::Result<Option<String>> {
    let mut buf = [0u8; PEEK_LIMIT];
    let mut seen = 0;

    for _ in 0..PEEK_ATTEMPTS {
        let n = stream.peek(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        if let Some(end) = buf[..n].windows(2).position(|pair| pair == b"\r\n") {
            let line = String::from_utf8_lossy(&buf[..end]);
            let mut parts = line.split(' ');
            return Ok(match (parts.next(), parts.next()) {
                (Some("GET"), Some(target)) => {
                    Some(target.split('?').next().unwrap_or(target).to_string())
                }
                _ => None,
            });
        }
        if n == buf.len() {
            return Ok(None);
        }
        if n == seen {
            tokio::time::sleep(PEEK_RETRY).await;
        }
        seen = n;
    }

    Ok(None)
}

pub fn route<T>(path: &str, lobbies: &LobbyManager<T>) -> Option<Value> {
    match path.trim_end_matches('/') {
        "/health" => Some(json!({ "status": "ok" })),
        "/parameters" => Some(parameters()),
        "/websocket-status" => Some(json!({
            "active_connections": lobbies.connection_count(),
            "active_lobbies": lobbies.lobby_count(),
            "lobbies": lobbies.statuses(),
        })),
        _ => None,
    }
}

fn parameters() -> Value {
    let parameters: Vec<Value> = CATALOG
        .iter()
        .map(|entry| {
            json!({
                "key": entry.key,
                "description": entry.description,
                "min": entry.min,
                "default": entry.default_value,
                "max": entry.max,
            })
        })
        .collect();
    json!({ "parameters": parameters })
}

/// Consumes the request head and answers with `body`, then closes.
pub async fn respond(stream: TcpStream, body: &Value) -> io::Result<()> {
    let answer = async {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader.read_line(&mut line).await?;
            if n == 0 || line.trim_end().is_empty() {
                break;
            }
        }

        let body = body.to_string();
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );

        let mut stream = reader.into_inner();
        stream.write_all(head.as_bytes()).await?;
        stream.write_all(body.as_bytes()).await?;
        stream.shutdown().await
    };

    tokio::time::timeout(REQUEST_TIMEOUT, answer)
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "status request timed out"))?
}

#[cfg(test)]
mod tests {
    use goatshell::Role;

    use super::*;

    #[test]
    fn test_routes() {
        let mut lobbies: LobbyManager<()> = LobbyManager::default();
        lobbies.join("ABCD", Role::Runner, 1, ()).unwrap();

        assert_eq!(route("/health", &lobbies), Some(json!({"status": "ok"})));
        assert!(route("/ws/ABCD/goat", &lobbies).is_none());

        let status = route("/websocket-status/", &lobbies).unwrap();
        assert_eq!(status["active_connections"], 1);
        assert_eq!(status["active_lobbies"], 1);
        assert_eq!(status["lobbies"][0]["code"], "ABCD");
        assert_eq!(status["lobbies"][0]["has_prompter"], false);

        let params = route("/parameters", &lobbies).unwrap();
        let entries = params["parameters"].as_array().unwrap();
        assert_eq!(entries.len(), CATALOG.len());
        let gravity = entries.iter().find(|p| p["key"] == "gravity").unwrap();
        assert_eq!(gravity["default"], 800.0);
    }
}
