use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use goatshell::net::{
    ConnectionConfig, ConnectionError, ConnectionEvent, ConnectionManager, ConnectionState,
    Envelope, FrameLoss, MessageKind, Role, ScriptedHandshake, SimulatedConnector,
};

fn manager() -> (SimulatedConnector, ConnectionManager<SimulatedConnector>) {
    let connector = SimulatedConnector::new();
    let manager = ConnectionManager::new(connector.clone(), ConnectionConfig::default());
    (connector, manager)
}

fn gaps(times: &[Instant]) -> Vec<u64> {
    times
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).as_millis() as u64)
        .collect()
}

#[tokio::test]
async fn test_connect_uses_session_path() {
    let (connector, mut manager) = manager();

    assert!(manager.connect("ABCD", Role::Commander).await.unwrap());
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(manager.role(), Some(Role::Commander));

    let endpoint = connector.last_endpoint().unwrap();
    assert_eq!(endpoint.path(), "/ws/ABCD/prompter");
    assert_eq!(endpoint.url(), "ws://127.0.0.1:8000/ws/ABCD/prompter");
}

#[tokio::test]
async fn test_rejected_handshake_resolves_false() {
    let (connector, mut manager) = manager();
    connector.script([ScriptedHandshake::Reject("HTTP 403".into())]);

    assert!(!manager.connect("ABCD", Role::Runner).await.unwrap());
    assert!(!manager.has_session());
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(manager.next_event().await, None);
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn test_transport_failure_is_an_error() {
    let (connector, mut manager) = manager();
    connector.script([ScriptedHandshake::Fail]);

    let result = manager.connect("ABCD", Role::Runner).await;
    assert!(matches!(result, Err(ConnectionError::Transport(_))));
    assert!(!manager.has_session());
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn test_invalid_session_code() {
    let (connector, mut manager) = manager();

    let result = manager.connect("no/slashes", Role::Runner).await;
    assert!(matches!(result, Err(ConnectionError::InvalidSessionCode(_))));
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test]
async fn test_send_is_noop_while_disconnected() {
    let (_connector, mut manager) = manager();

    assert!(!manager.send(MessageKind::Ping, json!({"timestamp": 1})));
    assert_eq!(manager.stats().envelopes_discarded, 1);
    assert_eq!(manager.stats().envelopes_sent, 0);
}

#[tokio::test]
async fn test_send_stamps_role_and_timestamp() {
    let (connector, mut manager) = manager();
    manager.connect("ABCD", Role::Runner).await.unwrap();
    let mut remote = connector.take_remote().unwrap();

    assert!(manager.send(MessageKind::ItemPlaced, json!({"round": 1})));

    let envelope = remote.next().await.unwrap();
    assert_eq!(envelope.kind, MessageKind::ItemPlaced);
    assert_eq!(envelope.sender_role, Some(Role::Runner));
    assert!(envelope.sent_at_millis > 0);
    assert_eq!(manager.stats().envelopes_sent, 1);
}

#[tokio::test]
async fn test_lost_frames_are_not_retried() {
    let (connector, mut manager) = manager();
    connector.set_loss(FrameLoss::every(2));
    manager.connect("ABCD", Role::Runner).await.unwrap();
    let mut remote = connector.take_remote().unwrap();

    for round in 1..=4 {
        assert!(manager.send(MessageKind::ItemPlaced, json!({"round": round})));
    }

    let rounds: Vec<_> = remote.drain().iter().map(|e| e.payload["round"].clone()).collect();
    assert_eq!(rounds, vec![json!(1), json!(3)]);
    assert_eq!(manager.stats().envelopes_sent, 4);
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let (connector, mut manager) = manager();
    manager.connect("ABCD", Role::Commander).await.unwrap();
    let remote = connector.take_remote().unwrap();

    remote.push_raw("{not json");
    remote.push_raw(r#"{"type":"game_event","data":"oops"}"#);
    remote.push(&Envelope::new(
        MessageKind::GameEvent,
        json!({"event_type": "win"}),
        Some(Role::Runner),
    ));

    match manager.next_event().await {
        Some(ConnectionEvent::Inbound(envelope)) => {
            assert_eq!(envelope.kind, MessageKind::GameEvent);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(manager.stats().envelopes_malformed, 2);
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (_connector, mut manager) = manager();
    manager.connect("ABCD", Role::Runner).await.unwrap();

    manager.disconnect();
    manager.disconnect();

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(manager.next_event().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_schedule_then_abandon() {
    let (connector, mut manager) = manager();
    manager.connect("ABCD", Role::Runner).await.unwrap();
    connector.script(vec![ScriptedHandshake::Fail; 5]);

    connector.take_remote().unwrap().close();
    assert_eq!(manager.next_event().await, Some(ConnectionEvent::Lost));
    assert_eq!(manager.state(), ConnectionState::Reconnecting);
    let lost_at = Instant::now();

    assert_eq!(manager.next_event().await, Some(ConnectionEvent::Abandoned));
    assert_eq!(manager.state(), ConnectionState::PermanentlyFailed);
    assert!(!manager.has_session());

    let mut times = vec![lost_at];
    times.extend(connector.attempt_times().into_iter().skip(1));
    assert_eq!(gaps(&times), vec![2000, 4000, 8000, 16000, 30000]);

    assert_eq!(manager.next_event().await, None);
    assert_eq!(connector.attempts(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_rejections_count_toward_backoff() {
    let (connector, mut manager) = manager();
    manager.connect("ABCD", Role::Commander).await.unwrap();
    connector.script([
        ScriptedHandshake::Reject("HTTP 503".into()),
        ScriptedHandshake::Accept,
    ]);

    connector.take_remote().unwrap().close();
    assert_eq!(manager.next_event().await, Some(ConnectionEvent::Lost));
    let lost_at = Instant::now();

    assert_eq!(manager.next_event().await, Some(ConnectionEvent::Reconnected));
    assert_eq!(lost_at.elapsed().as_millis(), 6000);
    assert_eq!(manager.session().unwrap().reconnect_attempt, 0);
    assert_eq!(manager.stats().reconnects, 1);

    // A fresh drop starts the schedule over.
    connector.take_remote().unwrap().close();
    assert_eq!(manager.next_event().await, Some(ConnectionEvent::Lost));
    let lost_again = Instant::now();
    assert_eq!(manager.next_event().await, Some(ConnectionEvent::Reconnected));
    assert_eq!(lost_again.elapsed().as_millis(), 2000);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_wait_keeps_deadline() {
    let (connector, mut manager) = manager();
    manager.connect("ABCD", Role::Runner).await.unwrap();

    connector.take_remote().unwrap().close();
    assert_eq!(manager.next_event().await, Some(ConnectionEvent::Lost));
    let lost_at = Instant::now();

    let interrupted =
        tokio::time::timeout(Duration::from_millis(500), manager.next_event()).await;
    assert!(interrupted.is_err());

    assert_eq!(manager.next_event().await, Some(ConnectionEvent::Reconnected));
    assert_eq!(lost_at.elapsed().as_millis(), 2000);
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_handshake_in_flight_survives_interruptions() {
    let (connector, mut manager) = manager();
    manager.connect("ABCD", Role::Commander).await.unwrap();
    connector.set_handshake_delay(Duration::from_millis(200));

    connector.take_remote().unwrap().close();
    assert_eq!(manager.next_event().await, Some(ConnectionEvent::Lost));
    let lost_at = Instant::now();

    // Interrupt every 50 ms, the way a busy session loop would.
    let event = loop {
        match tokio::time::timeout(Duration::from_millis(50), manager.next_event()).await {
            Ok(event) => break event,
            Err(_) => continue,
        }
    };

    assert_eq!(event, Some(ConnectionEvent::Reconnected));
    assert_eq!(lost_at.elapsed().as_millis(), 2200);
    assert_eq!(connector.attempts(), 2);
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_abandons_pending_handshake() {
    let (connector, mut manager) = manager();
    manager.connect("ABCD", Role::Runner).await.unwrap();
    connector.set_handshake_delay(Duration::from_millis(200));

    connector.take_remote().unwrap().close();
    assert_eq!(manager.next_event().await, Some(ConnectionEvent::Lost));

    let interrupted = tokio::time::timeout(Duration::from_millis(2100), manager.next_event()).await;
    assert!(interrupted.is_err());
    assert_eq!(connector.attempts(), 2);

    manager.disconnect();
    assert_eq!(manager.next_event().await, None);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}
