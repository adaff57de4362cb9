use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use goatshell::net::{
    ConnectionState, Envelope, MessageKind, RemoteEnd, Role, ScriptedHandshake,
    SimulatedConnector,
};
use goatshell::params::ParameterUpdate;
use goatshell::round::{Outcome, Phase};
use goatshell::simulation::{
    GameStateUpdate, ItemKind, Placement, PlayerSnapshot, SimulationCommand, SimulationEvent, Vec2,
};
use goatshell::{GameSession, SessionConfig, SessionEnd};

type TestSession = GameSession<SimulatedConnector, Vec<SimulationCommand>>;

async fn joined(role: Role) -> (SimulatedConnector, TestSession, RemoteEnd) {
    let connector = SimulatedConnector::new();
    let mut session = GameSession::new(
        connector.clone(),
        Vec::<SimulationCommand>::new(),
        role,
        SessionConfig::default(),
    );
    assert!(session.start("ABCD").await.unwrap());
    let remote = connector.take_remote().unwrap();
    (connector, session, remote)
}

fn counter(session: &mut TestSession, kind: MessageKind) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    session.router_mut().subscribe(kind, move |_: &Envelope| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    count
}

/// Runs the session until it has been idle for `millis` of virtual time.
async fn run_for(session: &mut TestSession, events: &mut mpsc::Receiver<SimulationEvent>, millis: u64) {
    let outcome = tokio::time::timeout(Duration::from_millis(millis), session.run(events)).await;
    assert!(outcome.is_err(), "session ended early: {:?}", outcome);
}

fn kinds(remote: &mut RemoteEnd) -> Vec<MessageKind> {
    remote.drain().into_iter().map(|e| e.kind).collect()
}

fn saw(session: &TestSession, update: GameStateUpdate) -> bool {
    session
        .simulation()
        .contains(&SimulationCommand::GameStateUpdate(update))
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_fires_once_after_reconnects_exhausted() {
    let (connector, mut session, remote) = joined(Role::Commander).await;
    let disconnects = counter(&mut session, MessageKind::Disconnect);
    connector.script(vec![ScriptedHandshake::Fail; 5]);

    remote.close();
    let (_tx, mut rx) = mpsc::channel(8);
    let end = session.run(&mut rx).await;

    assert_eq!(end, SessionEnd::ConnectionFailed);
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(connector.attempts(), 6);
    assert!(saw(&session, GameStateUpdate::ConnectionLost));
    assert!(saw(&session, GameStateUpdate::ConnectionFailed));

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.attempts(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_peer_joined_notice_reaches_both_subscribers() {
    let (_connector, mut session, remote) = joined(Role::Commander).await;
    let system = counter(&mut session, MessageKind::SystemMessage);
    let joined = counter(&mut session, MessageKind::PeerJoined);

    remote.push(&Envelope::new(
        MessageKind::SystemMessage,
        json!({"message": "Player joined as goat", "role": "goat"}),
        None,
    ));
    let (_tx, mut rx) = mpsc::channel(8);
    run_for(&mut session, &mut rx, 50).await;

    assert_eq!(system.load(Ordering::SeqCst), 1);
    assert_eq!(joined.load(Ordering::SeqCst), 1);
    assert!(saw(&session, GameStateUpdate::PeerJoined(Some(Role::Runner))));
}

#[tokio::test(start_paused = true)]
async fn test_full_round_against_remote_commander() {
    let (_connector, mut session, mut remote) = joined(Role::Runner).await;
    let (tx, mut rx) = mpsc::channel(8);

    tx.send(SimulationEvent::ItemSelected(ItemKind::Platform)).await.unwrap();
    tx.send(SimulationEvent::ItemPlaced(Placement::new(ItemKind::Platform, 40.0, 300.0)))
        .await
        .unwrap();
    run_for(&mut session, &mut rx, 10).await;

    assert_eq!(kinds(&mut remote), vec![MessageKind::ItemPlaced]);
    assert_eq!(session.round().phase, Phase::AwaitingPeerPlacement);

    remote.push(&Envelope::new(
        MessageKind::ItemPlaced,
        json!({"round": 1, "item_type": "spike", "x": 200.0, "y": 310.0}),
        Some(Role::Commander),
    ));
    run_for(&mut session, &mut rx, 10).await;

    assert_eq!(kinds(&mut remote), vec![MessageKind::CountdownStarted]);
    assert_eq!(session.round().phase, Phase::CountdownRunning { remaining: 3 });

    run_for(&mut session, &mut rx, 3_500).await;
    assert_eq!(session.round().phase, Phase::Playing);
    for remaining in [3, 2, 1, 0] {
        assert!(saw(&session, GameStateUpdate::Countdown { remaining }));
    }

    tx.send(SimulationEvent::PlayerMoved(PlayerSnapshot {
        position: Vec2 { x: 120.0, y: 300.0 },
        velocity: Vec2 { x: 5.0, y: 0.0 },
        is_on_ground: true,
    }))
    .await
    .unwrap();
    tx.send(SimulationEvent::Win).await.unwrap();
    run_for(&mut session, &mut rx, 10).await;

    let sent = remote.drain();
    assert_eq!(sent[0].kind, MessageKind::PlayerState);
    assert_eq!(sent[0].payload["isOnGround"], true);
    assert_eq!(sent[1].kind, MessageKind::GameEvent);
    assert_eq!(sent[1].payload, json!({"event_type": "win", "round": 1}));
    assert_eq!(session.round().phase, Phase::Over(Outcome::Win));
}

#[tokio::test(start_paused = true)]
async fn test_commander_parameter_command_reaches_runner() {
    let (_c1, mut commander, mut commander_remote) = joined(Role::Commander).await;
    let (_c2, mut runner, runner_remote) = joined(Role::Runner).await;
    let (tx, mut rx) = mpsc::channel(8);
    let (_runner_tx, mut runner_rx) = mpsc::channel(8);

    tx.send(SimulationEvent::ParameterCommand {
        text: "make it rain darts".into(),
        updates: vec![
            ParameterUpdate::normalized("dart_frequency", -1.0),
            ParameterUpdate::actual("gravity", 1200.0),
        ],
    })
    .await
    .unwrap();
    run_for(&mut commander, &mut rx, 10).await;
    assert_eq!(commander.params().value("dart_frequency"), Some(1500.0));

    let result = commander_remote.next().await.unwrap();
    assert_eq!(result.kind, MessageKind::CommandResult);
    assert_eq!(result.payload["success"], true);

    runner_remote.push(&result);
    run_for(&mut runner, &mut runner_rx, 10).await;

    assert_eq!(runner.params().value("dart_frequency"), Some(1500.0));
    assert_eq!(runner.params().value("gravity"), Some(1200.0));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_requests_round_snapshot() {
    let (connector, mut session, remote) = joined(Role::Commander).await;
    let (tx, mut rx) = mpsc::channel(8);

    tx.send(SimulationEvent::ItemSelected(ItemKind::Spike)).await.unwrap();
    tx.send(SimulationEvent::ItemPlaced(Placement::new(ItemKind::Spike, 1.0, 2.0)))
        .await
        .unwrap();
    run_for(&mut session, &mut rx, 10).await;
    remote.close();

    run_for(&mut session, &mut rx, 2_100).await;
    assert!(saw(&session, GameStateUpdate::Reconnected));

    let mut fresh = connector.take_remote().unwrap();
    let sent = fresh.drain();
    assert_eq!(sent[0].kind, MessageKind::GameState);
    assert_eq!(sent[0].payload, json!({"sync": "request", "round": 1}));
    assert_eq!(sent[1].kind, MessageKind::ItemPlaced);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_completes_under_steady_local_traffic() {
    let (connector, mut session, remote) = joined(Role::Runner).await;
    connector.set_handshake_delay(Duration::from_millis(200));
    let (tx, mut rx) = mpsc::channel(8);

    let mover = tokio::spawn(async move {
        for _ in 0..60 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if tx.send(SimulationEvent::PlayerMoved(PlayerSnapshot::default())).await.is_err() {
                break;
            }
        }
    });

    remote.close();
    run_for(&mut session, &mut rx, 3_000).await;
    mover.abort();

    assert!(saw(&session, GameStateUpdate::Reconnected));
    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(connector.attempts(), 2);

    let mut fresh = connector.take_remote().unwrap();
    let sent = fresh.drain();
    assert_eq!(sent[0].payload, json!({"sync": "request", "round": 1}));
    assert!(sent.iter().any(|e| e.kind == MessageKind::PlayerState));
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_ping_and_rtt() {
    let (_connector, mut session, mut remote) = joined(Role::Runner).await;
    let (_tx, mut rx) = mpsc::channel(8);

    run_for(&mut session, &mut rx, 15_500).await;
    let ping = remote.next().await.unwrap();
    assert_eq!(ping.kind, MessageKind::Ping);

    remote.push(&Envelope::new(MessageKind::Pong, ping.payload.clone(), None));
    run_for(&mut session, &mut rx, 10).await;
    assert!(session.stats().last_rtt_ms.is_some());
}

#[tokio::test]
async fn test_single_player_needs_no_relay() {
    let connector = SimulatedConnector::new();
    let config = SessionConfig {
        round: goatshell::RoundConfig {
            mode: goatshell::GameMode::SinglePlayer,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut session = GameSession::new(
        connector.clone(),
        Vec::<SimulationCommand>::new(),
        Role::Runner,
        config,
    );

    assert!(session.start("unused").await.unwrap());
    assert_eq!(connector.attempts(), 0);

    let (tx, mut rx) = mpsc::channel(8);
    tx.send(SimulationEvent::ItemSelected(ItemKind::Shield)).await.unwrap();
    tx.send(SimulationEvent::ItemPlaced(Placement::new(ItemKind::Shield, 0.0, 0.0)))
        .await
        .unwrap();
    drop(tx);

    assert_eq!(session.run(&mut rx).await, SessionEnd::LocalClosed);
    assert!(matches!(
        session.round().phase,
        Phase::CountdownRunning { remaining: 3 }
    ));
}
