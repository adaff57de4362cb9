mod bot;
mod config;

use anyhow::{Result, bail};
use clap::Parser;
use tokio::sync::mpsc;

use goatshell::{
    ConnectionConfig, GameMode, GameSession, Role, RoundConfig, SessionConfig, SessionEnd,
    WebSocketConnector,
};

use bot::BotSimulation;
use config::BotConfig;

#[derive(Parser)]
#[command(name = "goatshell-peer")]
#[command(about = "Headless Goat In The Shell peer")]
struct Args {
    #[arg(short, long, default_value_t = format!("ws://127.0.0.1:{}", goatshell::DEFAULT_PORT))]
    url: String,

    #[arg(short, long, default_value = "GOAT", help = "Session code shared with the other player")]
    code: String,

    #[arg(short, long, default_value = "goat", help = "goat or prompter")]
    role: Role,

    #[arg(long, help = "Play alone without a relay")]
    single: bool,

    #[arg(long, default_value_t = 3)]
    rounds: u32,

    #[arg(long, default_value_t = 500, help = "Delay before each bot decision in ms")]
    think_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let (role, mode) = if args.single {
        (Role::Runner, GameMode::SinglePlayer)
    } else {
        (args.role, GameMode::Multiplayer)
    };

    let config = SessionConfig {
        connection: ConnectionConfig {
            base_url: args.url,
            ..Default::default()
        },
        round: RoundConfig {
            mode,
            ..Default::default()
        },
        ..Default::default()
    };
    let bot_config = BotConfig {
        rounds: args.rounds,
        think_time_ms: args.think_ms,
        ..Default::default()
    };

    let (events_tx, mut events) = mpsc::channel(64);
    let bot = BotSimulation::new(role, bot_config, events_tx);
    let connector = WebSocketConnector::new(config.connection.handshake_timeout());
    let mut session = GameSession::new(connector, bot, role, config);

    if !session.start(&args.code).await? {
        bail!("relay refused session {} as {}", args.code, role);
    }
    log::info!("Joined {} as {}", args.code, role);

    let end = session.run(&mut events).await;
    session.shutdown();
    let stats = session.stats();
    log::info!(
        "Finished {} round(s): {} sent, {} received, {} reconnect(s)",
        session.simulation().rounds_finished(),
        stats.envelopes_sent,
        stats.envelopes_received,
        stats.reconnects
    );

    match end {
        SessionEnd::LocalClosed => Ok(()),
        SessionEnd::ConnectionFailed => bail!("lost the relay after exhausting reconnects"),
    }
}
