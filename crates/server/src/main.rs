mod config;
mod events;
mod server;
mod status;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;

use config::RelayConfig;
use events::RelayEvent;
use server::RelayServer;

#[derive(Parser)]
#[command(name = "goatshell-relay")]
#[command(about = "Session relay for Goat In The Shell")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = goatshell::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = 256, help = "Maximum concurrent session codes")]
    max_lobbies: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = RelayConfig {
        bind: args.bind,
        port: args.port,
        max_lobbies: args.max_lobbies,
    };

    let (server, events) = RelayServer::bind(&config).await?;
    log::info!("Relay listening on {}", server.local_addr()?);
    tokio::spawn(log_events(events));

    tokio::select! {
        result = server.run() => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            log::info!("Relay shutting down");
            server.shutdown();
        }
    }

    Ok(())
}

async fn log_events(mut events: mpsc::UnboundedReceiver<RelayEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            RelayEvent::Joined { code, role, addr } => {
                log::info!("{} joined {} as {}", addr, code, role);
            }
            RelayEvent::Left { code, role, reason } => {
                log::info!("{} in {} {}", role, code, reason.as_str());
            }
            RelayEvent::Rejected { addr, reason } => {
                log::warn!("Rejected {}: {}", addr, reason);
            }
            RelayEvent::Served { addr, path } => log::debug!("Served {} to {}", path, addr),
            RelayEvent::Status(status) => {
                log::info!(
                    "Lobby {}: goat={} prompter={} open {}s",
                    status.code,
                    status.has_goat,
                    status.has_prompter,
                    status.open_secs
                );
            }
            RelayEvent::Error { message } => log::error!("{}", message),
        }
    }
}
