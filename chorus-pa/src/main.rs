//! Player Agent (chorus-pa) - Main entry point

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chorus_common::config::Endpoints;
use chorus_common::proto::{BroadcastSubscriber, CommandClient};
use chorus_common::TOPIC_NEW_SONG;
use chorus_pa::{Agent, OffsetHandle, PlayerCommand};

/// Command-line arguments for chorus-pa
#[derive(Parser, Debug)]
#[command(name = "chorus-pa")]
#[command(about = "Player agent for chorus synchronized playback")]
#[command(version)]
struct Args {
    /// Coordinator host
    #[arg(long, env = "CHORUS_HOST")]
    host: Option<String>,

    /// Clock probe port
    #[arg(long, env = "CHORUS_CLOCK_PORT")]
    clock_port: Option<u16>,

    /// Command channel port
    #[arg(long, env = "CHORUS_COMMAND_PORT")]
    command_port: Option<u16>,

    /// Broadcast channel port
    #[arg(long, env = "CHORUS_BROADCAST_PORT")]
    broadcast_port: Option<u16>,

    /// Folder for this agent's cached song files
    #[arg(long, env = "CHORUS_CACHE_DIR", default_value = ".")]
    cache_dir: PathBuf,

    /// Playback executable launched per song
    #[arg(long, env = "CHORUS_PLAYER", default_value = "./player")]
    player: PathBuf,

    /// Extra arguments forwarded verbatim to the playback executable
    #[arg(last = true)]
    player_args: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chorus_pa=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let endpoints = Endpoints::resolve(
        args.host,
        args.clock_port,
        args.command_port,
        args.broadcast_port,
    );

    info!("Starting chorus player agent v{}", env!("CARGO_PKG_VERSION"));
    info!("Coordinator: {}", endpoints.command_addr());

    // Independent background loop; the agent only reads its estimate. If
    // the clock channel fails the estimator dies and the agent carries on
    // with its last estimate.
    let offset = OffsetHandle::new();
    {
        let clock_addr = endpoints.clock_addr();
        let offset = offset.clone();
        tokio::spawn(async move {
            if let Err(e) = chorus_pa::estimator::run(clock_addr, offset).await {
                error!("clock estimator stopped: {}", e);
            }
        });
    }

    let client = CommandClient::connect(&endpoints.command_addr())
        .await
        .context("Failed to connect to command channel")?;
    let subscriber = BroadcastSubscriber::connect(&endpoints.broadcast_addr(), TOPIC_NEW_SONG)
        .await
        .context("Failed to subscribe to broadcast channel")?;

    let player = PlayerCommand::new(args.player, args.player_args);
    let agent = Agent::new(client, offset, player, args.cache_dir);

    agent.run(subscriber).await.context("Agent loop failed")
}
