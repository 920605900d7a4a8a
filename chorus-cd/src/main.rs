//! Coordinator (chorus-cd) - Main entry point
//!
//! Serves the reference clock, the sequential song command protocol, and
//! the "new song" broadcast from one process.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chorus_cd::Coordinator;
use chorus_common::config::Endpoints;

/// Command-line arguments for chorus-cd
#[derive(Parser, Debug)]
#[command(name = "chorus-cd")]
#[command(about = "Playback coordinator daemon for chorus")]
#[command(version)]
struct Args {
    /// Host agents use to reach this coordinator (only affects config
    /// file/default resolution; all channels bind on every interface)
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

    /// Folder holding the canonical song files
    #[arg(short, long, env = "CHORUS_ROOT_FOLDER", default_value = ".")]
    root_folder: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chorus_cd=debug".into()),
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

    info!("Starting chorus coordinator v{}", env!("CARGO_PKG_VERSION"));
    info!("Song root folder: {}", args.root_folder.display());

    let coordinator = Coordinator::bind(
        &endpoints.clock_bind(),
        &endpoints.command_bind(),
        &endpoints.broadcast_bind(),
        args.root_folder,
    )
    .await
    .context("Failed to bind coordinator channels")?;

    coordinator.run().await.context("Coordinator loop failed")
}
