//! Publisher (chorus-pub) - one-shot upload CLI
//!
//! Reads a local audio file, names it by content hash (so republishing the
//! same bytes overwrites the same canonical file), and issues the `play`
//! command to the coordinator.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use sha2::{Digest, Sha256};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chorus_common::config::Endpoints;
use chorus_common::proto::{Command, CommandClient, Reply};

/// Command-line arguments for chorus-pub
#[derive(Parser, Debug)]
#[command(name = "chorus-pub")]
#[command(about = "Publish a song to the chorus coordinator")]
#[command(version)]
struct Args {
    /// Audio file to publish
    file: PathBuf,

    /// Coordinator host
    #[arg(long, env = "CHORUS_HOST")]
    host: Option<String>,

    /// Command channel port
    #[arg(long, env = "CHORUS_COMMAND_PORT")]
    command_port: Option<u16>,
}

/// Content-addressed song name: first 10 hex digits of the SHA-256 of the
/// bytes, keeping the original extension.
fn song_name(path: &Path, data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    match path.extension() {
        Some(ext) => format!("{}.{}", &hex[..10], ext.to_string_lossy()),
        None => hex[..10].to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chorus_pub=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let endpoints = Endpoints::resolve(args.host, None, args.command_port, None);

    let data = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let name = song_name(&args.file, &data);

    let mut client = CommandClient::connect(&endpoints.command_addr())
        .await
        .context("Failed to connect to command channel")?;
    let reply = client
        .request(&Command::Play { name: name.clone(), data })
        .await
        .context("Publish failed")?;

    match reply {
        Reply::Ok => {
            println!("ok: published as {}", name);
            Ok(())
        }
        other => anyhow::bail!("coordinator answered {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_song_name_is_content_addressed_with_extension() {
        let name = song_name(Path::new("tune.mp3"), b"hello");
        // sha256("hello") = 2cf24dba5fb0a30e...
        assert_eq!(name, "2cf24dba5f.mp3");
    }

    #[test]
    fn test_song_name_without_extension() {
        let name = song_name(Path::new("tune"), b"hello");
        assert_eq!(name, "2cf24dba5f");
    }

    #[test]
    fn test_same_bytes_same_name_regardless_of_source_path() {
        let a = song_name(Path::new("a/original.wav"), b"bytes");
        let b = song_name(Path::new("b/copy.wav"), b"bytes");
        assert_eq!(a, b);
    }
}
