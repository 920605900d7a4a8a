//! Agent main loop
//!
//! One sequential control flow: query the current song, fetch and cache its
//! file, translate the reference-clock start instant into the local
//! timeline, replace the playback child, then block for the next broadcast.
//! The clock estimator runs independently; the loop only reads its estimate.
//!
//! Transport errors on the command or broadcast channel are fatal to the
//! agent by design; a sentinel answer or a failed fetch merely skips the
//! round, leaving any running playback untouched.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use chorus_common::proto::{BroadcastSubscriber, Command, CommandClient, Reply};
use chorus_common::Result;

use crate::estimator::OffsetHandle;
use crate::player::{Playback, PlayerCommand};

/// What one scheduling round did, mostly for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Sentinel answer: nothing was ever published.
    NoSong,
    /// The file fetch failed; the previous playback keeps running.
    Skipped,
    /// A playback child was (re)launched with this local start instant.
    Scheduled { local_start_us: i64 },
}

pub struct Agent {
    client: CommandClient,
    offset: OffsetHandle,
    player: PlayerCommand,
    cache_dir: PathBuf,
    /// Process-identity prefix for cached files, preventing collisions
    /// between agents sharing a filesystem.
    cache_prefix: String,
    playback: Option<Playback>,
}

impl Agent {
    pub fn new(
        client: CommandClient,
        offset: OffsetHandle,
        player: PlayerCommand,
        cache_dir: PathBuf,
    ) -> Self {
        Self {
            client,
            offset,
            player,
            cache_dir,
            cache_prefix: format!("{}-", std::process::id()),
            playback: None,
        }
    }

    /// Where this agent caches a fetched song file.
    pub fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}{}", self.cache_prefix, name))
    }

    pub fn playback(&self) -> Option<&Playback> {
        self.playback.as_ref()
    }

    /// Run one scheduling round (steps 1-6 of the loop). Errors are
    /// transport or local-storage faults and are fatal to the agent.
    pub async fn run_round(&mut self) -> Result<RoundOutcome> {
        let (name, start_us) = match self.client.request(&Command::GetSong).await? {
            Reply::CurrentSong { name, start_us } => (name, start_us),
            other => {
                warn!("get song answered {:?}, skipping round", other);
                return Ok(RoundOutcome::Skipped);
            }
        };

        if name.is_empty() {
            info!("no song scheduled");
            return Ok(RoundOutcome::NoSong);
        }

        let data = match self
            .client
            .request(&Command::GetFile { name: name.clone() })
            .await?
        {
            Reply::File { data } => data,
            other => {
                warn!("get file {} answered {:?}, skipping round", name, other);
                return Ok(RoundOutcome::Skipped);
            }
        };

        let path = self.cache_path(&name);
        tokio::fs::write(&path, &data).await?;

        let local_start_us = start_us + self.offset.offset().await;

        // At most one playback child: kill the previous one before the
        // replacement exists.
        if let Some(previous) = self.playback.take() {
            debug!("preempting playback pid {:?}", previous.id());
            previous.stop().await;
        }
        self.playback = Some(self.player.spawn(&path, local_start_us)?);

        Ok(RoundOutcome::Scheduled { local_start_us })
    }

    /// Run forever: one round per broadcast notification, plus one initial
    /// round at startup to pick up a song published before we connected.
    pub async fn run(mut self, mut subscriber: BroadcastSubscriber) -> Result<()> {
        loop {
            let outcome = self.run_round().await?;
            debug!("round outcome: {:?}", outcome);
            let topic = subscriber.next().await?;
            debug!("woken by broadcast: {}", topic);
        }
    }
}
