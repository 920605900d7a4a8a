//! Playback subprocess ownership
//!
//! The agent owns at most one playback child at a time. The child receives
//! the target local start instant and the cached file path and is solely
//! responsible for waiting until that instant before producing audio; the
//! agent never interprets its exit status beyond "safe to replace".

use std::path::{Path, PathBuf};

use tokio::process::{Child, Command};
use tracing::{info, warn};

use chorus_common::Result;

/// How to launch the playback executable.
#[derive(Debug, Clone)]
pub struct PlayerCommand {
    program: PathBuf,
    /// Operator-supplied arguments forwarded verbatim to every launch.
    passthrough: Vec<String>,
}

impl PlayerCommand {
    pub fn new(program: PathBuf, passthrough: Vec<String>) -> Self {
        Self {
            program,
            passthrough,
        }
    }

    /// Launch one playback child for `file`, starting at `start_us` on the
    /// local clock.
    pub fn spawn(&self, file: &Path, start_us: i64) -> Result<Playback> {
        let mut command = Command::new(&self.program);
        command
            .arg(format!("--start-us={}", start_us))
            .args(&self.passthrough)
            .arg(file)
            // A handle dropped without stop() must not leave an orphaned
            // player running.
            .kill_on_drop(true);
        let child = command.spawn()?;
        info!(
            "launched {} (pid {:?}) for {} at {}",
            self.program.display(),
            child.id(),
            file.display(),
            start_us
        );
        Ok(Playback { child })
    }
}

/// A running playback child.
#[derive(Debug)]
pub struct Playback {
    child: Child,
}

impl Playback {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Kill the child immediately (no fade-out, no drain) and reap it.
    /// A child that already exited is not an error.
    pub async fn stop(mut self) {
        if let Err(e) = self.child.kill().await {
            warn!("failed to stop playback child: {}", e);
        }
    }
}
