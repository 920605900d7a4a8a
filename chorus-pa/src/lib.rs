//! # Chorus Player Agent (chorus-pa)
//!
//! Keeps a live clock-offset estimate against the coordinator, reacts to
//! "new song" broadcasts by fetching the current song, translates the
//! coordinator's start instant into the local clock timeline, and owns at
//! most one playback subprocess, preempting the previous one on each new
//! song.

pub mod agent;
pub mod estimator;
pub mod player;

pub use agent::{Agent, RoundOutcome};
pub use estimator::OffsetHandle;
pub use player::{Playback, PlayerCommand};
