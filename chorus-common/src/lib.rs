//! # Chorus Common Library
//!
//! Shared code for the chorus daemons:
//! - Clock-offset estimation (`clock`)
//! - Wire protocol: multipart frames, commands, replies (`proto`)
//! - Configuration loading (`config`)
//! - Timestamp utilities (`time`)

pub mod clock;
pub mod config;
pub mod error;
pub mod proto;
pub mod time;

pub use error::{Error, Result};

/// Lead added to the reference clock when scheduling a newly published song,
/// sized to cover broadcast propagation and file fetch across all agents.
pub const LEAD_US: i64 = 2_000_000;

/// Topic published on the broadcast channel whenever the current song changes.
pub const TOPIC_NEW_SONG: &str = "new song";
