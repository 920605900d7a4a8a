//! # Chorus Coordinator (chorus-cd)
//!
//! Owns the single current-song record and serves the three coordinator
//! channels: clock probes, the sequential command protocol, and the
//! fire-and-forget "new song" broadcast.
//!
//! Architecture: one task per channel. Per-connection command tasks funnel
//! every request through one mpsc-fed command loop, so `CoordinatorState`
//! has exactly one writer and queries can never observe a torn publish.

pub mod bus;
pub mod commands;
pub mod server;
pub mod state;

pub use bus::BroadcastBus;
pub use server::Coordinator;
pub use state::{CoordinatorState, CurrentSong};
