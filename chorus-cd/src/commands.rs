//! Sequential command handling
//!
//! All command-channel requests, whichever connection they arrived on, are
//! funneled through [`run_command_loop`] and processed one at a time in
//! arrival order. The handler is the sole owner of [`CoordinatorState`] and
//! of the canonical song files under its root folder.

use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use chorus_common::proto::{Command, Reply};
use chorus_common::{time, Result, LEAD_US, TOPIC_NEW_SONG};

use crate::bus::BroadcastBus;
use crate::state::CoordinatorState;

/// One request as forwarded by a connection task. `command` is `None` when
/// the request was malformed; the loop still owes it exactly one reply.
pub struct CommandRequest {
    pub command: Option<Command>,
    pub reply_tx: oneshot::Sender<Reply>,
}

/// Owner of the current-song record and the canonical song files.
pub struct CommandHandler {
    root: PathBuf,
    state: CoordinatorState,
}

impl CommandHandler {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            state: CoordinatorState::new(),
        }
    }

    /// Process one request and produce its single reply.
    ///
    /// A failed write during publish is a storage fault the protocol has no
    /// answer for and propagates as fatal, matching the unhandled-error
    /// behavior of the rest of the transport. A failed read during
    /// `get file` is an expected condition with its own reply.
    pub async fn handle(&mut self, command: Option<Command>) -> Result<Reply> {
        let command = match command {
            Some(command) => command,
            None => return Ok(Reply::BadFormat),
        };
        match command {
            Command::Play { name, data } => {
                tokio::fs::write(self.root.join(&name), &data).await?;
                let start_us = time::now_us() + LEAD_US;
                info!("scheduled {} at {}", name, start_us);
                self.state.replace(name, start_us);
                Ok(Reply::Ok)
            }
            Command::GetSong => {
                let (name, start_us) = self.state.descriptor();
                Ok(Reply::CurrentSong { name, start_us })
            }
            Command::GetFile { name } => match tokio::fs::read(self.root.join(&name)).await {
                Ok(data) => Ok(Reply::File { data }),
                Err(e) => {
                    debug!("get file {} failed: {}", name, e);
                    Ok(Reply::UnknownFile)
                }
            },
        }
    }

    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }
}

/// Drain requests until every connection task is gone. Replies before
/// broadcasting, so a publisher sees `ok` no later than the notification
/// its publish triggered.
pub async fn run_command_loop(
    mut rx: mpsc::Receiver<CommandRequest>,
    mut handler: CommandHandler,
    bus: BroadcastBus,
) -> Result<()> {
    while let Some(request) = rx.recv().await {
        let reply = handler.handle(request.command).await?;
        let notify = matches!(reply, Reply::Ok);
        // The requester may have disconnected while waiting; that only
        // affects its own connection task.
        let _ = request.reply_tx.send(reply);
        if notify {
            bus.publish(TOPIC_NEW_SONG);
        }
    }
    Ok(())
}
