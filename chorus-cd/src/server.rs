//! Coordinator listeners
//!
//! One listener per channel, one task per accepted connection:
//! - clock: answer probes with the reference clock reading, stateless
//! - command: forward each request to the single command loop, relay the
//!   reply in lockstep
//! - broadcast: read the subscriber's topic filter, then push matching
//!   notifications until the subscriber goes away
//!
//! Connection tasks terminate on any transport error; the listeners and the
//! command loop run for the life of the process.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use chorus_common::proto::{read_message, write_message, write_reply, Command};
use chorus_common::{clock, Error, Result, TOPIC_NEW_SONG};

use crate::bus::BroadcastBus;
use crate::commands::{run_command_loop, CommandHandler, CommandRequest};

const COMMAND_QUEUE_DEPTH: usize = 32;
const BUS_CAPACITY: usize = 16;

/// The coordinator daemon: three bound listeners plus the song root folder.
pub struct Coordinator {
    clock_listener: TcpListener,
    command_listener: TcpListener,
    broadcast_listener: TcpListener,
    root: PathBuf,
}

impl Coordinator {
    /// Bind all three channels. Port 0 binds are supported so tests can run
    /// against ephemeral ports.
    pub async fn bind(
        clock_addr: &str,
        command_addr: &str,
        broadcast_addr: &str,
        root: PathBuf,
    ) -> Result<Self> {
        Ok(Self {
            clock_listener: TcpListener::bind(clock_addr).await?,
            command_listener: TcpListener::bind(command_addr).await?,
            broadcast_listener: TcpListener::bind(broadcast_addr).await?,
            root,
        })
    }

    pub fn clock_addr(&self) -> Result<SocketAddr> {
        Ok(self.clock_listener.local_addr()?)
    }

    pub fn command_addr(&self) -> Result<SocketAddr> {
        Ok(self.command_listener.local_addr()?)
    }

    pub fn broadcast_addr(&self) -> Result<SocketAddr> {
        Ok(self.broadcast_listener.local_addr()?)
    }

    /// Serve until the process is terminated.
    pub async fn run(self) -> Result<()> {
        let bus = BroadcastBus::new(BUS_CAPACITY);
        let (request_tx, request_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);

        info!(
            "coordinator serving clock on {}, commands on {}, broadcast on {}",
            self.clock_addr()?,
            self.command_addr()?,
            self.broadcast_addr()?
        );

        tokio::spawn(accept_clock(self.clock_listener));
        tokio::spawn(accept_broadcast(self.broadcast_listener, bus.clone()));
        tokio::spawn(accept_commands(self.command_listener, request_tx));

        // Startup nudge: wake agents that stayed subscribed across a
        // coordinator restart so they re-query the current song.
        let nudge_bus = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            nudge_bus.publish(TOPIC_NEW_SONG);
        });

        run_command_loop(request_rx, CommandHandler::new(self.root), bus).await
    }
}

async fn accept_clock(listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("clock probe connection from {}", peer);
                tokio::spawn(async move {
                    if let Err(e) = serve_clock_conn(stream).await {
                        log_conn_end("clock", &e);
                    }
                });
            }
            Err(e) => {
                error!("clock accept failed: {}", e);
                return;
            }
        }
    }
}

async fn serve_clock_conn(mut stream: TcpStream) -> Result<()> {
    loop {
        clock::answer_probe(&mut stream).await?;
    }
}

async fn accept_commands(listener: TcpListener, request_tx: mpsc::Sender<CommandRequest>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("command connection from {}", peer);
                let tx = request_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_command_conn(stream, tx).await {
                        log_conn_end("command", &e);
                    }
                });
            }
            Err(e) => {
                error!("command accept failed: {}", e);
                return;
            }
        }
    }
}

/// Lockstep relay: one request in, one reply out, strictly alternating.
async fn serve_command_conn(
    mut stream: TcpStream,
    request_tx: mpsc::Sender<CommandRequest>,
) -> Result<()> {
    loop {
        let frames = read_message(&mut stream).await?;
        let command = Command::parse(&frames);
        let (reply_tx, reply_rx) = oneshot::channel();
        request_tx
            .send(CommandRequest { command, reply_tx })
            .await
            .map_err(|_| Error::Protocol("command loop is gone".into()))?;
        let reply = reply_rx
            .await
            .map_err(|_| Error::Protocol("command loop dropped the request".into()))?;
        write_reply(&mut stream, &reply).await?;
    }
}

async fn accept_broadcast(listener: TcpListener, bus: BroadcastBus) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("broadcast subscriber from {}", peer);
                let bus = bus.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_broadcast_conn(stream, bus).await {
                        log_conn_end("broadcast", &e);
                    }
                });
            }
            Err(e) => {
                error!("broadcast accept failed: {}", e);
                return;
            }
        }
    }
}

/// Forward bus notifications whose topic matches the subscriber's prefix
/// filter. A subscriber that lags out of the bus buffer simply misses those
/// notifications; there is no redelivery.
async fn serve_broadcast_conn(mut stream: TcpStream, bus: BroadcastBus) -> Result<()> {
    let frames = read_message(&mut stream).await?;
    let filter = frames
        .into_iter()
        .next()
        .ok_or_else(|| Error::Protocol("missing topic filter".into()))?;
    let filter = String::from_utf8(filter)
        .map_err(|_| Error::Protocol("non-UTF-8 topic filter".into()))?;

    let mut rx = bus.subscribe();
    loop {
        match rx.recv().await {
            Ok(topic) => {
                if topic.starts_with(&filter) {
                    write_message(&mut stream, &[topic.as_bytes()]).await?;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                warn!("broadcast subscriber lagged, {} notifications dropped", missed);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

fn log_conn_end(channel: &str, err: &Error) {
    match err {
        Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            debug!("{} connection closed by peer", channel);
        }
        e => warn!("{} connection ended: {}", channel, e),
    }
}
