//! Wire protocol shared by the coordinator and its clients.
//!
//! All channels carry multipart messages: a `u32` big-endian frame count,
//! then each frame as a `u32` big-endian length followed by raw bytes. A
//! frame is either a short UTF-8 string (command verbs, names, replies) or
//! an opaque byte payload (file contents).
//!
//! The command channel is strict lockstep: a client writes one request
//! message and reads exactly one reply message before writing again. The
//! broadcast channel is one-directional after an initial topic-filter
//! message from the subscriber.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::{Error, Result};

/// Upper bound on frames per message; real messages carry at most three.
pub const MAX_FRAMES: u32 = 16;

/// Upper bound on a single frame; sized for whole song files.
pub const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

pub const CMD_PLAY: &str = "play";
pub const CMD_GET_SONG: &str = "get song";
pub const CMD_GET_FILE: &str = "get file";

pub const REPLY_OK: &str = "ok";
pub const REPLY_BAD_FORMAT: &str = "bad format";
pub const REPLY_UNKNOWN_FILE: &str = "unknown file";

/// Write one multipart message. Blocks until the transport accepts it.
/// Bounds are enforced before anything is written, so an oversized message
/// never leaves a half-written prefix on the stream.
pub async fn write_message<S>(stream: &mut S, frames: &[&[u8]]) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    if frames.len() > MAX_FRAMES as usize {
        return Err(Error::Protocol(format!(
            "frame count {} exceeds limit",
            frames.len()
        )));
    }
    if let Some(frame) = frames.iter().find(|f| f.len() > MAX_FRAME_LEN as usize) {
        return Err(Error::Protocol(format!(
            "frame length {} exceeds limit",
            frame.len()
        )));
    }
    stream.write_u32(frames.len() as u32).await?;
    for frame in frames {
        stream.write_u32(frame.len() as u32).await?;
        stream.write_all(frame).await?;
    }
    stream.flush().await?;
    Ok(())
}

/// Read one multipart message. Blocks until a full message arrives.
pub async fn read_message<S>(stream: &mut S) -> Result<Vec<Vec<u8>>>
where
    S: AsyncRead + Unpin,
{
    let count = stream.read_u32().await?;
    if count > MAX_FRAMES {
        return Err(Error::Protocol(format!("frame count {} exceeds limit", count)));
    }
    let mut frames = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = stream.read_u32().await?;
        if len > MAX_FRAME_LEN {
            return Err(Error::Protocol(format!("frame length {} exceeds limit", len)));
        }
        let mut frame = vec![0u8; len as usize];
        stream.read_exact(&mut frame).await?;
        frames.push(frame);
    }
    Ok(frames)
}

/// A request on the command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Publish a song: store `data` under `name` and schedule it.
    Play { name: String, data: Vec<u8> },
    /// Query the current song descriptor.
    GetSong,
    /// Fetch a stored song file by name.
    GetFile { name: String },
}

impl Command {
    /// Parse a request message. `None` means the request is malformed
    /// (unknown verb, wrong frame count, or a non-UTF-8 name) and deserves
    /// a `bad format` reply.
    pub fn parse(frames: &[Vec<u8>]) -> Option<Command> {
        let verb = frames.first()?;
        if verb == CMD_PLAY.as_bytes() {
            if frames.len() != 3 {
                return None;
            }
            let name = String::from_utf8(frames[1].clone()).ok()?;
            Some(Command::Play {
                name,
                data: frames[2].clone(),
            })
        } else if verb == CMD_GET_SONG.as_bytes() {
            if frames.len() != 1 {
                return None;
            }
            Some(Command::GetSong)
        } else if verb == CMD_GET_FILE.as_bytes() {
            if frames.len() != 2 {
                return None;
            }
            let name = String::from_utf8(frames[1].clone()).ok()?;
            Some(Command::GetFile { name })
        } else {
            None
        }
    }

    fn frames(&self) -> Vec<&[u8]> {
        match self {
            Command::Play { name, data } => {
                vec![CMD_PLAY.as_bytes(), name.as_bytes(), data]
            }
            Command::GetSong => vec![CMD_GET_SONG.as_bytes()],
            Command::GetFile { name } => vec![CMD_GET_FILE.as_bytes(), name.as_bytes()],
        }
    }
}

/// A reply on the command channel. Exactly one is sent per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Publish accepted.
    Ok,
    /// Current song descriptor; empty name and zero start when no song has
    /// ever been published.
    CurrentSong { name: String, start_us: i64 },
    /// Stored file contents.
    File { data: Vec<u8> },
    /// Malformed request; no state was changed.
    BadFormat,
    /// The named file could not be read.
    UnknownFile,
}

impl Reply {
    /// Decode a reply message. Replies are distinguished by their leading
    /// string frame and arity.
    pub fn parse(frames: &[Vec<u8>]) -> Result<Reply> {
        let head = frames
            .first()
            .ok_or_else(|| Error::Protocol("empty reply".into()))?;
        if head == REPLY_BAD_FORMAT.as_bytes() && frames.len() == 1 {
            return Ok(Reply::BadFormat);
        }
        if head == REPLY_UNKNOWN_FILE.as_bytes() && frames.len() == 1 {
            return Ok(Reply::UnknownFile);
        }
        if head == REPLY_OK.as_bytes() {
            return match frames.len() {
                1 => Ok(Reply::Ok),
                2 => Ok(Reply::File {
                    data: frames[1].clone(),
                }),
                3 => {
                    let name = String::from_utf8(frames[1].clone())
                        .map_err(|_| Error::Protocol("non-UTF-8 song name".into()))?;
                    let start_us = std::str::from_utf8(&frames[2])
                        .ok()
                        .and_then(|s| s.parse::<i64>().ok())
                        .ok_or_else(|| Error::Protocol("bad start_us field".into()))?;
                    Ok(Reply::CurrentSong { name, start_us })
                }
                n => Err(Error::Protocol(format!("ok reply with {} frames", n))),
            };
        }
        Err(Error::Protocol(format!(
            "unrecognized reply: {}",
            String::from_utf8_lossy(head)
        )))
    }
}

/// Encode and send one reply.
pub async fn write_reply<S>(stream: &mut S, reply: &Reply) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    match reply {
        Reply::Ok => write_message(stream, &[REPLY_OK.as_bytes()]).await,
        Reply::CurrentSong { name, start_us } => {
            let start = start_us.to_string();
            write_message(
                stream,
                &[REPLY_OK.as_bytes(), name.as_bytes(), start.as_bytes()],
            )
            .await
        }
        Reply::File { data } => write_message(stream, &[REPLY_OK.as_bytes(), data]).await,
        Reply::BadFormat => write_message(stream, &[REPLY_BAD_FORMAT.as_bytes()]).await,
        Reply::UnknownFile => write_message(stream, &[REPLY_UNKNOWN_FILE.as_bytes()]).await,
    }
}

/// Lockstep client for the command channel.
pub struct CommandClient {
    stream: TcpStream,
}

impl CommandClient {
    pub async fn connect(addr: &str) -> Result<Self> {
        Ok(Self {
            stream: TcpStream::connect(addr).await?,
        })
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Send one command and block for its reply.
    pub async fn request(&mut self, command: &Command) -> Result<Reply> {
        write_message(&mut self.stream, &command.frames()).await?;
        let frames = read_message(&mut self.stream).await?;
        Reply::parse(&frames)
    }
}

/// Subscriber half of the broadcast channel: connects, announces its topic
/// filter, then blocks on notifications.
pub struct BroadcastSubscriber {
    stream: TcpStream,
}

impl BroadcastSubscriber {
    /// Connect and install a prefix filter; only messages whose topic
    /// starts with `topic` will be delivered.
    pub async fn connect(addr: &str, topic: &str) -> Result<Self> {
        let mut stream = TcpStream::connect(addr).await?;
        write_message(&mut stream, &[topic.as_bytes()]).await?;
        Ok(Self { stream })
    }

    /// Block until the next notification arrives and return its topic.
    pub async fn next(&mut self) -> Result<String> {
        let frames = read_message(&mut self.stream).await?;
        let topic = frames
            .into_iter()
            .next()
            .ok_or_else(|| Error::Protocol("empty broadcast message".into()))?;
        String::from_utf8(topic).map_err(|_| Error::Protocol("non-UTF-8 topic".into()))
    }
}
