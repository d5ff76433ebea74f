//! Master → slave replication protocol
//!
//! Every frame on the wire is
//!
//! ```text
//! +----------------+----------------+---------------------------+
//! | len: u32 (BE)  | crc32: u32 (BE)| bincode(Message), len bytes|
//! +----------------+----------------+---------------------------+
//! ```
//!
//! The message set is closed: anything that does not decode into
//! [`Message`] is a protocol error.

use super::types::{ReplicationError, ReplicationResult};
use crate::core::{ExpTime, Flags};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Identifies the protocol in `hello`
pub const PROTOCOL_MAGIC: &str = "TANDEM-REPL";
/// Bumped on any incompatible change to [`Message`]
pub const PROTOCOL_VERSION: u32 = 1;
/// Frames larger than this are refused
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Handshake payload, sent by both ends as their first frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub magic: String,
    pub protocol_version: u32,
    /// Unix time the sender's database was created
    pub database_created: u64,
}

impl Hello {
    pub fn new(database_created: u64) -> Self {
        Self {
            magic: PROTOCOL_MAGIC.to_string(),
            protocol_version: PROTOCOL_VERSION,
            database_created,
        }
    }

    /// Reject a peer speaking another protocol or version
    pub fn check_compatible(&self) -> ReplicationResult<()> {
        if self.magic != PROTOCOL_MAGIC {
            return Err(ReplicationError::HandshakeFailed(format!(
                "unexpected protocol magic {:?}",
                self.magic
            )));
        }
        if self.protocol_version != PROTOCOL_VERSION {
            return Err(ReplicationError::HandshakeFailed(format!(
                "protocol version mismatch: expected {}, got {}",
                PROTOCOL_VERSION, self.protocol_version
            )));
        }
        Ok(())
    }
}

/// Messages the master streams to its slaves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Hello(Hello),

    /// Range of master timestamps the following data covers
    Announce { from: u64, to: u64 },

    /// Historical record for catch-up; overwrites unconditionally
    Backfill {
        key: String,
        value: Vec<u8>,
        flags: Flags,
        exptime: ExpTime,
    },

    Set {
        key: String,
        value: Vec<u8>,
        flags: Flags,
        exptime: ExpTime,
    },

    Append { key: String, value: Vec<u8> },

    Prepend { key: String, value: Vec<u8> },

    /// Liveness marker
    Nop { timestamp: u64 },

    Ack { timestamp: u64 },

    /// Master is retiring; a goodbye or close follows
    ShuttingDown,

    Goodbye,
}

impl Message {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Hello(_) => "hello",
            Message::Announce { .. } => "announce",
            Message::Backfill { .. } => "backfill",
            Message::Set { .. } => "set",
            Message::Append { .. } => "append",
            Message::Prepend { .. } => "prepend",
            Message::Nop { .. } => "nop",
            Message::Ack { .. } => "ack",
            Message::ShuttingDown => "shutting-down",
            Message::Goodbye => "goodbye",
        }
    }
}

/// Length prefixes inside a payload may never claim more than a frame can hold
fn codec_config() -> impl bincode::config::Config {
    bincode::config::standard().with_limit::<MAX_FRAME_SIZE>()
}

/// Serialize a message into a complete frame
pub fn encode_frame(message: &Message) -> ReplicationResult<Vec<u8>> {
    let payload = bincode::serde::encode_to_vec(message, codec_config())?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(ReplicationError::FrameTooLarge(payload.len()));
    }

    let mut frame = Vec::with_capacity(payload.len() + 8);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode a frame payload after its checksum was verified
pub fn decode_payload(payload: &[u8]) -> ReplicationResult<Message> {
    let (message, consumed): (Message, usize) =
        bincode::serde::decode_from_slice(payload, codec_config())?;
    if consumed != payload.len() {
        return Err(ReplicationError::Protocol(format!(
            "{} trailing bytes after {} message",
            payload.len() - consumed,
            message.kind()
        )));
    }
    Ok(message)
}

/// Write one message and flush
pub async fn write_message<W>(writer: &mut W, message: &Message) -> ReplicationResult<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the next message
///
/// Returns `Ok(None)` on a clean EOF between frames. EOF inside a frame is an
/// error.
pub async fn read_message<R>(reader: &mut R) -> ReplicationResult<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 8];
    let first = reader.read(&mut header[..1]).await?;
    if first == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut header[1..]).await?;

    let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let expected = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    if len > MAX_FRAME_SIZE {
        return Err(ReplicationError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    let actual = crc32fast::hash(&payload);
    if actual != expected {
        return Err(ReplicationError::ChecksumMismatch { expected, actual });
    }

    decode_payload(&payload).map(Some)
}
