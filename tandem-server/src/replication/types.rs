use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Lifecycle of the slave's link to its master
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaveConnectionState {
    /// No connection and no attempt in flight
    #[default]
    Disconnected,
    /// TCP connect in progress
    Connecting,
    /// Connected, waiting for the master's hello
    Handshaking,
    /// Handshake done, applying the master's stream
    Streaming,
    /// Terminal; no further reconnects
    ShuttingDown,
}

/// Why a connection attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Master said goodbye, or closed after announcing shutdown
    Graceful,
    /// Transport error, handshake or protocol failure, unexpected EOF
    Failed(String),
    /// Closed from our side by an admin command
    Forced,
}

/// Counters kept by the slave's home task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplicationStats {
    /// Connection attempts started (scheduled, forced or initial)
    pub connect_attempts: u64,
    /// Handshakes completed
    pub handshakes: u64,
    /// Connections that ended in failure
    pub failures: u64,
    /// Connections that ended gracefully
    pub graceful_disconnects: u64,
    /// Messages applied after handshake
    pub messages_applied: u64,
    /// Backfill records written
    pub backfilled_keys: u64,
    /// Local store errors while applying master messages
    pub store_failures: u64,
    /// Protocol violations seen on the stream
    pub protocol_errors: u64,
}

/// Replication error types
#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection attempt timed out after {0}ms")]
    ConnectTimeout(u64),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Unknown control: {0}")]
    UnknownControl(String),

    #[error("Invalid control arguments: {0}")]
    InvalidControlArgs(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Replication slave has stopped")]
    SlaveStopped,
}

impl From<bincode::error::EncodeError> for ReplicationError {
    fn from(e: bincode::error::EncodeError) -> Self {
        ReplicationError::SerializationError(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for ReplicationError {
    fn from(e: bincode::error::DecodeError) -> Self {
        ReplicationError::SerializationError(e.to_string())
    }
}

impl ReplicationError {
    /// HTTP status for errors surfaced through the admin API
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownControl(_) | Self::InvalidControlArgs(_) | Self::InvalidConfig(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::SlaveStopped => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ReplicationError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "code": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

pub type ReplicationResult<T> = std::result::Result<T, ReplicationError>;
