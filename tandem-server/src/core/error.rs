use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Error type for storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The replica is not serving queries (master link down or handshaking)
    #[error("Not ready: replica is not in sync with its master")]
    NotReady,

    #[error("Memory limit exceeded")]
    MemoryLimitExceeded,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl StoreError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            Self::MemoryLimitExceeded => StatusCode::INSUFFICIENT_STORAGE,
            Self::InvalidKey(_) => StatusCode::BAD_REQUEST,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Implement IntoResponse for Axum integration
impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "code": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StoreError>;
