use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Trade sink error: {0}")]
    Sink(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Out-of-order candle: {got} is earlier than last admitted {last}")]
    OutOfOrder {
        last: DateTime<Utc>,
        got: DateTime<Utc>,
    },

    #[error("Duplicate candle at {0}")]
    DuplicateCandle(DateTime<Utc>),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model artifact error: {0}")]
    Artifact(String),

    #[error("Model schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification used by the feed worker to decide how to log and
/// whether an error affects the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Feed disconnects, sink unreachable.
    Transport,
    /// Malformed, duplicate or out-of-order events. The event is dropped.
    Data,
    /// Artifact or settings problems detected at load time.
    Configuration,
    Internal,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::WebSocket(_) | Error::Sink(_) | Error::Io(_) => {
                ErrorCategory::Transport
            }
            Error::MalformedEvent(_)
            | Error::OutOfOrder { .. }
            | Error::DuplicateCandle(_)
            | Error::Json(_) => ErrorCategory::Data,
            Error::Config(_) | Error::Artifact(_) | Error::SchemaMismatch(_) => {
                ErrorCategory::Configuration
            }
            Error::Database(_) => ErrorCategory::Internal,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
