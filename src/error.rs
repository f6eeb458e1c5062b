use thiserror::Error;

use crate::remote::RemoteApiError;

#[derive(Error, Debug)]
pub enum MediaBatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Remote API error: {0}")]
    Remote(#[from] RemoteApiError),

    #[error("Media processing error: {0}")]
    Media(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Remote job {remote_id} still processing after {waited_secs}s")]
    PollTimeout { remote_id: String, waited_secs: u64 },

    #[error("Remote job reported failure (status {status}): {message}")]
    JobRejected { status: i64, message: String },

    #[error("Illegal job transition: {0}")]
    Transition(String),

    #[error("Cancelled")]
    Cancelled,
}

impl MediaBatchError {
    /// True when the failure came from the network layer rather than the service itself.
    pub fn is_transport(&self) -> bool {
        matches!(self, MediaBatchError::Remote(e) if e.is_transport())
    }
}

pub type Result<T> = std::result::Result<T, MediaBatchError>;
