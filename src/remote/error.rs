//! Error type for the remote processing API client.
//!
//! Transport failures (no usable response) and protocol failures (the service
//! answered but reported non-success) are separate variants so callers can
//! tell them apart even when they react to both the same way.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteApiError {
    /// The request never produced a response: DNS, connection refused, timeout.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered, but its HTTP status or envelope `status_code` signals failure.
    #[error("API error (status {status}): {message}")]
    Protocol { status: u16, message: String },

    /// The service answered with a body we could not interpret.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// Local stream failure while reading the upload or writing the artifact.
    #[error("local IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteApiError {
    pub fn is_transport(&self) -> bool {
        matches!(self, RemoteApiError::Transport(_))
    }

    /// Protocol-level failures, including undecodable responses.
    pub fn is_protocol(&self) -> bool {
        matches!(self, RemoteApiError::Protocol { .. } | RemoteApiError::Decode(_))
    }
}
