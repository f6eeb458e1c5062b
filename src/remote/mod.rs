// Remote processing service
//
// The job runner talks to the service only through the RemoteApi trait:
// - client: reqwest implementation for the Auphonic production API
// - types: request/response bodies and the per-run ProcessingOptions
// - error: transport vs protocol failures

pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::File;

pub use client::AuphonicClient;
pub use error::RemoteApiError;
pub use types::{ProcessingOptions, RemoteStatus};

/// Network primitives of the remote job pipeline.
///
/// Implementations must be stateless with respect to individual jobs so one
/// instance can serve many jobs concurrently.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Create a remote job and return its id
    async fn create_job(&self, options: &ProcessingOptions, label: &str) -> Result<String, RemoteApiError>;

    /// Stream the source file into the job; echoes the id on success
    async fn upload_payload(&self, remote_id: &str, file: File, file_name: &str) -> Result<String, RemoteApiError>;

    /// Start processing; echoes the id on success
    async fn start_job(&self, remote_id: &str) -> Result<String, RemoteApiError>;

    /// Current status of the job
    async fn fetch_status(&self, remote_id: &str) -> Result<RemoteStatus, RemoteApiError>;

    /// Delete the job on the service; echoes the id on success
    async fn delete_job(&self, remote_id: &str) -> Result<String, RemoteApiError>;

    /// Download the result to `destination`, returning it once every byte is on disk
    async fn download_artifact(&self, url: &str, destination: &Path) -> Result<PathBuf, RemoteApiError>;
}
