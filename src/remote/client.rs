use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use super::error::RemoteApiError;
use super::types::{CreateProductionRequest, Envelope, ProcessingOptions, Production, RemoteStatus};
use super::RemoteApi;
use crate::config::RemoteConfig;
use crate::naming::partial_path;

/// reqwest-backed client for the Auphonic production API.
///
/// Holds no per-job state; a single instance is shared by every concurrently
/// running job.
pub struct AuphonicClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    request_timeout: Duration,
    transfer_timeout: Duration,
}

impl AuphonicClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteApiError> {
        let client = Client::builder()
            .user_agent(concat!("mediabatch/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            transfer_timeout: Duration::from_secs(config.transfer_timeout_secs),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn production_url(&self, remote_id: &str, action: Option<&str>) -> String {
        match action {
            Some(action) => self.url(&format!("/api/production/{}/{}.json", remote_id, action)),
            None => self.url(&format!("/api/production/{}.json", remote_id)),
        }
    }

    /// Send an authenticated API request and unwrap the response envelope.
    async fn execute(&self, request: RequestBuilder) -> Result<Option<serde_json::Value>, RemoteApiError> {
        let response = request
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let envelope = serde_json::from_str::<Envelope>(&body);

        if !status.is_success() {
            let message = envelope
                .ok()
                .and_then(|e| e.error_message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| body.trim().to_string());
            return Err(RemoteApiError::Protocol {
                status: status.as_u16(),
                message,
            });
        }

        let envelope = envelope.map_err(|e| RemoteApiError::Decode(format!("invalid envelope: {}", e)))?;
        if envelope.status_code != 200 {
            return Err(RemoteApiError::Protocol {
                status: envelope.status_code,
                message: envelope.error_message.unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        Ok(envelope.data)
    }

    async fn execute_production(&self, request: RequestBuilder) -> Result<Production, RemoteApiError> {
        let data = self
            .execute(request)
            .await?
            .ok_or_else(|| RemoteApiError::Decode("response has no data".to_string()))?;
        serde_json::from_value(data).map_err(|e| RemoteApiError::Decode(format!("invalid production: {}", e)))
    }
}

#[async_trait]
impl RemoteApi for AuphonicClient {
    async fn create_job(&self, options: &ProcessingOptions, label: &str) -> Result<String, RemoteApiError> {
        debug!("Creating production for {}", label);
        let request = self
            .client
            .post(self.url("/api/productions.json"))
            .timeout(self.request_timeout)
            .json(&CreateProductionRequest::new(options, label));

        let production = self.execute_production(request).await?;
        Ok(production.uuid)
    }

    async fn upload_payload(&self, remote_id: &str, file: File, file_name: &str) -> Result<String, RemoteApiError> {
        let length = file.metadata().await?.len();
        debug!("Uploading {} ({} bytes) to production {}", file_name, length, remote_id);

        let body = Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, length).file_name(file_name.to_string());
        let form = Form::new().part("input_file", part);

        let request = self
            .client
            .post(self.production_url(remote_id, Some("upload")))
            .timeout(self.transfer_timeout)
            .multipart(form);

        self.execute(request).await?;
        Ok(remote_id.to_string())
    }

    async fn start_job(&self, remote_id: &str) -> Result<String, RemoteApiError> {
        let request = self
            .client
            .post(self.production_url(remote_id, Some("start")))
            .timeout(self.request_timeout);

        self.execute(request).await?;
        Ok(remote_id.to_string())
    }

    async fn fetch_status(&self, remote_id: &str) -> Result<RemoteStatus, RemoteApiError> {
        let request = self
            .client
            .get(self.production_url(remote_id, None))
            .timeout(self.request_timeout);

        let production = self.execute_production(request).await?;
        Ok(production.into())
    }

    async fn delete_job(&self, remote_id: &str) -> Result<String, RemoteApiError> {
        let request = self
            .client
            .delete(self.production_url(remote_id, None))
            .timeout(self.request_timeout);

        self.execute(request).await?;
        Ok(remote_id.to_string())
    }

    async fn download_artifact(&self, url: &str, destination: &Path) -> Result<PathBuf, RemoteApiError> {
        debug!("Downloading {} to {}", url, destination.display());

        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .timeout(self.transfer_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(RemoteApiError::Protocol {
                status: status.as_u16(),
                message: message.trim().to_string(),
            });
        }

        // Bytes land in a sibling `.part` file and are renamed into place only once flushed.
        let partial = partial_path(destination);
        let written = write_stream(response, &partial).await;
        if let Err(e) = written {
            if let Err(remove_err) = fs::remove_file(&partial).await {
                warn!("Failed to remove partial download {}: {}", partial.display(), remove_err);
            }
            return Err(e);
        }

        fs::rename(&partial, destination).await?;
        Ok(destination.to_path_buf())
    }
}

async fn write_stream(response: reqwest::Response, path: &Path) -> Result<u64, RemoteApiError> {
    let mut file = File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    file.sync_all().await?;
    debug!("Wrote {} bytes to {}", written, path.display());
    Ok(written)
}
