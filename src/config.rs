use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{MediaBatchError, Result};
use crate::job::{PollingPolicy, StatusClassifier};
use crate::naming::NamingConfig;
use crate::remote::ProcessingOptions;
use crate::scheduler::{FailurePolicy, SchedulingPlan};

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "mediabatch.toml";

const USERNAME_ENV: &str = "MEDIABATCH_USERNAME";
const PASSWORD_ENV: &str = "MEDIABATCH_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default = "default_output")]
    pub output: NamingConfig,
    #[serde(default)]
    pub processing: ProcessingOptions,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub media: MediaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Root of the production API, without trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Fixed delay between two status polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound on the time a job may spend polling; 0 disables the bound
    #[serde(default = "default_max_poll_wait_secs")]
    pub max_poll_wait_secs: u64,
    /// Consecutive transport failures tolerated while polling
    #[serde(default = "default_max_transient_poll_errors")]
    pub max_transient_poll_errors: u32,
    /// Timeout for API calls that carry no payload
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Timeout for uploads and artifact downloads
    #[serde(default = "default_transfer_timeout_secs")]
    pub transfer_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Status code meaning the production finished
    #[serde(default = "default_done_status")]
    pub done_status: i64,
    /// Status codes meaning the production failed
    #[serde(default = "default_error_statuses")]
    pub error_statuses: Vec<i64>,
    /// Delete the remote production when a job fails after creation
    #[serde(default = "default_true")]
    pub cleanup_on_failure: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// One file at a time, in input order
    Sequential,
    /// Every file dispatched at once
    Concurrent,
    /// Consecutive chunks of `batch_size` files, one chunk at a time
    Batched,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    #[serde(default = "default_policy")]
    pub policy: PolicyKind,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    #[serde(default = "default_media_binary")]
    pub binary_path: String,
}

fn default_base_url() -> String {
    "https://auphonic.com".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_poll_wait_secs() -> u64 {
    3600
}

fn default_max_transient_poll_errors() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_transfer_timeout_secs() -> u64 {
    3600
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_done_status() -> i64 {
    3
}

// Error, Incomplete, Production Not Started, Audio Processing Failed
fn default_error_statuses() -> Vec<i64> {
    vec![2, 9, 11, 13]
}

fn default_true() -> bool {
    true
}

fn default_output() -> NamingConfig {
    NamingConfig::new("auphonic", "-auphonic", None)
}

fn default_policy() -> PolicyKind {
    PolicyKind::Concurrent
}

fn default_batch_size() -> usize {
    4
}

fn default_media_binary() -> String {
    "ffmpeg".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            output: default_output(),
            processing: ProcessingOptions::default(),
            scheduling: SchedulingConfig::default(),
            media: MediaConfig::default(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            username: String::new(),
            password: String::new(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_wait_secs: default_max_poll_wait_secs(),
            max_transient_poll_errors: default_max_transient_poll_errors(),
            request_timeout_secs: default_request_timeout_secs(),
            transfer_timeout_secs: default_transfer_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            done_status: default_done_status(),
            error_statuses: default_error_statuses(),
            cleanup_on_failure: true,
        }
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            policy: default_policy(),
            batch_size: default_batch_size(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary_path: default_media_binary(),
        }
    }
}

impl RemoteConfig {
    pub fn polling_policy(&self) -> PollingPolicy {
        PollingPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_wait: (self.max_poll_wait_secs > 0).then(|| Duration::from_secs(self.max_poll_wait_secs)),
            max_transient_errors: self.max_transient_poll_errors,
        }
    }

    pub fn status_classifier(&self) -> StatusClassifier {
        StatusClassifier::new(self.done_status, self.error_statuses.iter().copied())
    }

    /// Checks needed before talking to the remote service.
    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(MediaBatchError::Config(format!(
                "Remote account credentials are required (--username/--password, {} / {}, or [remote] in {})",
                USERNAME_ENV, PASSWORD_ENV, DEFAULT_CONFIG_FILE
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(MediaBatchError::Config("poll_interval_ms must be positive".to_string()));
        }
        if self.error_statuses.contains(&self.done_status) {
            return Err(MediaBatchError::Config(format!(
                "Status {} cannot be both the done status and an error status",
                self.done_status
            )));
        }
        Ok(())
    }
}

impl SchedulingConfig {
    pub fn plan(&self) -> Result<SchedulingPlan> {
        match self.policy {
            PolicyKind::Sequential => Ok(SchedulingPlan::Sequential),
            PolicyKind::Concurrent => Ok(SchedulingPlan::Concurrent),
            PolicyKind::Batched => NonZeroUsize::new(self.batch_size)
                .map(SchedulingPlan::Batched)
                .ok_or_else(|| MediaBatchError::Config("batch_size must be positive for the batched policy".to_string())),
        }
    }
}

impl Config {
    /// Everything the remote command needs before any file is touched.
    pub fn validate(&self) -> Result<()> {
        self.remote.validate()?;
        self.scheduling.plan()?;
        Ok(())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MediaBatchError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| MediaBatchError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Load from `path`, or from `mediabatch.toml` in the working directory when present,
    /// or fall back to defaults. Credentials from the environment win over the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                info!("Found {} in current directory, loading...", DEFAULT_CONFIG_FILE);
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(username) = std::env::var(USERNAME_ENV)
            && !username.is_empty()
        {
            self.remote.username = username;
        }
        if let Ok(password) = std::env::var(PASSWORD_ENV)
            && !password.is_empty()
        {
            self.remote.password = password;
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| MediaBatchError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| MediaBatchError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}
