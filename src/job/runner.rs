use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::{self, File};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::clock::Clock;
use super::model::{Job, JobOutcome};
use super::state::{JobEvent, JobState, StateMachine, StatusClass, StatusClassifier};
use crate::error::{MediaBatchError, Result};
use crate::naming::{NamingConfig, partial_path};
use crate::remote::{ProcessingOptions, RemoteApi, RemoteApiError};

/// Polling behavior for the STARTED → SUCCEEDED stretch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingPolicy {
    /// Fixed delay between polls
    pub interval: Duration,
    /// Give up once polling has lasted this long; `None` polls forever
    pub max_wait: Option<Duration>,
    /// Consecutive transport failures tolerated before the job fails
    pub max_transient_errors: u32,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_wait: Some(Duration::from_secs(3600)),
            max_transient_errors: 3,
        }
    }
}

/// Drives single files through the remote pipeline.
///
/// One runner is shared by every job of a run; all per-job state lives in the
/// [`Job`] owned by the `run` call.
pub struct JobRunner {
    api: Arc<dyn RemoteApi>,
    clock: Arc<dyn Clock>,
    options: ProcessingOptions,
    naming: NamingConfig,
    polling: PollingPolicy,
    classifier: StatusClassifier,
    cleanup_on_failure: bool,
    cancel: CancellationToken,
}

impl JobRunner {
    pub fn new(
        api: Arc<dyn RemoteApi>,
        clock: Arc<dyn Clock>,
        options: ProcessingOptions,
        naming: NamingConfig,
        polling: PollingPolicy,
        classifier: StatusClassifier,
    ) -> Self {
        Self {
            api,
            clock,
            options,
            naming,
            polling,
            classifier,
            cleanup_on_failure: true,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cleanup_on_failure(mut self, enabled: bool) -> Self {
        self.cleanup_on_failure = enabled;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the whole pipeline for `source` and report how it settled. Never panics, never errors:
    /// every failure ends up in the returned outcome.
    pub async fn run(&self, source: PathBuf) -> JobOutcome {
        let output_path = match self.naming.resolve(&source) {
            Ok(path) => path,
            Err(e) => {
                error!("Cannot process {}: {}", source.display(), e);
                return JobOutcome::rejected(source, e.to_string());
            }
        };

        let mut job = Job::new(source, output_path);
        info!("Processing {} -> {}", job.source_path.display(), job.output_path.display());

        let cleanup_error = match self.drive(&mut job).await {
            Ok(()) => self.cleanup(&mut job).await,
            Err(e) => {
                error!("Job for {} failed in state {}: {}", job.label(), job.state, e);
                if let Err(transition_err) = StateMachine::apply(&mut job, JobEvent::Failed { reason: e.to_string() }) {
                    // Only reachable if the failure happened after DOWNLOADED, which drive() never does.
                    warn!("{}", transition_err);
                }
                self.cleanup_after_failure(&job).await
            }
        };

        if job.state.is_success() {
            info!("Finished {} -> {}", job.label(), job.output_path.display());
        }
        JobOutcome::from_job(&job, cleanup_error)
    }

    /// PENDING through DOWNLOADED. Returns at the first failure; the caller marks the job FAILED.
    async fn drive(&self, job: &mut Job) -> Result<()> {
        let label = job.label();
        let file = File::open(&job.source_path)
            .await
            .map_err(|e| MediaBatchError::FileNotFound(format!("{}: {}", job.source_path.display(), e)))?;

        let remote_id = self.guarded(self.api.create_job(&self.options, &label)).await?;
        self.advance(job, JobEvent::Created { remote_id: remote_id.clone() })?;

        self.guarded(self.api.upload_payload(&remote_id, file, &label)).await?;
        self.advance(job, JobEvent::Uploaded)?;

        self.guarded(self.api.start_job(&remote_id)).await?;
        self.advance(job, JobEvent::Started)?;

        self.advance(job, JobEvent::PollingBegan)?;
        let result_url = self.poll(job, &remote_id).await?;
        self.advance(job, JobEvent::Completed { result_url: result_url.clone() })?;

        let downloaded = self.guarded(self.api.download_artifact(&result_url, &job.output_path)).await;
        if let Err(MediaBatchError::Cancelled) = downloaded {
            discard_partial(&job.output_path).await;
        }
        downloaded?;
        self.advance(job, JobEvent::Downloaded)?;

        Ok(())
    }

    /// The POLLING self-loop. Returns the result URL once the service reports done.
    async fn poll(&self, job: &mut Job, remote_id: &str) -> Result<String> {
        let started = self.clock.now();
        let mut transient_errors = 0u32;

        loop {
            match self.guarded(self.api.fetch_status(remote_id)).await {
                Ok(status) => {
                    transient_errors = 0;
                    debug!("Status for {} ({}): {} {}", job.label(), remote_id, status.status_code, status.status_text);

                    match self.classifier.classify(status.status_code) {
                        StatusClass::Done => {
                            return status.result_url.ok_or_else(|| {
                                RemoteApiError::Decode(format!("production {} is done but lists no output file", remote_id))
                                    .into()
                            });
                        }
                        StatusClass::Error => {
                            return Err(MediaBatchError::JobRejected {
                                status: status.status_code,
                                message: status.status_text,
                            });
                        }
                        StatusClass::InProgress => {
                            self.advance(job, JobEvent::StillProcessing)?;
                        }
                    }
                }
                Err(MediaBatchError::Remote(e)) if e.is_transport() => {
                    transient_errors += 1;
                    if transient_errors > self.polling.max_transient_errors {
                        return Err(e.into());
                    }
                    warn!(
                        "Status poll for {} failed ({}/{}), retrying: {}",
                        job.label(),
                        transient_errors,
                        self.polling.max_transient_errors,
                        e
                    );
                }
                Err(e) => return Err(e),
            }

            let waited = self.clock.now().duration_since(started);
            if let Some(max_wait) = self.polling.max_wait
                && waited >= max_wait
            {
                return Err(MediaBatchError::PollTimeout {
                    remote_id: remote_id.to_string(),
                    waited_secs: waited.as_secs(),
                });
            }

            self.wait(self.polling.interval).await?;
        }
    }

    /// DOWNLOADED → CLEANED. A failed delete is reported, not fatal.
    async fn cleanup(&self, job: &mut Job) -> Option<String> {
        let remote_id = job.remote_id.clone()?;
        match self.api.delete_job(&remote_id).await {
            Ok(_) => {
                if let Err(e) = self.advance(job, JobEvent::Cleaned) {
                    warn!("{}", e);
                }
                None
            }
            Err(e) => {
                warn!("Could not delete remote job {} for {}: {}", remote_id, job.label(), e);
                Some(e.to_string())
            }
        }
    }

    /// Best-effort deletion of a remote job that will never complete. The job stays FAILED.
    async fn cleanup_after_failure(&self, job: &Job) -> Option<String> {
        let remote_id = job.remote_id.as_deref()?;
        if !self.cleanup_on_failure {
            warn!("Leaving remote job {} for {} in place", remote_id, job.label());
            return None;
        }

        match self.api.delete_job(remote_id).await {
            Ok(_) => {
                debug!("Deleted remote job {} after failure", remote_id);
                None
            }
            Err(e) => {
                warn!("Could not delete remote job {} for {}: {}", remote_id, job.label(), e);
                Some(e.to_string())
            }
        }
    }

    fn advance(&self, job: &mut Job, event: JobEvent) -> Result<JobState> {
        let from = job.state;
        let to = StateMachine::apply(job, event)?;
        if from != to {
            debug!("{}: {} -> {}", job.label(), from, to);
        }
        Ok(to)
    }

    async fn guarded<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, RemoteApiError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(MediaBatchError::Cancelled),
            result = call => result.map_err(MediaBatchError::from),
        }
    }

    async fn wait(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(MediaBatchError::Cancelled),
            _ = self.clock.sleep(duration) => Ok(()),
        }
    }
}

/// Remove what an interrupted download left next to `destination`.
async fn discard_partial(destination: &Path) {
    let partial = partial_path(destination);
    match fs::remove_file(&partial).await {
        Ok(()) => debug!("Removed partial download {}", partial.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial download {}: {}", partial.display(), e),
    }
}
