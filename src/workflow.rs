use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{MediaBatchError, Result};
use crate::job::{Clock, JobOutcome, JobRunner, TokioClock};
use crate::media::LocalTransform;
use crate::naming::ensure_output_folder;
use crate::remote::{AuphonicClient, RemoteApi};
use crate::scheduler::{RunReport, Scheduler, SchedulingPlan};

/// Extensions picked up when a directory is given as input.
pub const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "mkv", "avi", "webm", "wmv", "flv", "m4a", "mp3", "wav", "aac", "flac", "ogg", "opus",
];

/// Expand the command-line inputs into a file list.
///
/// Files are taken as given, in order. Directories are walked recursively and
/// contribute their media files sorted by path.
pub fn collect_input_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        if input.is_file() {
            files.push(input.clone());
        } else if input.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && is_media_file(e.path()))
                .map(|e| e.into_path())
                .collect();
            found.sort();
            info!("Found {} media file(s) in {}", found.len(), input.display());
            files.extend(found);
        } else {
            return Err(MediaBatchError::FileNotFound(input.display().to_string()));
        }
    }

    Ok(files)
}

/// Drop repeated inputs, then make sure no two files write the same output.
///
/// `outputs` maps an input to the paths its job writes. Inputs it cannot
/// resolve are kept so their job reports the problem.
pub fn distinct_outputs<F>(files: Vec<PathBuf>, outputs: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&Path) -> Result<Vec<PathBuf>>,
{
    let mut seen = HashSet::new();
    let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
    let mut unique = Vec::with_capacity(files.len());

    for file in files {
        let identity = std::fs::canonicalize(&file).unwrap_or_else(|_| file.clone());
        if !seen.insert(identity) {
            warn!("Skipping repeated input {}", file.display());
            continue;
        }

        if let Ok(paths) = outputs(&file) {
            for path in paths {
                if let Some(previous) = claimed.insert(path.clone(), file.clone()) {
                    return Err(MediaBatchError::Config(format!(
                        "{} and {} would both write {}",
                        previous.display(),
                        file.display(),
                        path.display()
                    )));
                }
            }
        }
        unique.push(file);
    }

    Ok(unique)
}

fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MEDIA_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Wires configuration, job runners and the scheduler together for one invocation.
pub struct Workflow {
    config: Config,
    cancel: CancellationToken,
    show_progress: bool,
}

impl Workflow {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
            show_progress: true,
        }
    }

    /// Token that stops the run when cancelled, e.g. from a Ctrl-C handler.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Send every input through the remote processing service.
    pub async fn process_remote(&self, inputs: &[PathBuf]) -> Result<RunReport> {
        self.config.validate()?;
        let files = collect_input_files(inputs)?;
        let api = Arc::new(AuphonicClient::new(&self.config.remote)?);
        self.process_remote_with(api, Arc::new(TokioClock), files).await
    }

    /// Remote run against an arbitrary service implementation and clock.
    pub async fn process_remote_with(
        &self,
        api: Arc<dyn RemoteApi>,
        clock: Arc<dyn Clock>,
        files: Vec<PathBuf>,
    ) -> Result<RunReport> {
        let plan = self.config.scheduling.plan()?;
        let naming = &self.config.output;
        let files = distinct_outputs(files, |file| Ok(vec![naming.resolve(file)?]))?;
        ensure_output_folder(naming).await?;

        let runner = JobRunner::new(
            api,
            clock,
            self.config.processing.clone(),
            self.config.output.clone(),
            self.config.remote.polling_policy(),
            self.config.remote.status_classifier(),
        )
        .with_cleanup_on_failure(self.config.remote.cleanup_on_failure)
        .with_cancellation(self.cancel.clone());

        info!(
            "Processing {} file(s) remotely into {}",
            files.len(),
            self.config.output.folder.display()
        );
        let report = self
            .schedule(plan, files, |file| runner.run(file))
            .await;
        Ok(report)
    }

    /// Apply a local transform to every input.
    pub async fn process_local(
        &self,
        transform: &dyn LocalTransform,
        inputs: &[PathBuf],
        plan: SchedulingPlan,
    ) -> Result<RunReport> {
        transform.check_availability().await?;
        let files = distinct_outputs(collect_input_files(inputs)?, |file| transform.outputs(file))?;
        ensure_output_folder(transform.naming()).await?;

        info!("Running {} on {} file(s)", transform.description(), files.len());
        let cancel = &self.cancel;
        let report = self
            .schedule(plan, files, |file| async move {
                let started_at = Utc::now();
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(MediaBatchError::Cancelled),
                    result = transform.apply(&file) => result,
                };
                JobOutcome::local(file, result.map_err(|e| e.to_string()), started_at)
            })
            .await;
        Ok(report)
    }

    async fn schedule<F, Fut>(&self, plan: SchedulingPlan, files: Vec<PathBuf>, job: F) -> RunReport
    where
        F: Fn(PathBuf) -> Fut,
        Fut: std::future::Future<Output = JobOutcome>,
    {
        let progress = self.progress_bar(files.len());
        let scheduler = Scheduler::new(plan, self.config.scheduling.failure_policy).with_cancellation(self.cancel.clone());

        let report = scheduler
            .run(files, job, |outcome| {
                progress.set_message(outcome.source_path.display().to_string());
                progress.inc(1);
            })
            .await;
        progress.finish_and_clear();

        if report.halted && !report.not_started.is_empty() {
            warn!("Run halted; {} file(s) were not started", report.not_started.len());
        }
        report
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress || len < 2 {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    }
}
