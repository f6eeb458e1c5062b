use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use super::state::JobState;

/// One file's journey through the remote pipeline.
///
/// A job is owned by the single task driving it; nothing else mutates it.
#[derive(Debug, Clone)]
pub struct Job {
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    /// Assigned by the service once creation succeeds
    pub remote_id: Option<String>,
    pub state: JobState,
    /// States left so far, in order
    pub history: Vec<JobState>,
    /// Set on reaching SUCCEEDED
    pub result_url: Option<String>,
    /// Polls that came back still in progress
    pub poll_count: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(source_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            source_path,
            output_path,
            remote_id: None,
            state: JobState::Pending,
            history: Vec::new(),
            result_url: None,
            poll_count: 0,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Display label sent to the service and used in log lines.
    pub fn label(&self) -> String {
        self.source_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source_path.display().to_string())
    }
}

/// Settled result of one scheduled job, remote or local.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub source_path: PathBuf,
    pub output_paths: Vec<PathBuf>,
    /// Remote pipeline only; `None` for local transforms
    pub final_state: Option<JobState>,
    pub history: Vec<JobState>,
    pub error: Option<String>,
    /// Best-effort remote deletion that did not go through
    pub cleanup_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobOutcome {
    /// Build the outcome of a remote job that reached a final state.
    pub fn from_job(job: &Job, cleanup_error: Option<String>) -> Self {
        let mut history = job.history.clone();
        history.push(job.state);

        Self {
            source_path: job.source_path.clone(),
            output_paths: if job.state.is_success() {
                vec![job.output_path.clone()]
            } else {
                Vec::new()
            },
            final_state: Some(job.state),
            history,
            error: job.error.clone(),
            cleanup_error,
            started_at: job.created_at,
            finished_at: Utc::now(),
        }
    }

    /// Outcome of a local transform.
    pub fn local(source_path: PathBuf, result: Result<Vec<PathBuf>, String>, started_at: DateTime<Utc>) -> Self {
        let (output_paths, error) = match result {
            Ok(paths) => (paths, None),
            Err(message) => (Vec::new(), Some(message)),
        };

        Self {
            source_path,
            output_paths,
            final_state: None,
            history: Vec::new(),
            error,
            cleanup_error: None,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// A job that failed before it could be created, e.g. an unusable file name.
    pub fn rejected(source_path: PathBuf, error: String) -> Self {
        let now = Utc::now();
        Self {
            source_path,
            output_paths: Vec::new(),
            final_state: Some(JobState::Failed),
            history: vec![JobState::Pending, JobState::Failed],
            error: Some(error),
            cleanup_error: None,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Wall-clock time from start to settlement
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobEvent, StateMachine};

    #[test]
    fn job_creation_defaults() {
        let job = Job::new(PathBuf::from("in/ep01.wav"), PathBuf::from("out/ep01-auphonic.wav"));
        assert_eq!(job.state, JobState::Pending);
        assert!(job.remote_id.is_none());
        assert!(job.history.is_empty());
        assert_eq!(job.label(), "ep01.wav");
    }

    #[test]
    fn outcome_from_failed_job_has_no_output() {
        let mut job = Job::new(PathBuf::from("a.wav"), PathBuf::from("out/a.wav"));
        StateMachine::apply(&mut job, JobEvent::Failed { reason: "no credit".into() }).unwrap();

        let outcome = JobOutcome::from_job(&job, None);
        assert!(!outcome.is_success());
        assert!(outcome.output_paths.is_empty());
        assert_eq!(outcome.history, vec![JobState::Pending, JobState::Failed]);
        assert_eq!(outcome.final_state, Some(JobState::Failed));
    }

    #[test]
    fn local_outcome() {
        let ok = JobOutcome::local(PathBuf::from("a.mp4"), Ok(vec![PathBuf::from("filter/a.mp4")]), Utc::now());
        assert!(ok.is_success());
        assert!(ok.final_state.is_none());

        let failed = JobOutcome::local(PathBuf::from("b.mp4"), Err("ffmpeg exited 1".into()), Utc::now());
        assert_eq!(failed.error.as_deref(), Some("ffmpeg exited 1"));
        assert!(failed.duration_ms() >= 0);
    }
}
