use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::model::Job;
use crate::error::{MediaBatchError, Result};

/// Lifecycle of one file in the remote pipeline.
///
/// Forward order: PENDING → CREATED → UPLOADED → STARTED → POLLING (⟲) →
/// SUCCEEDED → DOWNLOADED → CLEANED, with FAILED reachable from every state
/// before DOWNLOADED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Created,
    Uploaded,
    Started,
    Polling,
    Succeeded,
    Downloaded,
    Cleaned,
    Failed,
}

impl JobState {
    /// No further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Cleaned | JobState::Failed)
    }

    /// The artifact is on disk. A job whose remote cleanup failed stays in DOWNLOADED.
    pub fn is_success(&self) -> bool {
        matches!(self, JobState::Downloaded | JobState::Cleaned)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Pending => "PENDING",
            JobState::Created => "CREATED",
            JobState::Uploaded => "UPLOADED",
            JobState::Started => "STARTED",
            JobState::Polling => "POLLING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Downloaded => "DOWNLOADED",
            JobState::Cleaned => "CLEANED",
            JobState::Failed => "FAILED",
        };
        write!(f, "{name}")
    }
}

/// Something that happened to a job, fed to [`StateMachine::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Created { remote_id: String },
    Uploaded,
    Started,
    PollingBegan,
    StillProcessing,
    Completed { result_url: String },
    Downloaded,
    Cleaned,
    Failed { reason: String },
}

/// How a polled status code is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Done,
    Error,
    InProgress,
}

/// Maps the service's integer status codes onto [`StatusClass`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusClassifier {
    done: i64,
    errors: HashSet<i64>,
}

impl StatusClassifier {
    pub fn new<I: IntoIterator<Item = i64>>(done: i64, errors: I) -> Self {
        Self {
            done,
            errors: errors.into_iter().collect(),
        }
    }

    pub fn classify(&self, status_code: i64) -> StatusClass {
        if status_code == self.done {
            StatusClass::Done
        } else if self.errors.contains(&status_code) {
            StatusClass::Error
        } else {
            StatusClass::InProgress
        }
    }
}

/// Pure transition function over [`Job`].
pub struct StateMachine;

impl StateMachine {
    /// Compute the state `event` leads to from `state`, or `None` if the edge does not exist.
    pub fn next_state(state: JobState, event: &JobEvent) -> Option<JobState> {
        use JobState::*;

        match (state, event) {
            (Pending, JobEvent::Created { .. }) => Some(Created),
            (Created, JobEvent::Uploaded) => Some(Uploaded),
            (Uploaded, JobEvent::Started) => Some(Started),
            (Started, JobEvent::PollingBegan) => Some(Polling),
            (Polling, JobEvent::StillProcessing) => Some(Polling),
            (Polling, JobEvent::Completed { .. }) => Some(Succeeded),
            (Succeeded, JobEvent::Downloaded) => Some(Downloaded),
            (Downloaded, JobEvent::Cleaned) => Some(Cleaned),
            (Pending | Created | Uploaded | Started | Polling | Succeeded, JobEvent::Failed { .. }) => Some(Failed),
            _ => None,
        }
    }

    /// Apply `event` to `job`, recording the left state in its history.
    ///
    /// Illegal edges leave the job untouched and return an error.
    pub fn apply(job: &mut Job, event: JobEvent) -> Result<JobState> {
        let next = Self::next_state(job.state, &event).ok_or_else(|| {
            MediaBatchError::Transition(format!("{:?} is not allowed in state {}", event, job.state))
        })?;

        match event {
            JobEvent::Created { remote_id } => job.remote_id = Some(remote_id),
            JobEvent::Completed { result_url } => job.result_url = Some(result_url),
            JobEvent::StillProcessing => job.poll_count += 1,
            JobEvent::Failed { reason } => job.error = Some(reason),
            _ => {}
        }

        job.history.push(job.state);
        job.state = next;
        Ok(next)
    }
}
