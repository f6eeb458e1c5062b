//! Runs a per-file job function over a file list under a concurrency policy.
//!
//! All concurrency is cooperative: jobs are futures polled on the caller's
//! task, so "concurrent" means interleaved I/O, not parallel CPU work.

use std::future::Future;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::job::JobOutcome;

/// When each job is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingPlan {
    /// One at a time, in input order.
    Sequential,
    /// Everything at once, no cap.
    Concurrent,
    /// Consecutive chunks of the given size; a chunk starts once the previous one has fully settled.
    Batched(NonZeroUsize),
}

/// What a failed job means for the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop dispatching after the first failure. Under `Concurrent`, in-flight jobs are cancelled;
    /// under `Batched`, the current chunk settles first.
    #[default]
    FailFast,
    /// Run every file and report all failures at the end.
    CollectAll,
}

/// Aggregated result of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Outcomes of dispatched jobs, in input order
    pub outcomes: Vec<JobOutcome>,
    /// Files never dispatched because the run halted
    pub not_started: Vec<PathBuf>,
    /// A failure or cancellation stopped the run early
    pub halted: bool,
}

impl RunReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn is_success(&self) -> bool {
        !self.halted && self.not_started.is_empty() && self.failed().next().is_none()
    }

    /// Process exit status: 0 all good, 2 halted by fail-fast or cancellation, 3 partial success.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else if self.halted {
            2
        } else {
            3
        }
    }
}

pub struct Scheduler {
    plan: SchedulingPlan,
    failure_policy: FailurePolicy,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(plan: SchedulingPlan, failure_policy: FailurePolicy) -> Self {
        Self {
            plan,
            failure_policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Share a token with the jobs so a fail-fast halt or Ctrl-C reaches them.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn plan(&self) -> SchedulingPlan {
        self.plan
    }

    /// Run `job` for every file. `on_settled` is called once per job as soon as it settles.
    pub async fn run<F, Fut, S>(&self, files: Vec<PathBuf>, job: F, mut on_settled: S) -> RunReport
    where
        F: Fn(PathBuf) -> Fut,
        Fut: Future<Output = JobOutcome>,
        S: FnMut(&JobOutcome),
    {
        info!("Scheduling {} file(s) with {:?}, {:?}", files.len(), self.plan, self.failure_policy);

        let mut report = RunReport::default();
        match self.plan {
            SchedulingPlan::Sequential => {
                self.run_sequential(files, &job, &mut on_settled, &mut report).await;
            }
            SchedulingPlan::Concurrent if self.cancel.is_cancelled() => {
                report.not_started.extend(files);
            }
            SchedulingPlan::Concurrent => {
                let halt_on_failure = self.failure_policy == FailurePolicy::FailFast;
                self.run_chunk(files, &job, &mut on_settled, &mut report, halt_on_failure).await;
            }
            SchedulingPlan::Batched(size) => {
                self.run_batched(files, size, &job, &mut on_settled, &mut report).await;
            }
        }

        if self.cancel.is_cancelled() {
            report.halted = true;
        }
        report
    }

    async fn run_sequential<F, Fut, S>(&self, files: Vec<PathBuf>, job: &F, on_settled: &mut S, report: &mut RunReport)
    where
        F: Fn(PathBuf) -> Fut,
        Fut: Future<Output = JobOutcome>,
        S: FnMut(&JobOutcome),
    {
        let mut files = files.into_iter();
        while let Some(file) = files.next() {
            if self.cancel.is_cancelled() {
                report.not_started.push(file);
                report.not_started.extend(files);
                break;
            }

            let outcome = job(file).await;
            self.observe(&outcome, on_settled);
            let failed = !outcome.is_success();
            report.outcomes.push(outcome);

            if failed && self.failure_policy == FailurePolicy::FailFast {
                report.halted = true;
                report.not_started.extend(files);
                break;
            }
        }
    }

    async fn run_batched<F, Fut, S>(
        &self,
        files: Vec<PathBuf>,
        size: NonZeroUsize,
        job: &F,
        on_settled: &mut S,
        report: &mut RunReport,
    ) where
        F: Fn(PathBuf) -> Fut,
        Fut: Future<Output = JobOutcome>,
        S: FnMut(&JobOutcome),
    {
        let chunks: Vec<Vec<PathBuf>> = files.chunks(size.get()).map(<[PathBuf]>::to_vec).collect();
        let total = chunks.len();
        let mut chunks = chunks.into_iter().enumerate();

        while let Some((index, chunk)) = chunks.next() {
            if self.cancel.is_cancelled() {
                report.not_started.extend(chunk);
                report.not_started.extend(chunks.flat_map(|(_, rest)| rest));
                break;
            }

            info!("Starting batch {}/{} ({} file(s))", index + 1, total, chunk.len());
            let failures_before = report.failed().count();
            self.run_chunk(chunk, job, on_settled, report, false).await;

            if report.failed().count() > failures_before && self.failure_policy == FailurePolicy::FailFast {
                report.halted = true;
                report.not_started.extend(chunks.flat_map(|(_, rest)| rest));
                break;
            }
        }
    }

    /// Dispatch every file at once and wait for all of them to settle.
    /// With `halt_on_failure`, the first failure cancels the jobs still in flight.
    async fn run_chunk<F, Fut, S>(
        &self,
        files: Vec<PathBuf>,
        job: &F,
        on_settled: &mut S,
        report: &mut RunReport,
        halt_on_failure: bool,
    ) where
        F: Fn(PathBuf) -> Fut,
        Fut: Future<Output = JobOutcome>,
        S: FnMut(&JobOutcome),
    {
        let mut in_flight: FuturesUnordered<_> = files
            .into_iter()
            .enumerate()
            .map(|(index, file)| {
                let fut = job(file);
                async move { (index, fut.await) }
            })
            .collect();

        let mut settled = Vec::with_capacity(in_flight.len());
        while let Some((index, outcome)) = in_flight.next().await {
            self.observe(&outcome, on_settled);
            if halt_on_failure && !outcome.is_success() && !report.halted {
                warn!("Halting run after failure of {}", outcome.source_path.display());
                report.halted = true;
                self.cancel.cancel();
            }
            settled.push((index, outcome));
        }

        settled.sort_by_key(|(index, _)| *index);
        report.outcomes.extend(settled.into_iter().map(|(_, outcome)| outcome));
    }

    fn observe<S: FnMut(&JobOutcome)>(&self, outcome: &JobOutcome, on_settled: &mut S) {
        match &outcome.error {
            None => info!("Completed {} in {} ms", outcome.source_path.display(), outcome.duration_ms()),
            Some(e) => error!("Failed {} after {} ms: {}", outcome.source_path.display(), outcome.duration_ms(), e),
        }
        on_settled(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Start(String),
        Settle(String),
    }

    type Log = Arc<Mutex<Vec<Event>>>;
    type BoxedOutcome = std::pin::Pin<Box<dyn Future<Output = JobOutcome>>>;

    fn name(path: &std::path::Path) -> String {
        path.to_string_lossy().to_string()
    }

    fn files(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    /// Job that sleeps briefly and fails for names in `failing`.
    fn scripted_job(log: Log, failing: &'static [&'static str]) -> impl Fn(PathBuf) -> BoxedOutcome {
        move |file: PathBuf| -> BoxedOutcome {
            let log = log.clone();
            Box::pin(async move {
                let file_name = name(&file);
                log.lock().unwrap().push(Event::Start(file_name.clone()));
                tokio::time::sleep(Duration::from_millis(5)).await;
                log.lock().unwrap().push(Event::Settle(file_name.clone()));
                let result = if failing.contains(&file_name.as_str()) {
                    Err(format!("{file_name} exploded"))
                } else {
                    Ok(vec![PathBuf::from("out").join(&file_name)])
                };
                JobOutcome::local(file, result, Utc::now())
            })
        }
    }

    fn position(log: &[Event], event: Event) -> usize {
        log.iter().position(|e| *e == event).unwrap_or_else(|| panic!("{event:?} not logged"))
    }

    #[tokio::test]
    async fn sequential_runs_in_order() {
        let log: Log = Arc::default();
        let scheduler = Scheduler::new(SchedulingPlan::Sequential, FailurePolicy::FailFast);
        let report = scheduler.run(files(&["A", "B", "C"]), scripted_job(log.clone(), &[]), |_| {}).await;

        assert!(report.is_success());
        assert_eq!(report.exit_code(), 0);
        let log = log.lock().unwrap().clone();
        assert_eq!(
            log,
            vec![
                Event::Start("A".into()),
                Event::Settle("A".into()),
                Event::Start("B".into()),
                Event::Settle("B".into()),
                Event::Start("C".into()),
                Event::Settle("C".into()),
            ]
        );
    }

    #[tokio::test]
    async fn sequential_fail_fast_never_starts_the_rest() {
        let log: Log = Arc::default();
        let scheduler = Scheduler::new(SchedulingPlan::Sequential, FailurePolicy::FailFast);
        let report = scheduler.run(files(&["A", "B", "C"]), scripted_job(log.clone(), &["B"]), |_| {}).await;

        let log = log.lock().unwrap().clone();
        assert!(position(&log, Event::Settle("A".into())) < position(&log, Event::Start("B".into())));
        assert!(!log.contains(&Event::Start("C".into())));
        assert!(report.halted);
        assert_eq!(report.not_started, files(&["C"]));
        assert_eq!(report.failed().count(), 1);
        assert_eq!(report.exit_code(), 2);
    }

    #[tokio::test]
    async fn sequential_collect_all_continues_after_failure() {
        let log: Log = Arc::default();
        let scheduler = Scheduler::new(SchedulingPlan::Sequential, FailurePolicy::CollectAll);
        let report = scheduler.run(files(&["A", "B", "C"]), scripted_job(log.clone(), &["B"]), |_| {}).await;

        let log = log.lock().unwrap().clone();
        assert!(position(&log, Event::Settle("B".into())) < position(&log, Event::Start("C".into())));
        assert!(!report.halted);
        assert_eq!(report.succeeded().count(), 2);
        assert_eq!(report.exit_code(), 3);
    }

    #[tokio::test]
    async fn concurrent_dispatches_everything_before_anything_settles() {
        let log: Log = Arc::default();
        let scheduler = Scheduler::new(SchedulingPlan::Concurrent, FailurePolicy::CollectAll);
        let report = scheduler.run(files(&["A", "B", "C", "D"]), scripted_job(log.clone(), &[]), |_| {}).await;

        let log = log.lock().unwrap().clone();
        let first_settle = log.iter().position(|e| matches!(e, Event::Settle(_))).unwrap();
        assert_eq!(first_settle, 4);
        let sources: Vec<_> = report.outcomes.iter().map(|o| name(&o.source_path)).collect();
        assert_eq!(sources, vec!["A", "B", "C", "D"]);
    }

    #[tokio::test]
    async fn concurrent_fail_fast_cancels_in_flight_jobs() {
        let cancel = CancellationToken::new();
        let scheduler = Scheduler::new(SchedulingPlan::Concurrent, FailurePolicy::FailFast).with_cancellation(cancel.clone());
        let job = |file: PathBuf| {
            let cancel = cancel.clone();
            async move {
                let result = if file == PathBuf::from("bad") {
                    Err("rejected".to_string())
                } else {
                    tokio::select! {
                        _ = cancel.cancelled() => Err("Cancelled".to_string()),
                        _ = tokio::time::sleep(Duration::from_secs(30)) => Ok(vec![]),
                    }
                };
                JobOutcome::local(file, result, Utc::now())
            }
        };

        let report = scheduler.run(files(&["slow-1", "bad", "slow-2"]), job, |_| {}).await;
        assert!(report.halted);
        assert_eq!(report.failed().count(), 3);
        assert_eq!(report.outcomes[0].error.as_deref(), Some("Cancelled"));
        assert_eq!(report.exit_code(), 2);
    }

    #[tokio::test]
    async fn batched_chunks_settle_before_the_next_starts() {
        let log: Log = Arc::default();
        let size = NonZeroUsize::new(2).unwrap();
        let scheduler = Scheduler::new(SchedulingPlan::Batched(size), FailurePolicy::FailFast);
        let mut settled = Vec::new();
        let report = scheduler
            .run(files(&["A", "B", "C", "D", "E"]), scripted_job(log.clone(), &[]), |o| {
                settled.push(name(&o.source_path))
            })
            .await;

        assert!(report.is_success());
        assert_eq!(settled.len(), 5);
        let log = log.lock().unwrap().clone();
        for earlier in ["A", "B"] {
            for later in ["C", "D"] {
                assert!(position(&log, Event::Settle(earlier.into())) < position(&log, Event::Start(later.into())));
            }
        }
        for earlier in ["C", "D"] {
            assert!(position(&log, Event::Settle(earlier.into())) < position(&log, Event::Start("E".into())));
        }
        // Within a chunk both jobs are dispatched before either settles.
        assert!(position(&log, Event::Start("B".into())) < position(&log, Event::Settle("A".into())));
    }

    #[tokio::test]
    async fn batched_fail_fast_finishes_the_chunk_then_halts() {
        let log: Log = Arc::default();
        let size = NonZeroUsize::new(2).unwrap();
        let scheduler = Scheduler::new(SchedulingPlan::Batched(size), FailurePolicy::FailFast);
        let report = scheduler
            .run(files(&["A", "B", "C", "D", "E"]), scripted_job(log.clone(), &["A"]), |_| {})
            .await;

        let log = log.lock().unwrap().clone();
        assert!(log.contains(&Event::Settle("B".into())));
        assert!(!log.contains(&Event::Start("C".into())));
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.not_started, files(&["C", "D", "E"]));
        assert!(report.halted);
    }

    #[tokio::test]
    async fn cancelled_token_dispatches_nothing() {
        let plans = [
            SchedulingPlan::Sequential,
            SchedulingPlan::Concurrent,
            SchedulingPlan::Batched(NonZeroUsize::new(1).unwrap()),
        ];
        for plan in plans {
            let cancel = CancellationToken::new();
            cancel.cancel();
            let log: Log = Arc::default();
            let scheduler = Scheduler::new(plan, FailurePolicy::CollectAll).with_cancellation(cancel);
            let report = scheduler.run(files(&["A", "B"]), scripted_job(log.clone(), &[]), |_| {}).await;

            assert!(log.lock().unwrap().is_empty(), "{plan:?}");
            assert!(report.outcomes.is_empty(), "{plan:?}");
            assert_eq!(report.not_started, files(&["A", "B"]), "{plan:?}");
            assert!(report.halted, "{plan:?}");
            assert_eq!(report.exit_code(), 2);
        }
    }

    #[test]
    fn failure_policy_serde_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: FailurePolicy,
        }
        let parsed: Wrapper = toml::from_str(r#"policy = "collect-all""#).unwrap();
        assert_eq!(parsed.policy, FailurePolicy::CollectAll);
        let parsed: Wrapper = toml::from_str(r#"policy = "fail-fast""#).unwrap();
        assert_eq!(parsed.policy, FailurePolicy::FailFast);
    }
}
