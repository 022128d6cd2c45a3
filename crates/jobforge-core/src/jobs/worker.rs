//! Worker implementation for job execution
//!
//! A worker takes one queue reference at a time, performs the guarded
//! `pending -> running` transition, runs the executor under the job's
//! deadline and settles the outcome through the store. Executor faults
//! (errors, panics, timeouts) never escape the worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::jobs::{ExecError, Executor, JobId, JobStatus, JobStore, QueueRef};

/// Unique worker identifier
pub type WorkerId = Uuid;

/// Outcome of a single execution attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Execution succeeded; the job is terminally completed
    Completed { output: String },

    /// Execution failed with attempts left; the job is pending again
    Retry { reason: String },

    /// Execution failed with retries exhausted; the job is terminally failed
    Failed { reason: String },

    /// The job was cancelled; its terminal state was not overwritten
    Cancelled,

    /// The reference no longer pointed at a pending job; nothing ran
    Skipped,
}

/// Registry of cooperative-cancel tokens for running jobs
#[derive(Debug, Default)]
pub struct CancelRegistry {
    tokens: DashMap<JobId, CancellationToken>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a token for a job about to run
    pub fn register(&self, id: JobId) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.insert(id, token.clone());
        token
    }

    /// Deregister a job's token once execution has settled
    pub fn remove(&self, id: JobId) {
        self.tokens.remove(&id);
    }

    /// Fire a job's token; returns whether one was registered
    pub fn cancel(&self, id: JobId) -> bool {
        match self.tokens.get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Fire every registered token
    pub fn cancel_all(&self) {
        for entry in self.tokens.iter() {
            entry.value().cancel();
        }
    }

    /// Number of registered tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Shared handles a worker needs to execute jobs
#[derive(Clone)]
pub struct WorkerContext {
    pub store: Arc<JobStore>,
    pub executor: Arc<dyn Executor>,
    pub cancellations: Arc<CancelRegistry>,
}

/// Individual worker
#[derive(Debug)]
pub struct Worker {
    /// Worker ID
    pub id: WorkerId,

    jobs_processed: AtomicU64,
    jobs_succeeded: AtomicU64,
    jobs_failed: AtomicU64,
}

impl Worker {
    /// Create a new worker
    pub fn new() -> Self {
        Self {
            id: WorkerId::new_v4(),
            jobs_processed: AtomicU64::new(0),
            jobs_succeeded: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
        }
    }

    /// Execute the referenced job and settle its outcome in the store.
    ///
    /// Returns `Err` only for store faults; executor faults are converted
    /// into outcomes.
    pub async fn execute(&self, ctx: &WorkerContext, reference: &QueueRef) -> Result<JobOutcome> {
        let id = reference.id;

        // Claim under the record guard; a job cancelled between enqueue and
        // dispatch is dropped without running.
        let claimed = ctx.store.update(id, |job| {
            if job.status == JobStatus::Pending {
                job.mark_running(Utc::now());
            }
        })?;

        match claimed.status {
            JobStatus::Running => {}
            JobStatus::Cancelled => {
                debug!(job_id = %id, "dropping cancelled job at dispatch");
                return Ok(JobOutcome::Skipped);
            }
            other => {
                warn!(job_id = %id, status = %other, "refusing to run job outside pending state");
                return Ok(JobOutcome::Skipped);
            }
        }

        self.jobs_processed.fetch_add(1, Ordering::Relaxed);

        let token = ctx.cancellations.register(id);

        // A cancel can land between the claim and the token registration;
        // re-check so it is honoured before any work starts.
        if ctx.store.get(id)?.status == JobStatus::Cancelled {
            ctx.cancellations.remove(id);
            return Ok(JobOutcome::Cancelled);
        }

        debug!(
            job_id = %id,
            worker_id = %self.id,
            attempt = claimed.retry_count + 1,
            max_attempts = claimed.max_retries + 1,
            "executing job"
        );

        // The executor runs in its own task so a panic surfaces as a
        // JoinError instead of tearing down the worker.
        let run = {
            let executor = ctx.executor.clone();
            let command = claimed.command.clone();
            let token = token.clone();
            tokio::spawn(async move { executor.run(&command, token).await })
        };

        let result = match tokio::time::timeout(Duration::from_millis(claimed.timeout_ms), run)
            .await
        {
            Ok(Ok(run_result)) => run_result,
            Ok(Err(join_err)) if join_err.is_panic() => {
                Err(ExecError::Panicked(join_err.to_string()))
            }
            Ok(Err(join_err)) => Err(ExecError::Failed(format!(
                "executor task aborted: {}",
                join_err
            ))),
            Err(_elapsed) => {
                token.cancel();
                Err(ExecError::TimedOut(claimed.timeout_ms))
            }
        };

        ctx.cancellations.remove(id);
        self.settle(ctx, id, result)
    }

    /// Write the execution result back through the store per the lifecycle
    fn settle(
        &self,
        ctx: &WorkerContext,
        id: JobId,
        result: std::result::Result<String, ExecError>,
    ) -> Result<JobOutcome> {
        match result {
            Ok(output) => {
                let snapshot = ctx.store.update(id, |job| {
                    if job.status == JobStatus::Running {
                        job.mark_completed(output.clone(), Utc::now());
                    }
                })?;
                if snapshot.status == JobStatus::Completed {
                    self.jobs_succeeded.fetch_add(1, Ordering::Relaxed);
                    Ok(JobOutcome::Completed { output })
                } else {
                    // A concurrent cancel owns the terminal state
                    Ok(JobOutcome::Cancelled)
                }
            }
            Err(ExecError::Cancelled) => {
                if ctx.store.get(id)?.status == JobStatus::Cancelled {
                    Ok(JobOutcome::Cancelled)
                } else {
                    // The executor reported cancellation nobody requested;
                    // run the failure flow so the job is not left running.
                    self.fail_flow(ctx, id, ExecError::Cancelled.to_string())
                }
            }
            Err(err) => self.fail_flow(ctx, id, err.to_string()),
        }
    }

    /// Failure flow: bump the retry count and either requeue or fail
    fn fail_flow(&self, ctx: &WorkerContext, id: JobId, reason: String) -> Result<JobOutcome> {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        let snapshot = ctx.store.update(id, |job| {
            if job.status == JobStatus::Running {
                job.record_failure(&reason, Utc::now());
            }
        })?;
        match snapshot.status {
            JobStatus::Pending => Ok(JobOutcome::Retry { reason }),
            JobStatus::Failed => Ok(JobOutcome::Failed { reason }),
            _ => Ok(JobOutcome::Cancelled),
        }
    }

    /// Execution counters for this worker
    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            id: self.id,
            jobs_processed: self.jobs_processed.load(Ordering::Relaxed),
            jobs_succeeded: self.jobs_succeeded.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for Worker {
    fn default() -> Self {
        Self::new()
    }
}

/// Worker statistics
#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub id: WorkerId,
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
}

impl WorkerStats {
    /// Fraction of processed jobs that succeeded
    pub fn success_rate(&self) -> f64 {
        if self.jobs_processed == 0 {
            0.0
        } else {
            self.jobs_succeeded as f64 / self.jobs_processed as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{Job, NewJob};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Executor that always succeeds, echoing the command back
    struct EchoExecutor;

    #[async_trait]
    impl Executor for EchoExecutor {
        async fn run(
            &self,
            command: &str,
            _cancel: CancellationToken,
        ) -> std::result::Result<String, ExecError> {
            Ok(command.to_string())
        }
    }

    /// Executor that fails a fixed number of times before succeeding
    struct FlakyExecutor {
        failures_left: Mutex<u32>,
    }

    impl FlakyExecutor {
        fn failing(times: u32) -> Self {
            Self {
                failures_left: Mutex::new(times),
            }
        }
    }

    #[async_trait]
    impl Executor for FlakyExecutor {
        async fn run(
            &self,
            command: &str,
            _cancel: CancellationToken,
        ) -> std::result::Result<String, ExecError> {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                Err(ExecError::Failed("transient failure".into()))
            } else {
                Ok(command.to_string())
            }
        }
    }

    /// Executor that sleeps until cancelled or the given duration elapses
    struct SleepExecutor {
        duration: Duration,
    }

    #[async_trait]
    impl Executor for SleepExecutor {
        async fn run(
            &self,
            _command: &str,
            cancel: CancellationToken,
        ) -> std::result::Result<String, ExecError> {
            tokio::select! {
                _ = tokio::time::sleep(self.duration) => Ok("slept".into()),
                _ = cancel.cancelled() => Err(ExecError::Cancelled),
            }
        }
    }

    /// Executor that panics
    struct PanickingExecutor;

    #[async_trait]
    impl Executor for PanickingExecutor {
        async fn run(
            &self,
            _command: &str,
            _cancel: CancellationToken,
        ) -> std::result::Result<String, ExecError> {
            panic!("executor exploded");
        }
    }

    fn context(executor: Arc<dyn Executor>) -> WorkerContext {
        WorkerContext {
            store: Arc::new(JobStore::new()),
            executor,
            cancellations: Arc::new(CancelRegistry::new()),
        }
    }

    fn seed(ctx: &WorkerContext, new_job: NewJob) -> QueueRef {
        let job = Job::from_new(new_job, 1, Utc::now());
        let reference = QueueRef::of(&job);
        ctx.store.insert(job).unwrap();
        reference
    }

    #[tokio::test]
    async fn test_success_completes_job() {
        let ctx = context(Arc::new(EchoExecutor));
        let reference = seed(&ctx, NewJob::new("echo hi"));
        let worker = Worker::new();

        let outcome = worker.execute(&ctx, &reference).await.unwrap();
        assert_eq!(
            outcome,
            JobOutcome::Completed {
                output: "echo hi".into()
            }
        );

        let job = ctx.store.get(reference.id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.as_deref(), Some("echo hi"));
        assert_eq!(job.retry_count, 0);
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_some());
        assert!(ctx.cancellations.is_empty());
    }

    #[tokio::test]
    async fn test_failure_with_attempts_left_requeues() {
        let ctx = context(Arc::new(FlakyExecutor::failing(10)));
        let reference = seed(&ctx, NewJob::new("x").with_max_retries(2));
        let worker = Worker::new();

        let outcome = worker.execute(&ctx, &reference).await.unwrap();
        assert!(matches!(outcome, JobOutcome::Retry { .. }));

        let job = ctx.store.get(reference.id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 1);
        assert!(job.error.is_none());
        assert!(job.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_retries_exhaust_to_failed() {
        let ctx = context(Arc::new(FlakyExecutor::failing(10)));
        let reference = seed(&ctx, NewJob::new("x").with_max_retries(1));
        let worker = Worker::new();

        let first = worker.execute(&ctx, &reference).await.unwrap();
        assert!(matches!(first, JobOutcome::Retry { .. }));

        let second = worker.execute(&ctx, &reference).await.unwrap();
        assert!(matches!(second, JobOutcome::Failed { .. }));

        let job = ctx.store.get(reference.id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.retry_count, 2);
        assert!(job.error.as_deref().unwrap().contains("transient failure"));
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_flaky_executor_eventually_succeeds() {
        let ctx = context(Arc::new(FlakyExecutor::failing(2)));
        let reference = seed(&ctx, NewJob::new("x").with_max_retries(2));
        let worker = Worker::new();

        assert!(matches!(
            worker.execute(&ctx, &reference).await.unwrap(),
            JobOutcome::Retry { .. }
        ));
        assert!(matches!(
            worker.execute(&ctx, &reference).await.unwrap(),
            JobOutcome::Retry { .. }
        ));
        assert!(matches!(
            worker.execute(&ctx, &reference).await.unwrap(),
            JobOutcome::Completed { .. }
        ));

        let job = ctx.store.get(reference.id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.retry_count, 2);
    }

    #[tokio::test]
    async fn test_timeout_fails_with_deadline_reason() {
        let ctx = context(Arc::new(SleepExecutor {
            duration: Duration::from_secs(30),
        }));
        let reference = seed(&ctx, NewJob::new("slow").with_timeout_ms(50).with_max_retries(0));
        let worker = Worker::new();

        let outcome = worker.execute(&ctx, &reference).await.unwrap();
        match outcome {
            JobOutcome::Failed { reason } => {
                assert!(reason.contains("timed out after 50 ms"), "{reason}")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let job = ctx.store.get(reference.id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_panic_is_captured_as_failure() {
        let ctx = context(Arc::new(PanickingExecutor));
        let reference = seed(&ctx, NewJob::new("boom").with_max_retries(0));
        let worker = Worker::new();

        let outcome = worker.execute(&ctx, &reference).await.unwrap();
        match outcome {
            JobOutcome::Failed { reason } => {
                assert!(reason.contains("panicked"), "{reason}")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let job = ctx.store.get(reference.id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancel_during_run() {
        let ctx = context(Arc::new(SleepExecutor {
            duration: Duration::from_secs(30),
        }));
        let reference = seed(&ctx, NewJob::new("slow"));
        let worker = Worker::new();

        let run = {
            let ctx = ctx.clone();
            let reference = reference.clone();
            tokio::spawn(async move { worker.execute(&ctx, &reference).await })
        };

        // Wait for the job to reach running, then cancel it the way the
        // boundary does: terminal state first, then fire the token.
        let id = reference.id;
        loop {
            if ctx.store.get(id).unwrap().status == JobStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        ctx.store
            .update(id, |job| job.mark_cancelled(Utc::now()))
            .unwrap();
        ctx.cancellations.cancel(id);

        let outcome = run.await.unwrap().unwrap();
        assert_eq!(outcome, JobOutcome::Cancelled);

        let job = ctx.store.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_cancelled_before_dispatch_is_skipped() {
        let ctx = context(Arc::new(EchoExecutor));
        let reference = seed(&ctx, NewJob::new("never"));
        ctx.store
            .update(reference.id, |job| job.mark_cancelled(Utc::now()))
            .unwrap();
        let worker = Worker::new();

        let outcome = worker.execute(&ctx, &reference).await.unwrap();
        assert_eq!(outcome, JobOutcome::Skipped);

        let job = ctx.store.get(reference.id).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.started_at.is_none());
        assert_eq!(worker.stats().jobs_processed, 0);
    }

    #[tokio::test]
    async fn test_worker_counters() {
        let ctx = context(Arc::new(FlakyExecutor::failing(1)));
        let reference = seed(&ctx, NewJob::new("x").with_max_retries(1));
        let worker = Worker::new();

        worker.execute(&ctx, &reference).await.unwrap();
        worker.execute(&ctx, &reference).await.unwrap();

        let stats = worker.stats();
        assert_eq!(stats.jobs_processed, 2);
        assert_eq!(stats.jobs_succeeded, 1);
        assert_eq!(stats.jobs_failed, 1);
        assert!((stats.success_rate() - 0.5).abs() < f64::EPSILON);
    }
}
