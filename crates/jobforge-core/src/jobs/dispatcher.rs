//! Dispatcher: pairs pending jobs with workers and drives state transitions
//!
//! One logical loop. Each iteration backs off while the pool is saturated,
//! pops the highest-priority pending reference, leases a worker and spawns
//! the execution so the loop never blocks on a single slow job. A supervisor
//! wraps the loop and restarts it with bounded exponential backoff when it
//! faults.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DispatcherConfig;
use crate::jobs::pool::{RestartBudget, WorkerLease, WorkerPool};
use crate::jobs::queue::{PendingQueue, QueueRef};
use crate::jobs::store::JobStore;
use crate::jobs::worker::{CancelRegistry, JobOutcome, WorkerContext};
use crate::jobs::{Executor, JobStatus};

/// Exponential backoff for supervisor restarts
#[derive(Debug)]
struct RestartBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
    attempt: u32,
}

impl RestartBackoff {
    fn new() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
            attempt: 0,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let exponent = self.attempt as f64;
        self.attempt = self.attempt.saturating_add(1);

        let delay_secs = self.initial.as_secs_f64() * self.multiplier.powf(exponent);
        let delay_secs = delay_secs.min(self.max.as_secs_f64());

        let jitter_range = delay_secs * self.jitter;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };

        Duration::from_secs_f64((delay_secs + jitter).max(0.0))
    }
}

/// The scheduling loop and its collaborators
pub struct Dispatcher {
    queue: Arc<PendingQueue>,
    pool: Arc<WorkerPool>,
    context: WorkerContext,
    config: DispatcherConfig,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        store: Arc<JobStore>,
        queue: Arc<PendingQueue>,
        pool: Arc<WorkerPool>,
        executor: Arc<dyn Executor>,
        cancellations: Arc<CancelRegistry>,
        config: DispatcherConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            pool,
            context: WorkerContext {
                store,
                executor,
                cancellations,
            },
            config,
            shutdown,
        }
    }

    /// Spawn the supervised dispatch loop
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.supervise().await })
    }

    /// Supervisor: restart the loop on faults, bounded per rolling window
    async fn supervise(self: Arc<Self>) {
        let mut backoff = RestartBackoff::new();
        let mut budget = RestartBudget::new(
            self.config.max_restarts,
            self.config.restart_window(),
        );

        loop {
            let loop_task = tokio::spawn({
                let this = self.clone();
                async move { this.run_loop().await }
            });

            match loop_task.await {
                Ok(()) => break,
                Err(join_err) => {
                    error!(error = %join_err, "dispatcher loop crashed");
                    if self.shutdown.is_cancelled() {
                        break;
                    }
                    if !budget.allow(Instant::now()) {
                        error!("dispatcher restart budget exhausted; giving up");
                        break;
                    }
                    let delay = backoff.next_delay();
                    warn!(delay_ms = delay.as_millis() as u64, "restarting dispatcher");
                    if !self.sleep_cancellable(delay).await {
                        break;
                    }
                }
            }
        }

        info!("dispatcher stopped");
    }

    async fn run_loop(self: Arc<Self>) {
        info!("dispatcher running");
        while !self.shutdown.is_cancelled() {
            self.tick().await;
        }
    }

    /// One scheduling iteration
    async fn tick(&self) {
        if self.pool.busy_count().await >= self.pool.max_workers() {
            self.sleep_cancellable(self.config.capacity_backoff()).await;
            return;
        }

        let Some(reference) = self.queue.pop_front().await else {
            self.pool.cleanup_idle(self.pool.min_workers()).await;
            self.sleep_cancellable(self.config.poll_interval()).await;
            return;
        };

        match self.pool.acquire().await {
            Some(lease) => self.spawn_execution(lease, reference),
            None => {
                // The reference keeps its place: its created_at predates any
                // concurrently enqueued peer of the same priority.
                self.queue.push_front(reference).await;
                self.sleep_cancellable(self.config.capacity_backoff()).await;
            }
        }
    }

    /// Run one job on a leased worker without blocking the loop
    fn spawn_execution(&self, lease: WorkerLease, reference: QueueRef) {
        let context = self.context.clone();
        let queue = self.queue.clone();
        let pool = self.pool.clone();

        tokio::spawn(async move {
            let worker = lease.worker().clone();
            let worker_id = lease.worker_id();
            let job_id = reference.id;

            // The worker runs in its own task so a harness panic is caught
            // here instead of unwinding into the runtime.
            let execution = tokio::spawn({
                let ctx = context.clone();
                let reference = reference.clone();
                async move { worker.execute(&ctx, &reference).await }
            });

            match execution.await {
                Ok(Ok(outcome)) => apply_outcome(&queue, &reference, outcome).await,
                Ok(Err(err)) => {
                    // Store fault: log and keep the dispatcher alive
                    error!(job_id = %job_id, error = %err, "store fault while executing job");
                }
                Err(join_err) => {
                    error!(job_id = %job_id, worker_id = %worker_id, error = %join_err, "worker crashed");
                    recover_crashed_job(&context, &queue, &reference).await;
                    pool.note_worker_failure(worker_id, &join_err.to_string())
                        .await;
                }
            }

            pool.release(lease).await;
        });
    }

    /// Sleep unless shutdown fires first; returns false on shutdown
    async fn sleep_cancellable(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.shutdown.cancelled() => false,
        }
    }
}

/// React to a settled execution
async fn apply_outcome(queue: &PendingQueue, reference: &QueueRef, outcome: JobOutcome) {
    match outcome {
        JobOutcome::Completed { .. } => {
            debug!(job_id = %reference.id, "job completed");
        }
        JobOutcome::Retry { reason } => {
            info!(job_id = %reference.id, reason, "job failed; requeueing for retry");
            queue.push(reference.clone()).await;
        }
        JobOutcome::Failed { reason } => {
            warn!(job_id = %reference.id, reason, "job failed terminally");
        }
        JobOutcome::Cancelled => {
            debug!(job_id = %reference.id, "job cancelled");
        }
        JobOutcome::Skipped => {
            debug!(job_id = %reference.id, "dropped reference to job no longer pending");
        }
    }
}

/// A crashed worker may leave its job stuck in running; run the failure
/// flow so the job retries or fails like any other fault.
async fn recover_crashed_job(ctx: &WorkerContext, queue: &PendingQueue, reference: &QueueRef) {
    ctx.cancellations.remove(reference.id);
    match ctx.store.update(reference.id, |job| {
        if job.status == JobStatus::Running {
            job.record_failure("worker crashed", Utc::now());
        }
    }) {
        Ok(snapshot) if snapshot.status == JobStatus::Pending => {
            queue.push(reference.clone()).await;
        }
        Ok(_) => {}
        Err(err) => {
            error!(job_id = %reference.id, error = %err, "failed to recover job after worker crash");
        }
    }
}
