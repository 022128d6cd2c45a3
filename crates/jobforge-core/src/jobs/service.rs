//! Boundary API consumed by the HTTP layer
//!
//! `JobService` owns admission: it validates input, assigns the enqueue
//! sequence, inserts the record and publishes the queue reference as one
//! serialised step, so FIFO order within a priority class always matches
//! created_at order. `JobSystem` wires the service to a running dispatcher.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::jobs::dispatcher::Dispatcher;
use crate::jobs::pool::{PoolStats, WorkerPool};
use crate::jobs::queue::{PendingQueue, QueueDepth, QueueRef};
use crate::jobs::store::JobStore;
use crate::jobs::validate::{self, EnqueueParams, ListParams};
use crate::jobs::worker::CancelRegistry;
use crate::jobs::{Executor, Job, JobDefaults, JobId, JobStatus};

/// One page of a job listing
#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub items: Vec<Job>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Point-in-time system statistics
#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub queue: QueueDepth,
    pub statuses: BTreeMap<String, usize>,
    pub workers: PoolStats,
}

/// Typed operations the HTTP layer calls
pub struct JobService {
    store: Arc<JobStore>,
    queue: Arc<PendingQueue>,
    cancellations: Arc<CancelRegistry>,
    pool: Arc<WorkerPool>,
    defaults: JobDefaults,
    capacity: usize,
    // Serialises sequence assignment, store insert and queue publish
    admission: Mutex<u64>,
}

impl JobService {
    pub fn new(
        store: Arc<JobStore>,
        queue: Arc<PendingQueue>,
        cancellations: Arc<CancelRegistry>,
        pool: Arc<WorkerPool>,
        defaults: JobDefaults,
        capacity: usize,
    ) -> Self {
        Self {
            store,
            queue,
            cancellations,
            pool,
            defaults,
            capacity,
            admission: Mutex::new(0),
        }
    }

    /// Validate, register and queue a new job; returns the pending record
    pub async fn enqueue(&self, params: EnqueueParams) -> Result<Job> {
        let new_job = validate::enqueue_params(params, &self.defaults)?;

        let mut seq = self.admission.lock().await;
        *seq += 1;

        let queued = self.queue.len().await;
        if queued >= self.capacity {
            warn!(
                queued,
                capacity = self.capacity,
                "queue past its soft capacity; admitting anyway"
            );
        }

        let job = Job::from_new(new_job, *seq, Utc::now());
        self.store.insert(job.clone())?;
        self.queue.push(QueueRef::of(&job)).await;
        drop(seq);

        info!(job_id = %job.id, priority = %job.priority, "job queued");
        Ok(job)
    }

    /// Point lookup by id
    pub fn get(&self, id: JobId) -> Result<Job> {
        self.store.get(id)
    }

    /// Filtered, paginated listing sorted by created_at descending
    pub fn list(&self, params: ListParams) -> Result<JobPage> {
        let query = validate::list_params(params)?;
        let (items, total) = self.store.list(query.status, query.limit, query.offset);
        Ok(JobPage {
            items,
            total,
            limit: query.limit,
            offset: query.offset,
        })
    }

    /// Cancel a job.
    ///
    /// A pending job is cancelled and unqueued; a running job gets its
    /// cooperative-cancel token fired and its terminal state written now,
    /// which the worker honours at its next checkpoint. Cancelling a
    /// terminal job returns the record unchanged.
    pub async fn cancel(&self, id: JobId) -> Result<Job> {
        let mut previous = JobStatus::Pending;
        let snapshot = self.store.update(id, |job| {
            previous = job.status;
            if job.status.is_active() {
                job.mark_cancelled(Utc::now());
            }
        })?;

        match previous {
            JobStatus::Pending => {
                self.queue.remove(id).await;
                info!(job_id = %id, "pending job cancelled");
            }
            JobStatus::Running => {
                self.cancellations.cancel(id);
                info!(job_id = %id, "running job signalled to cancel");
            }
            terminal => {
                debug!(job_id = %id, status = %terminal, "cancel on terminal job is a no-op");
            }
        }

        Ok(snapshot)
    }

    /// Test-only: abort in-flight work, drain the queue, clear the store
    pub async fn clear(&self) {
        self.cancellations.cancel_all();
        self.queue.clear().await;
        self.store.clear();
        info!("job store and queue cleared");
    }

    /// Queue depths, status counts and worker liveness
    pub async fn stats(&self) -> SystemStats {
        let counts = self.store.status_counts();
        let mut statuses = BTreeMap::new();
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            statuses.insert(status.to_string(), counts.get(&status).copied().unwrap_or(0));
        }

        SystemStats {
            queue: self.queue.depth().await,
            statuses,
            workers: self.pool.stats().await,
        }
    }
}

/// A fully wired job system: store, queue, pool, dispatcher and service
pub struct JobSystem {
    service: Arc<JobService>,
    pool: Arc<WorkerPool>,
    shutdown: CancellationToken,
    dispatcher_handle: JoinHandle<()>,
}

impl JobSystem {
    /// Build and start the system; must be called inside a tokio runtime
    pub fn start(config: &Config, executor: Arc<dyn Executor>) -> Self {
        let store = Arc::new(JobStore::new());
        let queue = Arc::new(PendingQueue::new());
        let cancellations = Arc::new(CancelRegistry::new());
        let pool = Arc::new(WorkerPool::new(
            config.worker.max_workers,
            config.worker.min_workers,
        ));
        let shutdown = CancellationToken::new();

        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            queue.clone(),
            pool.clone(),
            executor,
            cancellations.clone(),
            config.dispatcher.clone(),
            shutdown.clone(),
        ));
        let dispatcher_handle = dispatcher.spawn();

        let service = Arc::new(JobService::new(
            store,
            queue,
            cancellations,
            pool.clone(),
            JobDefaults {
                timeout_ms: config.worker.default_timeout_ms,
                max_retries: config.worker.default_max_retries,
            },
            config.queue.capacity,
        ));

        Self {
            service,
            pool,
            shutdown,
            dispatcher_handle,
        }
    }

    /// Handle to the boundary service
    pub fn service(&self) -> Arc<JobService> {
        self.service.clone()
    }

    /// Stop the dispatcher and terminate all workers
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.pool.shutdown().await;
        let _ = self.dispatcher_handle.await;
    }
}
