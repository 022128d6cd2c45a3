//! Dynamic worker pool
//!
//! Bookkeeping over a bounded set of workers. Acquisition, release and idle
//! cleanup all run under one lock, so a worker can never be reaped after it
//! has been handed a job.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::jobs::worker::{Worker, WorkerId, WorkerStats};

/// Handle to an acquired worker; hand it back with [`WorkerPool::release`]
#[derive(Debug)]
pub struct WorkerLease {
    worker: Arc<Worker>,
}

impl WorkerLease {
    /// The leased worker
    pub fn worker(&self) -> &Arc<Worker> {
        &self.worker
    }

    /// Id of the leased worker
    pub fn worker_id(&self) -> WorkerId {
        self.worker.id
    }
}

/// Bounds restarts per rolling window; exceeding the budget means give up
#[derive(Debug)]
pub struct RestartBudget {
    max: u32,
    window: Duration,
    events: VecDeque<Instant>,
}

impl RestartBudget {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            events: VecDeque::new(),
        }
    }

    /// Record an attempt; returns whether it is within budget
    pub fn allow(&mut self, now: Instant) -> bool {
        while let Some(front) = self.events.front() {
            if now.duration_since(*front) > self.window {
                self.events.pop_front();
            } else {
                break;
            }
        }
        if (self.events.len() as u32) < self.max {
            self.events.push_back(now);
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct PoolEntry {
    worker: Arc<Worker>,
    spawned_at: Instant,
    idle_since: Option<Instant>,
    busy: bool,
}

#[derive(Debug)]
struct PoolInner {
    workers: Vec<PoolEntry>,
    restarts: RestartBudget,
}

/// Pool-level statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    /// Live workers
    pub active: usize,

    /// Workers currently executing a job
    pub busy: usize,
}

/// Dynamic set of workers with a max-capacity and idle-cleanup policy
#[derive(Debug)]
pub struct WorkerPool {
    inner: Mutex<PoolInner>,
    max_workers: usize,
    min_workers: usize,
}

impl WorkerPool {
    /// Create a pool; restart budget defaults to 5 restarts per minute
    pub fn new(max_workers: usize, min_workers: usize) -> Self {
        Self::with_restart_budget(
            max_workers,
            min_workers,
            RestartBudget::new(5, Duration::from_secs(60)),
        )
    }

    /// Create a pool with an explicit worker restart budget
    pub fn with_restart_budget(
        max_workers: usize,
        min_workers: usize,
        restarts: RestartBudget,
    ) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                workers: Vec::new(),
                restarts,
            }),
            max_workers,
            min_workers,
        }
    }

    /// Configured capacity
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Configured idle floor
    pub fn min_workers(&self) -> usize {
        self.min_workers
    }

    /// Lease a worker, spawning one if below capacity.
    ///
    /// Returns `None` when every slot is live and busy.
    pub async fn acquire(&self) -> Option<WorkerLease> {
        let mut inner = self.inner.lock().await;

        if let Some(entry) = inner.workers.iter_mut().find(|e| !e.busy) {
            entry.busy = true;
            entry.idle_since = None;
            return Some(WorkerLease {
                worker: entry.worker.clone(),
            });
        }

        if inner.workers.len() < self.max_workers {
            let worker = Arc::new(Worker::new());
            debug!(worker_id = %worker.id, "spawning worker");
            inner.workers.push(PoolEntry {
                worker: worker.clone(),
                spawned_at: Instant::now(),
                idle_since: None,
                busy: true,
            });
            return Some(WorkerLease { worker });
        }

        None
    }

    /// Return a leased worker to the pool.
    ///
    /// A worker terminated while its lease was out (shutdown, exhausted
    /// restart budget) is simply dropped.
    pub async fn release(&self, lease: WorkerLease) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner
            .workers
            .iter_mut()
            .find(|e| e.worker.id == lease.worker_id())
        {
            entry.busy = false;
            entry.idle_since = Some(Instant::now());
        }
    }

    /// Live worker count
    pub async fn active_count(&self) -> usize {
        self.inner.lock().await.workers.len()
    }

    /// Workers currently executing a job
    pub async fn busy_count(&self) -> usize {
        self.inner.lock().await.workers.iter().filter(|e| e.busy).count()
    }

    /// Pool statistics snapshot
    pub async fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().await;
        PoolStats {
            active: inner.workers.len(),
            busy: inner.workers.iter().filter(|e| e.busy).count(),
        }
    }

    /// Per-worker execution counters
    pub async fn worker_stats(&self) -> Vec<WorkerStats> {
        let inner = self.inner.lock().await;
        inner.workers.iter().map(|e| e.worker.stats()).collect()
    }

    /// Terminate oldest idle workers until at most `min` workers remain.
    ///
    /// Busy workers are never terminated. Returns the number removed.
    pub async fn cleanup_idle(&self, min: usize) -> usize {
        let mut inner = self.inner.lock().await;
        let mut removed = 0;

        while inner.workers.len() > min {
            let oldest_idle = inner
                .workers
                .iter()
                .enumerate()
                .filter(|(_, e)| !e.busy)
                .min_by_key(|(_, e)| e.spawned_at)
                .map(|(i, _)| i);

            match oldest_idle {
                Some(index) => {
                    let entry = inner.workers.remove(index);
                    debug!(worker_id = %entry.worker.id, "terminating idle worker");
                    removed += 1;
                }
                None => break,
            }
        }

        removed
    }

    /// Handle a worker-harness fault.
    ///
    /// The worker is restarted in place while the restart budget allows;
    /// past the budget it is terminated for good. Returns whether the worker
    /// survived.
    pub async fn note_worker_failure(&self, worker_id: WorkerId, reason: &str) -> bool {
        let mut inner = self.inner.lock().await;

        let Some(index) = inner.workers.iter().position(|e| e.worker.id == worker_id) else {
            return false;
        };

        if inner.restarts.allow(Instant::now()) {
            warn!(worker_id = %worker_id, reason, "worker fault; restarting");
            let entry = &mut inner.workers[index];
            entry.busy = false;
            entry.idle_since = Some(Instant::now());
            true
        } else {
            error!(
                worker_id = %worker_id,
                reason,
                "worker fault past restart budget; terminating worker"
            );
            inner.workers.remove(index);
            false
        }
    }

    /// Terminate all workers
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        let count = inner.workers.len();
        inner.workers.clear();
        info!(workers = count, "worker pool shut down");
    }
}
