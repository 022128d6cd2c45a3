//! Background job processing core
//!
//! This module provides the in-process job queue engine:
//! - Concurrency-safe job registry with point lookup and filtered listing
//! - Priority queue (high, normal, low) with FIFO order within a class
//! - Dynamic worker pool with idle cleanup and bounded restarts
//! - Dispatcher loop pairing pending jobs with workers
//! - Per-job timeout, cooperative cancellation and retry logic
//!
//! All state is held in memory; the store is the single source of truth and
//! the queue carries references only.

pub mod dispatcher;
pub mod executor;
pub mod job;
pub mod pool;
pub mod queue;
pub mod service;
pub mod store;
pub mod validate;
pub mod worker;

// Re-export main types
pub use dispatcher::Dispatcher;
pub use executor::ShellExecutor;
pub use job::{
    FailureDisposition, Job, JobDefaults, JobId, JobPriority, JobStatus, NewJob,
    DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_MS,
};
pub use pool::{PoolStats, RestartBudget, WorkerLease, WorkerPool};
pub use queue::{PendingQueue, QueueDepth, QueueRef};
pub use service::{JobPage, JobService, JobSystem, SystemStats};
pub use store::JobStore;
pub use validate::{EnqueueParams, ListParams, ListQuery};
pub use worker::{CancelRegistry, JobOutcome, Worker, WorkerContext, WorkerId, WorkerStats};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Errors surfaced by a single executor run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    #[error("execution failed: {0}")]
    Failed(String),

    #[error("job timed out after {0} ms")]
    TimedOut(u64),

    #[error("executor panicked: {0}")]
    Panicked(String),

    #[error("execution cancelled")]
    Cancelled,
}

/// Executor seam: interprets a job's command.
///
/// The core treats commands as opaque strings. Implementations must honour
/// the cancellation token at their next cooperative point; exec-style
/// executors additionally need a hard-kill path (see [`ShellExecutor`]).
/// Executors never touch the job store.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run the command to completion, returning its output
    async fn run(
        &self,
        command: &str,
        cancel: CancellationToken,
    ) -> std::result::Result<String, ExecError>;
}
