//! Job types and definitions

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique job identifier
pub type JobId = Uuid;

/// Default per-job execution timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default number of retries after a failed execution
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Job priority levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    /// High priority jobs (dispatched first)
    High,

    /// Normal priority jobs (default)
    Normal,

    /// Low priority jobs (dispatched last)
    Low,
}

impl Default for JobPriority {
    fn default() -> Self {
        JobPriority::Normal
    }
}

impl fmt::Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPriority::High => write!(f, "high"),
            JobPriority::Normal => write!(f, "normal"),
            JobPriority::Low => write!(f, "low"),
        }
    }
}

impl JobPriority {
    /// Dispatch rank; lower is served first
    pub fn rank(&self) -> u8 {
        match self {
            JobPriority::High => 0,
            JobPriority::Normal => 1,
            JobPriority::Low => 2,
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "high" => Some(JobPriority::High),
            "normal" => Some(JobPriority::Normal),
            "low" => Some(JobPriority::Low),
            _ => None,
        }
    }

    /// All priority names, for validation messages
    pub fn allowed() -> Vec<String> {
        vec!["high".into(), "normal".into(), "low".into()]
    }
}

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job is waiting in the queue
    Pending,

    /// Job is being executed by a worker
    Running,

    /// Job completed successfully
    Completed,

    /// Job permanently failed (retries exhausted)
    Failed,

    /// Job was cancelled
    Cancelled,
}

impl Default for JobStatus {
    fn default() -> Self {
        JobStatus::Pending
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl JobStatus {
    /// Check if job is terminal (won't change)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Check if job is active
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    /// Check whether `from -> to` is a permitted lifecycle transition.
    ///
    /// Permitted edges:
    /// pending -> running | cancelled
    /// running -> completed | pending (retry) | failed | cancelled
    pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
        matches!(
            (from, to),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Pending)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    /// All status names, for validation messages
    pub fn allowed() -> Vec<String> {
        vec![
            "pending".into(),
            "running".into(),
            "completed".into(),
            "failed".into(),
            "cancelled".into(),
        ]
    }
}

/// What to do with a job after a failed execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Re-enqueue for another attempt
    Retry,

    /// Retries exhausted; the job is terminally failed
    Exhausted,
}

/// Configured defaults applied to enqueue requests
#[derive(Debug, Clone, Copy)]
pub struct JobDefaults {
    pub timeout_ms: u64,
    pub max_retries: u32,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Validated input for a new job
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Command line handed to the executor
    pub command: String,

    /// Job priority
    pub priority: JobPriority,

    /// Execution timeout in milliseconds
    pub timeout_ms: u64,

    /// Max retry attempts after a failed execution
    pub max_retries: u32,
}

impl NewJob {
    /// Create a new job input with defaults
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            priority: JobPriority::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Set priority
    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set timeout
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set max retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Job record
///
/// The store owns the authoritative copy; workers and the dispatcher see
/// snapshots and write back through the store's mutation API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Command line handed to the executor; opaque to the core
    pub command: String,

    /// Job priority
    pub priority: JobPriority,

    /// Job status
    pub status: JobStatus,

    /// Enqueue timestamp, immutable
    pub created_at: DateTime<Utc>,

    /// Start of the most recent run; overwritten on retry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Set on transition to a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Executor output on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    /// Failure reason on terminal failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Execution timeout (milliseconds)
    pub timeout_ms: u64,

    /// Failed executions observed so far
    pub retry_count: u32,

    /// Max retry attempts; the job runs at most max_retries + 1 times
    pub max_retries: u32,

    /// Enqueue sequence number; FIFO tie-break within a priority class
    #[serde(skip)]
    pub seq: u64,
}

impl Job {
    /// Create a pending job from validated input
    pub fn from_new(new_job: NewJob, seq: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            command: new_job.command,
            priority: new_job.priority,
            status: JobStatus::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            timeout_ms: new_job.timeout_ms,
            retry_count: 0,
            max_retries: new_job.max_retries,
            seq,
        }
    }

    /// Mark as running; records the start of this run
    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.started_at = Some(now);
    }

    /// Mark as completed with the executor's output
    pub fn mark_completed(&mut self, result: String, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(now);
    }

    /// Mark as cancelled
    pub fn mark_cancelled(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(now);
    }

    /// Record a failed execution and decide the follow-up.
    ///
    /// A retryable failure goes straight back to pending; the terminal
    /// `failed` status is only ever written once retries are exhausted.
    pub fn record_failure(&mut self, reason: &str, now: DateTime<Utc>) -> FailureDisposition {
        self.retry_count += 1;
        if self.retry_count <= self.max_retries {
            self.status = JobStatus::Pending;
            self.result = None;
            self.error = None;
            FailureDisposition::Retry
        } else {
            self.status = JobStatus::Failed;
            self.error = Some(reason.to_string());
            self.completed_at = Some(now);
            FailureDisposition::Exhausted
        }
    }

    /// Remaining execution attempts, counting the next one
    pub fn attempts_left(&self) -> u32 {
        (self.max_retries + 1).saturating_sub(self.retry_count)
    }
}
