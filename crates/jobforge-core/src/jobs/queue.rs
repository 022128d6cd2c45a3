//! Pending-job priority queue
//!
//! Holds lightweight references only; job bodies live in the store. One FIFO
//! lane per priority class, drained high -> normal -> low.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::jobs::{JobId, JobPriority};

/// Queue reference to a pending job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRef {
    /// Job ID
    pub id: JobId,

    /// Priority lane
    pub priority: JobPriority,

    /// Enqueue sequence number
    pub seq: u64,

    /// Enqueue timestamp
    pub created_at: DateTime<Utc>,
}

impl QueueRef {
    /// Build a reference from a job record
    pub fn of(job: &crate::jobs::Job) -> Self {
        Self {
            id: job.id,
            priority: job.priority,
            seq: job.seq,
            created_at: job.created_at,
        }
    }
}

/// Queue depth broken down by priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueDepth {
    pub high: usize,
    pub normal: usize,
    pub low: usize,
    pub total: usize,
}

#[derive(Debug, Default)]
struct Lanes {
    high: VecDeque<QueueRef>,
    normal: VecDeque<QueueRef>,
    low: VecDeque<QueueRef>,
}

impl Lanes {
    fn lane_mut(&mut self, priority: JobPriority) -> &mut VecDeque<QueueRef> {
        match priority {
            JobPriority::High => &mut self.high,
            JobPriority::Normal => &mut self.normal,
            JobPriority::Low => &mut self.low,
        }
    }
}

/// Thread-safe priority queue over pending jobs
#[derive(Debug, Default)]
pub struct PendingQueue {
    lanes: Mutex<Lanes>,
}

impl PendingQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reference to the back of its priority lane
    pub async fn push(&self, reference: QueueRef) {
        let mut lanes = self.lanes.lock().await;
        lanes.lane_mut(reference.priority).push_back(reference);
    }

    /// Return a reference to the front of its priority lane.
    ///
    /// Used when a popped job could not be handed to a worker; the front
    /// position is correct because its created_at predates any peer enqueued
    /// concurrently at the same priority.
    pub async fn push_front(&self, reference: QueueRef) {
        let mut lanes = self.lanes.lock().await;
        lanes.lane_mut(reference.priority).push_front(reference);
    }

    /// Pop the highest-priority, oldest reference
    pub async fn pop_front(&self) -> Option<QueueRef> {
        let mut lanes = self.lanes.lock().await;
        for priority in [JobPriority::High, JobPriority::Normal, JobPriority::Low] {
            if let Some(reference) = lanes.lane_mut(priority).pop_front() {
                return Some(reference);
            }
        }
        None
    }

    /// Remove a reference by id; returns whether it was present
    pub async fn remove(&self, id: JobId) -> bool {
        let mut lanes = self.lanes.lock().await;
        for priority in [JobPriority::High, JobPriority::Normal, JobPriority::Low] {
            let lane = lanes.lane_mut(priority);
            if let Some(pos) = lane.iter().position(|r| r.id == id) {
                lane.remove(pos);
                return true;
            }
        }
        false
    }

    /// Total queued references
    pub async fn len(&self) -> usize {
        let lanes = self.lanes.lock().await;
        lanes.high.len() + lanes.normal.len() + lanes.low.len()
    }

    /// Whether the queue is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Depth per priority lane
    pub async fn depth(&self) -> QueueDepth {
        let lanes = self.lanes.lock().await;
        QueueDepth {
            high: lanes.high.len(),
            normal: lanes.normal.len(),
            low: lanes.low.len(),
            total: lanes.high.len() + lanes.normal.len() + lanes.low.len(),
        }
    }

    /// All queued ids, for consistency checks
    pub async fn ids(&self) -> Vec<JobId> {
        let lanes = self.lanes.lock().await;
        lanes
            .high
            .iter()
            .chain(lanes.normal.iter())
            .chain(lanes.low.iter())
            .map(|r| r.id)
            .collect()
    }

    /// Drop every queued reference
    pub async fn clear(&self) {
        let mut lanes = self.lanes.lock().await;
        lanes.high.clear();
        lanes.normal.clear();
        lanes.low.clear();
    }
}
