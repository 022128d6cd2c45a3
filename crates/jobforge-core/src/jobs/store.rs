//! Concurrency-safe job registry
//!
//! The store owns the authoritative copy of every job record. Mutations are
//! serialised per id by the map's entry guard; no global lock on the common
//! path.

use std::collections::HashMap;

use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::jobs::{Job, JobId, JobStatus};

/// In-memory job registry keyed by job id
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: DashMap<JobId, Job>,
}

impl JobStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record; fails if the id is already present
    pub fn insert(&self, job: Job) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        match self.jobs.entry(job.id) {
            Entry::Occupied(_) => Err(Error::DuplicateId(job.id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(job);
                Ok(())
            }
        }
    }

    /// Point read; returns a consistent snapshot of the record
    pub fn get(&self, id: JobId) -> Result<Job> {
        self.jobs
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::not_found(format!("job {}", id)))
    }

    /// Apply a mutation under exclusive access to the record.
    ///
    /// Concurrent transitions for the same id cannot interleave; the mutator
    /// runs synchronously while the entry guard is held. Returns the updated
    /// snapshot.
    pub fn update(&self, id: JobId, mutator: impl FnOnce(&mut Job)) -> Result<Job> {
        let mut entry = self
            .jobs
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("job {}", id)))?;
        mutator(entry.value_mut());
        Ok(entry.value().clone())
    }

    /// Filtered, paginated snapshot sorted by created_at descending.
    ///
    /// `total` counts matches before pagination.
    pub fn list(
        &self,
        status: Option<JobStatus>,
        limit: usize,
        offset: usize,
    ) -> (Vec<Job>, usize) {
        let mut items: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| status.map_or(true, |s| entry.status == s))
            .map(|entry| entry.value().clone())
            .collect();

        items.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.seq.cmp(&a.seq))
        });

        let total = items.len();
        let page = items.into_iter().skip(offset).take(limit).collect();
        (page, total)
    }

    /// Record count per status
    pub fn status_counts(&self) -> HashMap<JobStatus, usize> {
        let mut counts = HashMap::new();
        for entry in self.jobs.iter() {
            *counts.entry(entry.status).or_insert(0) += 1;
        }
        counts
    }

    /// Ids currently in the given status
    pub fn ids_with_status(&self, status: JobStatus) -> Vec<JobId> {
        self.jobs
            .iter()
            .filter(|entry| entry.status == status)
            .map(|entry| entry.id)
            .collect()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Remove all records; test-only operation
    pub fn clear(&self) {
        self.jobs.clear();
    }
}
