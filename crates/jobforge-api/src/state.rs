use std::sync::Arc;

use jobforge_core::JobService;

#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobService>,
}

impl AppState {
    pub fn new(jobs: Arc<JobService>) -> Self {
        Self { jobs }
    }
}
