pub mod config;
pub mod error;
pub mod jobs;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result, ValidationErrors};
pub use jobs::{
    EnqueueParams, ExecError, Executor, Job, JobId, JobPage, JobPriority, JobService, JobStatus,
    JobSystem, ListParams, NewJob, ShellExecutor, SystemStats,
};

/// Current version of jobforge
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_error_creation() {
        let err = Error::validation("command", "must not be empty");
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.category(), "validation");
    }
}
