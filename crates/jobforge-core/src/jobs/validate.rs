//! Centralised input validation for the boundary API
//!
//! Every request crossing into the core is checked here; the HTTP layer
//! converts shapes but does not re-invent rules.

use crate::error::{Result, ValidationErrors};
use crate::jobs::{JobDefaults, JobPriority, JobStatus, NewJob};

/// Default page size for listings
pub const DEFAULT_LIMIT: usize = 100;

/// Hard ceiling for page size; larger requests are clamped
pub const MAX_LIMIT: usize = 1000;

/// Raw enqueue input as received from a client
#[derive(Debug, Clone, Default)]
pub struct EnqueueParams {
    pub command: String,
    pub priority: Option<String>,
    pub timeout_ms: Option<i64>,
    pub max_retries: Option<i64>,
}

/// Raw listing input as received from a client
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Validated listing query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    pub status: Option<JobStatus>,
    pub limit: usize,
    pub offset: usize,
}

/// Validate an enqueue request, applying configured defaults
pub fn enqueue_params(params: EnqueueParams, defaults: &JobDefaults) -> Result<NewJob> {
    let mut errors = ValidationErrors::new();

    if params.command.trim().is_empty() {
        errors.add("command", "must not be empty");
    }

    let priority = match params.priority.as_deref() {
        None => JobPriority::default(),
        Some(raw) => match JobPriority::parse(raw) {
            Some(priority) => priority,
            None => {
                errors.add_with_allowed(
                    "priority",
                    format!("unknown priority '{}'", raw),
                    JobPriority::allowed(),
                );
                JobPriority::default()
            }
        },
    };

    let timeout_ms = match params.timeout_ms {
        None => defaults.timeout_ms,
        Some(t) if t <= 0 => {
            errors.add("timeout", "must be a positive number of milliseconds");
            defaults.timeout_ms
        }
        Some(t) => t as u64,
    };

    let max_retries = match params.max_retries {
        None => defaults.max_retries,
        Some(r) if r < 0 => {
            errors.add("max_retries", "must not be negative");
            defaults.max_retries
        }
        Some(r) => r as u32,
    };

    if !errors.is_empty() {
        return Err(errors.into_error());
    }

    Ok(NewJob {
        command: params.command,
        priority,
        timeout_ms,
        max_retries,
    })
}

/// Validate a listing request; limit is clamped to `[1, MAX_LIMIT]`
pub fn list_params(params: ListParams) -> Result<ListQuery> {
    let mut errors = ValidationErrors::new();

    let status = match params.status.as_deref() {
        None => None,
        Some(raw) => match JobStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                errors.add_with_allowed(
                    "status",
                    format!("unknown status '{}'", raw),
                    JobStatus::allowed(),
                );
                None
            }
        },
    };

    let limit = match params.limit {
        None => DEFAULT_LIMIT,
        Some(l) if l <= 0 => {
            errors.add("limit", "must be at least 1");
            DEFAULT_LIMIT
        }
        Some(l) => (l as usize).min(MAX_LIMIT),
    };

    let offset = match params.offset {
        None => 0,
        Some(o) if o < 0 => {
            errors.add("offset", "must not be negative");
            0
        }
        Some(o) => o as usize,
    };

    if !errors.is_empty() {
        return Err(errors.into_error());
    }

    Ok(ListQuery {
        status,
        limit,
        offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> JobDefaults {
        JobDefaults::default()
    }

    #[test]
    fn test_enqueue_applies_defaults() {
        let new_job = enqueue_params(
            EnqueueParams {
                command: "echo hi".into(),
                ..Default::default()
            },
            &defaults(),
        )
        .unwrap();

        assert_eq!(new_job.command, "echo hi");
        assert_eq!(new_job.priority, JobPriority::Normal);
        assert_eq!(new_job.timeout_ms, 30_000);
        assert_eq!(new_job.max_retries, 3);
    }

    #[test]
    fn test_enqueue_rejects_empty_and_whitespace_command() {
        for command in ["", "   ", "\t\n"] {
            let err = enqueue_params(
                EnqueueParams {
                    command: command.into(),
                    ..Default::default()
                },
                &defaults(),
            )
            .unwrap_err();
            assert_eq!(err.status_code(), 400);
            assert!(err.to_string().contains("command"));
        }
    }

    #[test]
    fn test_enqueue_rejects_unknown_priority() {
        let err = enqueue_params(
            EnqueueParams {
                command: "x".into(),
                priority: Some("urgent".into()),
                ..Default::default()
            },
            &defaults(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("priority"));
    }

    #[test]
    fn test_enqueue_rejects_nonpositive_timeout() {
        for timeout in [0, -5] {
            let err = enqueue_params(
                EnqueueParams {
                    command: "x".into(),
                    timeout_ms: Some(timeout),
                    ..Default::default()
                },
                &defaults(),
            )
            .unwrap_err();
            assert!(err.to_string().contains("timeout"));
        }
    }

    #[test]
    fn test_enqueue_rejects_negative_retries() {
        let err = enqueue_params(
            EnqueueParams {
                command: "x".into(),
                max_retries: Some(-1),
                ..Default::default()
            },
            &defaults(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn test_enqueue_collects_multiple_field_errors() {
        let err = enqueue_params(
            EnqueueParams {
                command: "".into(),
                priority: Some("nope".into()),
                timeout_ms: Some(0),
                max_retries: Some(-2),
            },
            &defaults(),
        )
        .unwrap_err();

        let text = err.to_string();
        for field in ["command", "priority", "timeout", "max_retries"] {
            assert!(text.contains(field), "missing {field} in: {text}");
        }
    }

    #[test]
    fn test_list_defaults() {
        let query = list_params(ListParams::default()).unwrap();
        assert_eq!(query.status, None);
        assert_eq!(query.limit, DEFAULT_LIMIT);
        assert_eq!(query.offset, 0);
    }

    #[test]
    fn test_list_limit_clamped_above_max() {
        let query = list_params(ListParams {
            limit: Some(5000),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(query.limit, MAX_LIMIT);
    }

    #[test]
    fn test_list_rejects_nonpositive_limit() {
        for limit in [0, -1] {
            let err = list_params(ListParams {
                limit: Some(limit),
                ..Default::default()
            })
            .unwrap_err();
            assert!(err.to_string().contains("limit"));
        }
    }

    #[test]
    fn test_list_rejects_negative_offset() {
        let err = list_params(ListParams {
            offset: Some(-1),
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("offset"));
    }

    #[test]
    fn test_list_rejects_unknown_status() {
        let err = list_params(ListParams {
            status: Some("done".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("status"));
    }

    #[test]
    fn test_list_parses_status() {
        let query = list_params(ListParams {
            status: Some("completed".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(query.status, Some(JobStatus::Completed));
    }
}
