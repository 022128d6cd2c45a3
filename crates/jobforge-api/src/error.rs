//! HTTP error envelope
//!
//! Every non-2xx response produced by a handler uses the same JSON shape:
//! status, kind, message, timestamp, error_id, request_id (when available)
//! and a details object. 5xx responses carry only the correlation id; the
//! underlying fault is logged server-side against the error_id.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::error;
use uuid::Uuid;

use crate::request_id::RequestId;

/// An error response in the making
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    details: Value,
    error_id: Uuid,
    request_id: Option<Uuid>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: json!({}),
            error_id: Uuid::new_v4(),
            request_id: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id.0);
        self
    }

    /// Map a core error onto the envelope.
    ///
    /// Validation detail is surfaced to the client; anything mapping to a
    /// 5xx is scrubbed down to its error_id and logged here.
    pub fn from_core(err: jobforge_core::Error, request_id: Option<RequestId>) -> Self {
        let status = StatusCode::from_u16(err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let error_id = Uuid::new_v4();

        let (message, details) = match &err {
            jobforge_core::Error::Validation(errors) => (
                format!("Validation failed: {}", errors.summary()),
                json!({ "fields": errors.errors.clone() }),
            ),
            jobforge_core::Error::NotFound(what) => (format!("Not found: {}", what), json!({})),
            jobforge_core::Error::CapacityExhausted(what) => {
                (format!("Capacity exhausted: {}", what), json!({}))
            }
            _ => {
                error!(
                    error_id = %error_id,
                    category = err.category(),
                    error = %err,
                    "internal error"
                );
                ("Internal server error".to_string(), json!({}))
            }
        };

        Self {
            status,
            message,
            details,
            error_id,
            request_id: request_id.map(|id| id.0),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "status": self.status.as_u16(),
            "kind": "error",
            "message": self.message,
            "timestamp": Utc::now(),
            "error_id": self.error_id,
            "details": self.details,
        });
        if let Some(request_id) = self.request_id {
            body["request_id"] = json!(request_id);
        }
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_validation_maps_to_400_with_fields() {
        let core = jobforge_core::Error::validation("command", "must not be empty");
        let api = ApiError::from_core(core, None);
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert!(api.message.contains("command"));
        assert!(api.details["fields"].is_array());
    }

    #[test]
    fn test_core_not_found_maps_to_404() {
        let core = jobforge_core::Error::not_found("job 123");
        let api = ApiError::from_core(core, None);
        assert_eq!(api.status, StatusCode::NOT_FOUND);
        assert!(api.message.contains("job 123"));
    }

    #[test]
    fn test_internal_errors_are_scrubbed() {
        let core = jobforge_core::Error::internal("dashmap shard poisoned");
        let api = ApiError::from_core(core, None);
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.message, "Internal server error");
        assert!(!api.message.contains("dashmap"));
    }
}
