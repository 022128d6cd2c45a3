use std::fmt;

use serde::{Deserialize, Serialize};

/// Main error type for jobforge
#[derive(Debug)]
pub enum Error {
    /// Configuration errors
    Config(String),

    /// Validation errors with field-level detail
    Validation(ValidationErrors),

    /// Not found errors
    NotFound(String),

    /// Duplicate job id on insert; should be impossible with random ids
    DuplicateId(String),

    /// Pool or queue cannot accept more work
    CapacityExhausted(String),

    /// Serialization errors
    Serialization(serde_json::Error),

    /// IO errors
    Io(std::io::Error),

    /// Generic internal errors with description
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Validation(errors) => write!(f, "Validation error: {}", errors.summary()),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::DuplicateId(id) => write!(f, "Duplicate job id: {}", id),
            Error::CapacityExhausted(msg) => write!(f, "Capacity exhausted: {}", msg),
            Error::Serialization(e) => write!(f, "Serialization error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Serialization(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

// Conversions from external error types
impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Io(error)
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Config(error.to_string())
    }
}

// Common error constructors
impl Error {
    /// Create a new configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Error::Config(msg.into())
    }

    /// Create a validation error for a single field
    pub fn validation<T: Into<String>, U: Into<String>>(field: T, msg: U) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, msg);
        Error::Validation(errors)
    }

    /// Create a new not found error
    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a new internal error
    pub fn internal<T: Into<String>>(msg: T) -> Self {
        Error::Internal(msg.into())
    }
}

impl Error {
    /// Get HTTP status code for error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            Error::CapacityExhausted(_) => 503,
            Error::Config(_) => 500,
            Error::DuplicateId(_) => 500,
            Error::Serialization(_) => 500,
            Error::Io(_) => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Get error category for monitoring
    pub fn category(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::DuplicateId(_) => "duplicate_id",
            Error::CapacityExhausted(_) => "capacity_exhausted",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
            Error::Internal(_) => "internal",
        }
    }
}

/// Validation error struct for detailed field errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
            allowed: None,
        });
    }

    pub fn add_with_allowed(
        &mut self,
        field: impl Into<String>,
        message: impl Into<String>,
        allowed: Vec<String>,
    ) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
            allowed: Some(allowed),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// One-line summary of all field errors
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn into_error(self) -> Error {
        Error::Validation(self)
    }
}

impl Default for ValidationErrors {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::validation("command", "must not be empty").status_code(), 400);
        assert_eq!(Error::not_found("job abc").status_code(), 404);
        assert_eq!(Error::CapacityExhausted("pool full".into()).status_code(), 503);
        assert_eq!(Error::internal("boom").status_code(), 500);
    }

    #[test]
    fn test_categories() {
        assert_eq!(Error::validation("f", "m").category(), "validation");
        assert_eq!(Error::not_found("x").category(), "not_found");
        assert_eq!(Error::DuplicateId("id".into()).category(), "duplicate_id");
    }

    #[test]
    fn test_validation_summary() {
        let mut errors = ValidationErrors::new();
        errors.add("command", "must not be empty");
        errors.add("timeout", "must be positive");
        let err = errors.into_error();
        let text = err.to_string();
        assert!(text.contains("command: must not be empty"));
        assert!(text.contains("timeout: must be positive"));
    }
}
