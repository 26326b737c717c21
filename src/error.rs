//! # Error Handling
//!
//! Error types for the ingest orchestrator. Errors are split the way the
//! session treats them:
//!
//! - **Construction errors** (configuration, validation, directory creation,
//!   engine rejection while building the topology) are fatal. They propagate
//!   to the caller after any partially built topology has been torn down.
//! - **Steady-state errors** (a snapshot on one camera, one metric category,
//!   one shutdown step) are caught at the narrowest scope and logged.
//!
//! ## Usage
//!
//! ```rust
//! use ingest_orchestrator::error::{IngestError, classify};
//!
//! let error = IngestError::config("segment_time", "must be a positive number of minutes");
//! assert_eq!(error.category(), "config");
//! assert!(classify::is_rejected_request(&error));
//! ```

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::engine::EngineError;

/// Base error type for the ingest orchestrator.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Malformed policy, missing placeholder, duplicate camera name
    #[error("configuration error in '{field}': {reason}")]
    Config { field: String, reason: String },

    /// A request or value outside its accepted range
    #[error("validation failed for '{field}': {constraint} (value: {value})")]
    Validation {
        field: String,
        constraint: String,
        value: String,
    },

    /// Filesystem failures, always tagged with the path involved
    #[error("I/O error during {operation} on '{}': {source}", .path.display())]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The pipeline engine refused or failed a command
    #[error("engine error during {operation} on '{pipeline}': {source}")]
    Engine {
        operation: String,
        pipeline: String,
        #[source]
        source: EngineError,
    },

    /// An entity lifecycle violation (e.g. command on a deleted pipeline)
    #[error("invalid state transition from '{current_state}' when attempting '{attempted_operation}' on '{pipeline}'")]
    State {
        pipeline: String,
        current_state: String,
        attempted_operation: String,
    },

    /// The session directory for a freshly issued number already exists
    #[error("session directory conflict: '{}' already exists", .path.display())]
    SessionConflict { path: PathBuf },
}

impl IngestError {
    /// Create a configuration error
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a validation error
    pub fn validation(
        field: impl Into<String>,
        constraint: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        Self::Validation {
            field: field.into(),
            constraint: constraint.into(),
            value: value.to_string(),
        }
    }

    /// Create an I/O error bound to a path
    pub fn io(operation: impl Into<String>, path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create an engine error for a pipeline command
    pub fn engine(
        operation: impl Into<String>,
        pipeline: impl Into<String>,
        source: EngineError,
    ) -> Self {
        Self::Engine {
            operation: operation.into(),
            pipeline: pipeline.into(),
            source,
        }
    }

    /// Create a lifecycle state error
    pub fn state(
        pipeline: impl Into<String>,
        current_state: impl ToString,
        attempted_operation: impl Into<String>,
    ) -> Self {
        Self::State {
            pipeline: pipeline.into(),
            current_state: current_state.to_string(),
            attempted_operation: attempted_operation.into(),
        }
    }

    /// Get the error category as a string
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Validation { .. } => "validation",
            Self::Io { .. } => "io",
            Self::Engine { .. } => "engine",
            Self::State { .. } => "state",
            Self::SessionConflict { .. } => "session_conflict",
        }
    }
}

/// Result type alias using the orchestrator error type
pub type IngestResult<T> = Result<T, IngestError>;

/// Error classification utilities
pub mod classify {
    use super::*;

    /// Requests refused before any engine command was issued.
    pub fn is_rejected_request(error: &IngestError) -> bool {
        matches!(
            error,
            IngestError::Config { .. } | IngestError::Validation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = IngestError::config("recording_filename", "missing '%d'");
        assert_eq!(error.category(), "config");
        assert!(classify::is_rejected_request(&error));
        assert!(error.to_string().contains("recording_filename"));
    }

    #[test]
    fn test_engine_error_classification() {
        let error = IngestError::engine(
            "play",
            "camera0",
            EngineError::NotFound("camera0".to_string()),
        );
        assert_eq!(error.category(), "engine");
        assert!(!classify::is_rejected_request(&error));
        assert!(!classify::is_rejected_request(&IngestError::state("camA", "deleted", "play")));
    }

    #[test]
    fn test_io_error_display_contains_path() {
        let error = IngestError::io(
            "create directory",
            "/tmp/nowhere/rec",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let text = error.to_string();
        assert!(text.contains("/tmp/nowhere/rec"));
        assert!(text.contains("create directory"));
    }
}
