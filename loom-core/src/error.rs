//! Error types shared by all Loom crates

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Loom operations
pub type Result<T> = std::result::Result<T, LoomError>;

/// Errors that can occur while resolving and running pipeline steps
#[derive(Debug, Error)]
pub enum LoomError {
    /// A required scalar parameter or artifact input was not supplied
    #[error("Missing parameter '{name}' for step '{step}'")]
    MissingParameter {
        /// Step being resolved
        step: String,
        /// Name of the missing parameter
        name: String,
    },

    /// A supplied parameter value does not match its declared type
    #[error("Invalid value for parameter '{name}' of step '{step}': expected {expected}, got {value}")]
    InvalidParameter {
        step: String,
        name: String,
        expected: String,
        value: String,
    },

    /// The step body failed or the step container exited non-zero
    #[error("Step '{step}' failed: {message}")]
    StepExecution {
        /// Step that failed
        step: String,
        /// Failure description
        message: String,
    },

    /// An artifact location was read before anything wrote it
    #[error("Artifact not found: {}", path.display())]
    ArtifactNotFound {
        /// Local path that was expected to exist
        path: PathBuf,
    },

    /// The pipeline or step declaration is malformed
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// The executor descriptor could not be interpreted
    #[error("Invalid executor descriptor: {0}")]
    InvalidDescriptor(String),

    /// The container runtime binary is missing or broken
    #[error("Container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LoomError {
    /// Create a missing parameter error
    pub fn missing_parameter(step: impl Into<String>, name: impl Into<String>) -> Self {
        Self::MissingParameter {
            step: step.into(),
            name: name.into(),
        }
    }

    /// Create a step execution error
    pub fn step_execution(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StepExecution {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Create an artifact not found error
    pub fn artifact_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ArtifactNotFound { path: path.into() }
    }

    /// Check if this error is a missing parameter error
    pub fn is_missing_parameter(&self) -> bool {
        matches!(self, Self::MissingParameter { .. })
    }

    /// Check if this error is a step execution error
    pub fn is_step_execution(&self) -> bool {
        matches!(self, Self::StepExecution { .. })
    }

    /// Check if this error is an artifact not found error
    pub fn is_artifact_not_found(&self) -> bool {
        matches!(self, Self::ArtifactNotFound { .. })
    }
}
