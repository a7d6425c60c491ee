//! Error types for the air-quality pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A required column is entirely missing or unusable; aborts that source
    #[error("Schema error in source '{source_name}': {reason}")]
    SchemaError { source_name: String, reason: String },

    /// Row-level constraint violation; recorded as a drop count by the normalizer
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Required sources share no keys, or a required source is empty
    #[error("Join error: {0}")]
    JoinError(String),

    /// Degenerate or insufficient target data; fatal for one task only
    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PipelineError {
    /// Shorthand for a schema error attributed to one source
    pub fn schema(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::SchemaError {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for PipelineError {
    fn from(err: bincode::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for PipelineError {
    fn from(err: toml::de::Error) -> Self {
        PipelineError::ConfigError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for PipelineError {
    fn from(err: ndarray::ShapeError) -> Self {
        PipelineError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::JoinError("no overlapping keys".to_string());
        assert_eq!(err.to_string(), "Join error: no overlapping keys");

        let err = PipelineError::schema("clima", "missing column 'fecha'");
        assert_eq!(
            err.to_string(),
            "Schema error in source 'clima': missing column 'fecha'"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PipelineError = io_err.into();
        assert!(matches!(err, PipelineError::IoError(_)));
    }
}
