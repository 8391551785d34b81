//! Error types for shap-select

use thiserror::Error;

/// Result type alias for shap-select operations
pub type Result<T> = std::result::Result<T, ShapSelectError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum ShapSelectError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Scoring error: {0}")]
    ScoringError(String),

    #[error("SHAP error: {0}")]
    ShapError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("{0} is not fitted, run fit() first")]
    NotFitted(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid selection: no elimination round kept {requested} features (available: {available:?})")]
    InvalidSelection {
        requested: usize,
        available: Vec<usize>,
    },

    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<polars::error::PolarsError> for ShapSelectError {
    fn from(err: polars::error::PolarsError) -> Self {
        ShapSelectError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for ShapSelectError {
    fn from(err: serde_json::Error) -> Self {
        ShapSelectError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ShapSelectError {
    fn from(err: ndarray::ShapeError) -> Self {
        ShapSelectError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for ShapSelectError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        ShapSelectError::ThreadPoolError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ShapSelectError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ShapSelectError = io_err.into();
        assert!(matches!(err, ShapSelectError::IoError(_)));
    }

    #[test]
    fn test_invalid_selection_lists_available_counts() {
        let err = ShapSelectError::InvalidSelection {
            requested: 4,
            available: vec![3, 2, 1],
        };
        let msg = err.to_string();
        assert!(msg.contains("4"));
        assert!(msg.contains("[3, 2, 1]"));
    }
}
