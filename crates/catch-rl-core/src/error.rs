//! Error types for the RL core library

use thiserror::Error;

/// Core error type for RL operations
#[derive(Error, Debug)]
pub enum RLError {
    /// Invalid or inconsistent configuration, fatal at startup
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Non-finite loss or gradient during an update
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// The environment broke its reset/step contract
    #[error("Environment error: {0}")]
    Environment(String),

    /// Agent-related errors
    #[error("Agent error: {0}")]
    Agent(String),

    /// Invalid action
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected number of elements
        expected: usize,
        /// Number of elements received
        actual: usize,
    },

    /// Tensor reshape failure
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for RL operations
pub type Result<T> = std::result::Result<T, RLError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let err: RLError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert!(matches!(err, RLError::Io(_)));
        assert_eq!(err.to_string(), "IO error: disk full");
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = RLError::DimensionMismatch { expected: 3, actual: 98 };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 3, got 98");
    }
}
