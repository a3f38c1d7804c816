use thiserror::Error;

/// Result type for doxa operations
pub type Result<T> = std::result::Result<T, DoxaError>;

/// Main error type for the doxa library
#[derive(Debug, Error)]
pub enum DoxaError {
    /// The designated true hypothesis is not part of the hypothesis set
    #[error("Unknown hypothesis '{label}': expected one of {known:?}")]
    UnknownHypothesis {
        label: String,
        known: Vec<String>,
    },

    /// Two hypotheses share a label
    #[error("Duplicate hypothesis label '{0}'")]
    DuplicateHypothesis(String),

    /// Invalid parameter value
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// Invalid dimensions (belief length, action spaces, table metadata)
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Value bounds requested for an undiscounted problem without a horizon
    #[error("Unbounded value: {0}")]
    UnboundedValue(String),

    /// State not present in a finite model
    #[error("Unknown state: {0}")]
    UnknownState(String),

    /// Observed trajectory cannot be replayed through the belief dynamics
    #[error("Incompatible trajectory at step {step}: {reason}")]
    IncompatibleTrajectory {
        step: usize,
        reason: String,
    },

    /// A policy is required but the model has not been solved
    #[error("Model has not been solved")]
    NotSolved,

    /// IO errors (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for DoxaError {
    fn from(err: bincode::Error) -> Self {
        DoxaError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for DoxaError {
    fn from(err: serde_json::Error) -> Self {
        DoxaError::Serialization(err.to_string())
    }
}

// Helper functions for common error patterns
impl DoxaError {
    pub fn dimension_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        DoxaError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        DoxaError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DoxaError::UnknownHypothesis {
            label: "zzz".to_string(),
            known: vec!["xoo".to_string(), "oxx".to_string()],
        };
        assert!(err.to_string().contains("zzz"));
        assert!(err.to_string().contains("xoo"));

        let err = DoxaError::invalid_parameter("n_probability_bins", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "Invalid parameter 'n_probability_bins': must be at least 1"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: DoxaError = io.into();
        assert!(matches!(err, DoxaError::Io(_)));
    }
}
