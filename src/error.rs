use std::fmt;
use std::time::Duration;

/// Result type for rl-aqm operations
pub type Result<T> = std::result::Result<T, AqmError>;

/// Main error type for the rl-aqm crate
#[derive(Debug, Clone, PartialEq)]
pub enum AqmError {
    /// Invalid dimensions for operations
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Invalid parameter value
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// More transitions were requested than the store holds
    InsufficientSamples {
        requested: usize,
        available: usize,
    },

    /// Invalid action
    InvalidAction {
        action: usize,
        max_actions: usize,
    },

    /// An environment call did not answer before its deadline
    Timeout {
        operation: String,
        after: Duration,
    },

    /// The environment failed or is unusable
    Environment(String),

    /// Numerical computation errors
    NumericalError(String),

    /// Configuration could not be read or parsed
    Config(String),

    /// IO errors (file operations)
    IoError(String),
}

impl fmt::Display for AqmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AqmError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {}, got {}", expected, actual)
            }
            AqmError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter '{}': {}", name, reason)
            }
            AqmError::InsufficientSamples { requested, available } => {
                write!(
                    f,
                    "Cannot sample {} transitions: only {} stored",
                    requested, available
                )
            }
            AqmError::InvalidAction { action, max_actions } => {
                write!(f, "Invalid action {}: must be less than {}", action, max_actions)
            }
            AqmError::Timeout { operation, after } => {
                write!(f, "Environment {} timed out after {:?}", operation, after)
            }
            AqmError::Environment(msg) => write!(f, "Environment error: {}", msg),
            AqmError::NumericalError(msg) => write!(f, "Numerical error: {}", msg),
            AqmError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AqmError::IoError(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for AqmError {}

impl From<std::io::Error> for AqmError {
    fn from(err: std::io::Error) -> Self {
        AqmError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for AqmError {
    fn from(err: serde_json::Error) -> Self {
        AqmError::Config(err.to_string())
    }
}

// Helper functions for common error patterns
impl AqmError {
    pub fn dimension_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        AqmError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        AqmError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Errors raised by the environment collaborator rather than the agent.
    /// The driver aborts the current episode on these and keeps training.
    pub fn is_environment_failure(&self) -> bool {
        matches!(self, AqmError::Timeout { .. } | AqmError::Environment(_))
    }
}
