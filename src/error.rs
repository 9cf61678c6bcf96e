use thiserror::Error;

/// Errors surfaced at the crate boundary.
///
/// Failures inside a model fit (too few observations, singular systems) are
/// not errors: they come back as a container with no beta and an infinite
/// goodness of fit, and the tree treats them as "never selected".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForestError {
    #[error("Data dimension mismatch: {message}")]
    DimensionMismatch { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Optimization error: {message}")]
    Optimization { message: String },

    #[error("Cross-validation produced no valid configuration")]
    NoValidConfiguration,

    #[error("Homogeneity test error: {message}")]
    Homogeneity { message: String },
}

impl ForestError {
    pub fn config(message: impl Into<String>) -> Self {
        ForestError::Config {
            message: message.into(),
        }
    }

    pub fn dimension(message: impl Into<String>) -> Self {
        ForestError::DimensionMismatch {
            message: message.into(),
        }
    }

    pub fn optimization(message: impl Into<String>) -> Self {
        ForestError::Optimization {
            message: message.into(),
        }
    }

    pub fn homogeneity(message: impl Into<String>) -> Self {
        ForestError::Homogeneity {
            message: message.into(),
        }
    }
}

impl From<argmin::core::Error> for ForestError {
    fn from(err: argmin::core::Error) -> Self {
        ForestError::optimization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ForestError>;
