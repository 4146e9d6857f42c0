use std::io;
use thiserror::Error;

/// Crate-wide error type, consolidating all possible errors into a single enum.
///
/// Expected outcomes (ambiguous intents, denied access) are never reported
/// through this type; it only carries configuration and programming errors,
/// plus failures raised by intent handlers.
#[derive(Debug, Error)]
pub enum AppError {
    /// Represents standard input/output errors.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Represents data validation errors (e.g., invalid input format).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Represents configuration-related errors (e.g., a category with no role entry).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rule pattern that does not compile as a regular expression.
    #[error("Invalid pattern `{pattern}` for intent `{intent}`: {reason}")]
    InvalidPattern {
        intent: String,
        pattern: String,
        reason: String,
    },

    /// A malformed intent registration (empty name, duplicate name, no patterns).
    #[error("Registration error: {0}")]
    Registration(String),

    /// Raised by an intent handler while serving a request.
    #[error("Handler error: {0}")]
    Handler(String),

    /// Represents unexpected internal errors that indicate a bug.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        match self {
            AppError::Io(e) => AppError::Io(io::Error::new(e.kind(), e.to_string())),
            AppError::Validation(s) => AppError::Validation(s.clone()),
            AppError::Config(s) => AppError::Config(s.clone()),
            AppError::InvalidPattern {
                intent,
                pattern,
                reason,
            } => AppError::InvalidPattern {
                intent: intent.clone(),
                pattern: pattern.clone(),
                reason: reason.clone(),
            },
            AppError::Registration(s) => AppError::Registration(s.clone()),
            AppError::Handler(s) => AppError::Handler(s.clone()),
            AppError::Internal(s) => AppError::Internal(s.clone()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON error: {}", err))
    }
}

impl From<regex::Error> for AppError {
    fn from(err: regex::Error) -> Self {
        AppError::Validation(format!("Regex error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("Validation errors: {}", err))
    }
}
