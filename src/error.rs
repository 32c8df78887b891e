//! Unified error handling for the vidscout crate
//!
//! Domain errors stay usable on their own; this module folds them into a
//! single [`Error`] so library callers and the CLI can handle one type.
//!
//! # Architecture
//!
//! - [`ErrorClass`] - common interface implemented by every domain error
//! - [`ErrorCategory`] - coarse classification used for handling strategies
//! - [`Error`] - unified enum wrapping the domain errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use vidscout::error::{Error, ErrorClass};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(category = ?err.category(), "retrying: {err}");
//!     } else {
//!         tracing::error!("fatal: {err}");
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::orchestrator::OrchestratorError;
pub use crate::scoring::ScoringError;
pub use crate::utils::error::{DedupError, ExecutorError, FailureKind, ProviderError, SinkError};

/// Common trait for all vidscout error types
pub trait ErrorClass: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Timeouts, 5xx and connection failures
    Network,
    /// Quota or rate-limit exhaustion
    Quota,
    /// Rejected or disabled credentials
    Credential,
    /// Request refused by the provider
    Request,
    /// Dedup store, sink and file I/O
    Storage,
    /// Candidate could not be scored
    Scoring,
    /// Configuration and validation errors
    Config,
    /// Run lifecycle misuse
    Orchestration,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Quota => "quota",
            Self::Credential => "credential",
            Self::Request => "request",
            Self::Storage => "storage",
            Self::Scoring => "scoring",
            Self::Config => "config",
            Self::Orchestration => "orchestration",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the vidscout crate
#[derive(Error, Debug)]
pub enum Error {
    /// Single provider call failure
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Terminal outcome of a logical provider operation
    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// Deduplication store failure
    #[error("Dedup store error: {0}")]
    Dedup(#[from] DedupError),

    /// Candidate scoring failure
    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    /// Record sink failure
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Run lifecycle errors
    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ErrorClass for ProviderError {
    fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            FailureKind::Transient | FailureKind::QuotaExceeded
        )
    }

    fn category(&self) -> ErrorCategory {
        match self.kind() {
            FailureKind::Transient => ErrorCategory::Network,
            FailureKind::QuotaExceeded => ErrorCategory::Quota,
            FailureKind::PermanentInvalid => ErrorCategory::Credential,
            FailureKind::InvalidRequest => ErrorCategory::Request,
        }
    }
}

impl ErrorClass for ExecutorError {
    fn is_recoverable(&self) -> bool {
        ExecutorError::is_recoverable(self)
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::TransientProvider { .. } => ErrorCategory::Network,
            Self::QuotaExceeded { .. } | Self::AllCredentialsExhausted { .. } => {
                ErrorCategory::Quota
            }
            Self::PermanentCredential { .. } => ErrorCategory::Credential,
            Self::InvalidRequest { .. } => ErrorCategory::Request,
        }
    }
}

impl ErrorClass for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Provider(e) => ErrorClass::is_recoverable(e),
            Self::Executor(e) => ErrorClass::is_recoverable(e),
            Self::Dedup(_) => false,
            Self::Scoring(_) => false,
            Self::Sink(_) => false,
            Self::Orchestrator(_) => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Provider(e) => e.category(),
            Self::Executor(e) => e.category(),
            Self::Dedup(_) | Self::Sink(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Scoring(_) => ErrorCategory::Scoring,
            Self::Orchestrator(_) => ErrorCategory::Orchestration,
            Self::Json(_) => ErrorCategory::Storage,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: format!("{err:#}"),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let err = Error::Provider(ProviderError::QuotaExceeded("dailyLimitExceeded".into()));
        assert_eq!(err.category(), ErrorCategory::Quota);

        let err = Error::Executor(ExecutorError::PermanentCredential {
            credential_id: "cred-1".into(),
            message: "keyInvalid".into(),
        });
        assert_eq!(err.category(), ErrorCategory::Credential);

        let err = Error::Provider(ProviderError::BadRequest("400 (invalidPageToken)".into()));
        assert_eq!(err.category(), ErrorCategory::Request);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_is_recoverable() {
        let err = Error::Provider(ProviderError::Transient("503".into()));
        assert!(err.is_recoverable());

        let err = Error::Executor(ExecutorError::AllCredentialsExhausted { estimated_cost: 100 });
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_error_conversion() {
        let unified: Error = DedupError::Poisoned.into();
        assert!(matches!(unified, Error::Dedup(_)));
        assert_eq!(unified.category(), ErrorCategory::Storage);
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("workers must be greater than 0");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }
}
