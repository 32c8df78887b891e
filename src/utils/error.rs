//! Error types for the extraction engine
//!
//! Provider, executor, dedup-store and sink errors live here. Scoring and
//! orchestration errors are defined next to the code that raises them.

use std::time::Duration;
use thiserror::Error;

/// How the credential pool should react to a failed provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Timeout, connection failure or 5xx. Safe to retry on the same credential.
    Transient,
    /// Quota or rate limit hit. The credential is spent for this cycle.
    QuotaExceeded,
    /// Credential rejected (revoked, malformed, forbidden).
    PermanentInvalid,
    /// The request itself was refused. Says nothing about the credential.
    InvalidRequest,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::QuotaExceeded => "quota_exceeded",
            Self::PermanentInvalid => "permanent_invalid",
            Self::InvalidRequest => "invalid_request",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by a search provider for a single call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Server-side or network failure
    #[error("Transient provider failure: {0}")]
    Transient(String),

    /// Call exceeded its per-attempt deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Quota or rate limit reached for the credential in use
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Credential is not accepted by the provider
    #[error("Credential rejected: {0}")]
    PermanentInvalid(String),

    /// Bad parameters, unknown page token or missing resource
    #[error("Request rejected: {0}")]
    BadRequest(String),

    /// Response body could not be decoded
    #[error("Malformed provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Map this error onto the pool's failure classification
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transient(_) | Self::Timeout(_) | Self::Decode(_) => FailureKind::Transient,
            Self::QuotaExceeded(_) => FailureKind::QuotaExceeded,
            Self::PermanentInvalid(_) => FailureKind::PermanentInvalid,
            Self::BadRequest(_) => FailureKind::InvalidRequest,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == FailureKind::Transient
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transient(err.to_string())
        }
    }
}

/// Terminal outcome of one logical provider operation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    /// Retries on one credential were used up by transient failures
    #[error("Provider kept failing after {attempts} attempts: {message}")]
    TransientProvider { attempts: u32, message: String },

    /// The leased credential ran out of quota
    #[error("Credential {credential_id} exceeded its quota")]
    QuotaExceeded { credential_id: String },

    /// The leased credential was rejected by the provider
    #[error("Credential {credential_id} rejected: {message}")]
    PermanentCredential {
        credential_id: String,
        message: String,
    },

    /// The provider refused the request parameters
    #[error("Provider rejected the request: {message}")]
    InvalidRequest { message: String },

    /// No credential can cover the estimated cost
    #[error("All credentials exhausted (needed {estimated_cost} units)")]
    AllCredentialsExhausted { estimated_cost: u64 },
}

impl ExecutorError {
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::TransientProvider { .. } | Self::QuotaExceeded { .. }
        )
    }
}

/// Errors raised by the deduplication store
#[derive(Error, Debug)]
pub enum DedupError {
    /// Underlying SQLite failure
    #[error("Dedup database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Could not prepare the database location
    #[error("Dedup store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A thread panicked while holding the store lock
    #[error("Dedup store lock poisoned")]
    Poisoned,

    /// Stored timestamp could not be parsed
    #[error("Corrupt dedup record for {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Errors raised while forwarding accepted items downstream
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sink serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Downstream refused the record
    #[error("Sink rejected record {id}: {reason}")]
    Rejected { id: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_kinds() {
        assert_eq!(
            ProviderError::Timeout(Duration::from_secs(1)).kind(),
            FailureKind::Transient
        );
        assert_eq!(
            ProviderError::Decode("bad json".into()).kind(),
            FailureKind::Transient
        );
        assert_eq!(
            ProviderError::QuotaExceeded("quotaExceeded".into()).kind(),
            FailureKind::QuotaExceeded
        );
        assert_eq!(
            ProviderError::PermanentInvalid("keyInvalid".into()).kind(),
            FailureKind::PermanentInvalid
        );
        assert_eq!(
            ProviderError::BadRequest("invalidPageToken".into()).kind(),
            FailureKind::InvalidRequest
        );
        assert!(!ProviderError::BadRequest("badRequest".into()).is_transient());
    }

    #[test]
    fn test_executor_error_recoverable() {
        assert!(ExecutorError::QuotaExceeded {
            credential_id: "cred-0".into()
        }
        .is_recoverable());
        assert!(!ExecutorError::AllCredentialsExhausted { estimated_cost: 100 }.is_recoverable());
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::QuotaExceeded.to_string(), "quota_exceeded");
    }
}
