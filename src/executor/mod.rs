//! Request executor
//!
//! Runs one logical provider operation through a leased credential.
//!
//! ```text
//!   acquire(cost) ──▶ attempt ──timeout/5xx──▶ backoff ──▶ attempt ... (same credential)
//!        ▲               │
//!        │          quota exceeded ──▶ report, re-acquire another credential
//!        │               │
//!        └───────────────┘  permanent ──▶ report, fail the operation
//! ```
//!
//! Every terminal outcome is reported to the pool before the executor
//! returns, so a caller never has to settle a lease itself.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ExecutorConfig;
use crate::credentials::{CredentialPool, Lease, SharedCredentialPool};
use crate::models::{Candidate, Query, SearchPage};
use crate::provider::SharedSearchProvider;
use crate::utils::error::{ExecutorError, FailureKind, ProviderError};
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Shared executor handle
pub type SharedRequestExecutor = Arc<RequestExecutor>;

/// A successful result and what it cost
#[derive(Debug, Clone, PartialEq)]
pub struct Metered<T> {
    pub value: T,
    pub units: u64,
    pub credential_id: String,
}

/// Issues provider calls with retry, timeout and credential rotation
pub struct RequestExecutor {
    provider: SharedSearchProvider,
    pool: SharedCredentialPool,
    retry: RetryConfig,
    attempt_timeout: Duration,
    search_cost: u64,
    details_cost: u64,
}

impl RequestExecutor {
    pub fn new(
        provider: SharedSearchProvider,
        pool: SharedCredentialPool,
        config: &ExecutorConfig,
    ) -> Self {
        Self {
            provider,
            pool,
            retry: config.retry_config(),
            attempt_timeout: config.attempt_timeout(),
            search_cost: config.search_cost,
            details_cost: config.details_cost,
        }
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    pub fn search_cost(&self) -> u64 {
        self.search_cost
    }

    /// Run `operation` on the leased credential
    ///
    /// Transient failures and timeouts are retried with backoff on the same
    /// credential. The lease is settled with the pool before returning.
    pub async fn execute<T, F, Fut>(
        &self,
        lease: Lease,
        units: u64,
        operation: F,
    ) -> Result<Metered<T>, ExecutorError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let credential_id = lease.credential_id().to_string();
        let secret = lease.secret().to_string();
        let timeout = self.attempt_timeout;

        let result = with_retry_if(
            &self.retry,
            |attempt| {
                let call = operation(secret.clone());
                let credential_id = credential_id.as_str();
                async move {
                    match tokio::time::timeout(timeout, call).await {
                        Ok(result) => result,
                        Err(_) => {
                            tracing::debug!(credential = credential_id, attempt, "Attempt timed out");
                            Err(ProviderError::Timeout(timeout))
                        }
                    }
                }
            },
            ProviderError::is_transient,
        )
        .await;

        match result {
            Ok(value) => {
                self.pool.report_success(lease, units);
                Ok(Metered {
                    value,
                    units,
                    credential_id,
                })
            }
            Err(failure) => {
                let err = failure.last_error;
                let kind = err.kind();
                self.pool.report_failure(lease, kind);

                Err(match kind {
                    FailureKind::Transient => ExecutorError::TransientProvider {
                        attempts: failure.attempts,
                        message: err.to_string(),
                    },
                    FailureKind::QuotaExceeded => ExecutorError::QuotaExceeded { credential_id },
                    FailureKind::PermanentInvalid => ExecutorError::PermanentCredential {
                        credential_id,
                        message: err.to_string(),
                    },
                    FailureKind::InvalidRequest => ExecutorError::InvalidRequest {
                        message: err.to_string(),
                    },
                })
            }
        }
    }

    /// Acquire, execute, and move to another credential on quota exhaustion
    ///
    /// Ends with `AllCredentialsExhausted` once the pool has nothing that can
    /// cover `cost`.
    async fn rotate<T, F, Fut>(&self, cost: u64, operation: F) -> Result<Metered<T>, ExecutorError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_rotations = self.pool.len().max(1);

        for _ in 0..max_rotations {
            let lease = self.pool.acquire(cost)?;
            match self.execute(lease, cost, &operation).await {
                Err(ExecutorError::QuotaExceeded { credential_id }) => {
                    tracing::info!(credential = %credential_id, "Rotating to next credential");
                }
                other => return other,
            }
        }

        Err(ExecutorError::AllCredentialsExhausted {
            estimated_cost: cost,
        })
    }

    /// Fetch one search page for `query`
    pub async fn search(
        &self,
        query: &Query,
        page_token: Option<&str>,
    ) -> Result<Metered<SearchPage>, ExecutorError> {
        let provider = Arc::clone(&self.provider);
        self.rotate(self.search_cost, |secret| {
            let provider = Arc::clone(&provider);
            let query = query.clone();
            let page_token = page_token.map(str::to_string);
            async move {
                provider
                    .search(&secret, &query, page_token.as_deref())
                    .await
            }
        })
        .await
    }

    /// Fetch metadata for one batch of ids
    pub async fn fetch_details(&self, ids: &[String]) -> Result<Metered<Vec<Candidate>>, ExecutorError> {
        let provider = Arc::clone(&self.provider);
        let ids = ids.to_vec();
        self.rotate(self.details_cost, |secret| {
            let provider = Arc::clone(&provider);
            let ids = ids.clone();
            async move { provider.fetch_details(&secret, &ids).await }
        })
        .await
    }
}
