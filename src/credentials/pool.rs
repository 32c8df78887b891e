//! Credential pool with quota tracking and rotation
//!
//! The pool owns every credential, its quota ceiling and its live usage.
//! Callers [`acquire`](CredentialPool::acquire) a [`Lease`] for an estimated
//! cost, make the provider call, then settle the lease with
//! [`report_success`](CredentialPool::report_success) or
//! [`report_failure`](CredentialPool::report_failure).
//!
//! # Quota accounting
//!
//! ```text
//!   eligible  ⇔  status == Active  &&  quota - used - reserved >= cost
//! ```
//!
//! A lease reserves its estimated cost until it is settled, so concurrent
//! acquires can never hand out more units than a credential has left. A
//! lease dropped without being settled gives its reservation back.
//!
//! All state transitions happen under a single mutex that is never held
//! across an `.await`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;

use super::source::CredentialSpec;
use crate::config::CredentialsConfig;
use crate::utils::error::{ExecutorError, FailureKind};
use crate::utils::secret_fingerprint;

/// Shared pool handle
pub type SharedCredentialPool = Arc<CredentialPool>;

// ============================================================================
// Types
// ============================================================================

/// Credential availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    Active,
    /// Out of quota until the next cycle reset
    Exhausted,
    /// Rejected by the provider; stays out of rotation across resets
    Disabled,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Exhausted => "exhausted",
            Self::Disabled => "disabled",
        }
    }
}

/// Pool behaviour knobs
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Permanent failures inside `failure_window` that disable a credential
    pub failure_threshold: u32,
    pub failure_window: Duration,
    /// Offset from UTC of the provider's quota day
    pub reset_utc_offset_hours: i32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            failure_window: Duration::from_secs(3600),
            reset_utc_offset_hours: -8,
        }
    }
}

impl From<&CredentialsConfig> for PoolSettings {
    fn from(config: &CredentialsConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            failure_window: Duration::from_secs(config.failure_window_secs),
            reset_utc_offset_hours: config.reset_utc_offset_hours,
        }
    }
}

/// Request counters kept per credential
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CredentialMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub quota_exceeded_count: u64,
    pub last_used: Option<DateTime<Utc>>,
}

/// Read-only view of one credential; never includes the secret
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialHealth {
    pub id: String,
    pub fingerprint: String,
    pub status: CredentialStatus,
    pub used: u64,
    pub reserved: u64,
    pub quota: u64,
    pub consecutive_failures: u32,
    pub last_reset: DateTime<Utc>,
    pub metrics: CredentialMetrics,
}

impl CredentialHealth {
    pub fn remaining(&self) -> u64 {
        self.quota.saturating_sub(self.used + self.reserved)
    }

    pub fn usage_ratio(&self) -> f64 {
        if self.quota == 0 {
            return 1.0;
        }
        self.used as f64 / self.quota as f64
    }
}

#[derive(Debug)]
struct Credential {
    id: String,
    secret: String,
    fingerprint: String,
    quota: u64,
    used: u64,
    reserved: u64,
    status: CredentialStatus,
    consecutive_failures: u32,
    failure_times: VecDeque<DateTime<Utc>>,
    last_reset: DateTime<Utc>,
    metrics: CredentialMetrics,
}

impl Credential {
    fn available(&self) -> u64 {
        self.quota.saturating_sub(self.used.saturating_add(self.reserved))
    }

    fn release(&mut self, units: u64) {
        self.reserved = self.reserved.saturating_sub(units);
    }

    fn health(&self) -> CredentialHealth {
        CredentialHealth {
            id: self.id.clone(),
            fingerprint: self.fingerprint.clone(),
            status: self.status,
            used: self.used,
            reserved: self.reserved,
            quota: self.quota,
            consecutive_failures: self.consecutive_failures,
            last_reset: self.last_reset,
            metrics: self.metrics.clone(),
        }
    }
}

#[derive(Debug)]
struct PoolState {
    credentials: Vec<Credential>,
    cursor: usize,
    cycle_day: NaiveDate,
}

fn lock_state(state: &Mutex<PoolState>) -> MutexGuard<'_, PoolState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Lease
// ============================================================================

/// Exclusive right to spend up to `reserved` units on one credential
///
/// Settle it through the pool. Dropping an unsettled lease releases the
/// reservation without touching usage.
#[derive(Debug)]
pub struct Lease {
    state: Arc<Mutex<PoolState>>,
    index: usize,
    credential_id: String,
    secret: String,
    reserved: u64,
    settled: bool,
}

impl Lease {
    pub fn credential_id(&self) -> &str {
        &self.credential_id
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn reserved_units(&self) -> u64 {
        self.reserved
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = lock_state(&self.state);
        if let Some(cred) = state.credentials.get_mut(self.index) {
            cred.release(self.reserved);
        }
    }
}

// ============================================================================
// Pool
// ============================================================================

/// Pool of rate-limited credentials
#[derive(Debug)]
pub struct CredentialPool {
    state: Arc<Mutex<PoolState>>,
    settings: PoolSettings,
}

impl CredentialPool {
    /// Build a pool; ids default to `key-1`, `key-2`, ... in input order
    pub fn new(specs: Vec<CredentialSpec>, settings: PoolSettings) -> Self {
        let now = Utc::now();
        let credentials = specs
            .into_iter()
            .enumerate()
            .map(|(i, spec)| Credential {
                id: spec.id.unwrap_or_else(|| format!("key-{}", i + 1)),
                fingerprint: secret_fingerprint(&spec.secret),
                secret: spec.secret,
                quota: spec.daily_quota,
                used: 0,
                reserved: 0,
                status: CredentialStatus::Active,
                consecutive_failures: 0,
                failure_times: VecDeque::new(),
                last_reset: now,
                metrics: CredentialMetrics::default(),
            })
            .collect::<Vec<_>>();

        tracing::info!(
            credentials = credentials.len(),
            threshold = settings.failure_threshold,
            "Credential pool initialized"
        );

        let cycle_day = quota_day(now, settings.reset_utc_offset_hours);
        Self {
            state: Arc::new(Mutex::new(PoolState {
                credentials,
                cursor: 0,
                cycle_day,
            })),
            settings,
        }
    }

    pub fn len(&self) -> usize {
        lock_state(&self.state).credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lease a credential that can cover `estimated_cost`
    ///
    /// Rotates round-robin among eligible credentials. Triggers the daily
    /// reset first if the quota day has rolled over.
    pub fn acquire(&self, estimated_cost: u64) -> Result<Lease, ExecutorError> {
        self.reset_if_due(Utc::now());

        let mut state = lock_state(&self.state);
        let n = state.credentials.len();

        for step in 0..n {
            let idx = (state.cursor + step) % n;
            let cred = &mut state.credentials[idx];
            if cred.status != CredentialStatus::Active || cred.available() < estimated_cost {
                continue;
            }

            cred.reserved += estimated_cost;
            cred.metrics.total_requests += 1;
            cred.metrics.last_used = Some(Utc::now());
            let lease = Lease {
                state: Arc::clone(&self.state),
                index: idx,
                credential_id: cred.id.clone(),
                secret: cred.secret.clone(),
                reserved: estimated_cost,
                settled: false,
            };
            state.cursor = (idx + 1) % n;

            tracing::trace!(credential = %lease.credential_id, estimated_cost, "Credential leased");
            return Ok(lease);
        }

        tracing::warn!(estimated_cost, "No credential can cover the request");
        Err(ExecutorError::AllCredentialsExhausted { estimated_cost })
    }

    /// Record a successful call and charge `units_consumed`
    pub fn report_success(&self, mut lease: Lease, units_consumed: u64) {
        let mut state = lock_state(&self.state);
        lease.settled = true;

        let cred = &mut state.credentials[lease.index];
        cred.release(lease.reserved);
        cred.used = cred.used.saturating_add(units_consumed).min(cred.quota);
        cred.consecutive_failures = 0;
        cred.metrics.successful_requests += 1;

        if cred.used >= cred.quota && cred.status == CredentialStatus::Active {
            cred.status = CredentialStatus::Exhausted;
            tracing::info!(credential = %cred.id, used = cred.used, quota = cred.quota, "Credential quota spent");
        }
    }

    /// Record a failed call and react according to `kind`
    pub fn report_failure(&self, lease: Lease, kind: FailureKind) {
        self.report_failure_at(lease, kind, Utc::now());
    }

    fn report_failure_at(&self, mut lease: Lease, kind: FailureKind, now: DateTime<Utc>) {
        let mut state = lock_state(&self.state);
        lease.settled = true;

        let threshold = self.settings.failure_threshold as usize;
        let window = chrono::Duration::from_std(self.settings.failure_window)
            .unwrap_or_else(|_| chrono::Duration::hours(1));

        let cred = &mut state.credentials[lease.index];
        cred.release(lease.reserved);
        cred.metrics.failed_requests += 1;

        match kind {
            FailureKind::Transient | FailureKind::InvalidRequest => {}
            FailureKind::QuotaExceeded => {
                cred.metrics.quota_exceeded_count += 1;
                if cred.status == CredentialStatus::Active {
                    cred.status = CredentialStatus::Exhausted;
                }
                tracing::warn!(credential = %cred.id, "Provider reported quota exceeded");
            }
            FailureKind::PermanentInvalid => {
                cred.consecutive_failures += 1;
                cred.failure_times.push_back(now);
                while let Some(first) = cred.failure_times.front() {
                    if now - *first > window {
                        cred.failure_times.pop_front();
                    } else {
                        break;
                    }
                }

                if cred.failure_times.len() >= threshold {
                    cred.status = CredentialStatus::Disabled;
                    tracing::error!(
                        credential = %cred.id,
                        failures = cred.failure_times.len(),
                        "Credential disabled after repeated rejections"
                    );
                } else {
                    tracing::warn!(
                        credential = %cred.id,
                        failures = cred.failure_times.len(),
                        threshold,
                        "Credential rejected by provider"
                    );
                }
            }
        }
    }

    /// Start a new quota cycle: zero usage, reactivate non-disabled credentials
    pub fn reset_cycle(&self) {
        let now = Utc::now();
        let mut state = lock_state(&self.state);
        Self::reset_locked(&mut state, now);
        state.cycle_day = quota_day(now, self.settings.reset_utc_offset_hours);
    }

    /// Reset if `now` falls on a later quota day than the current cycle
    ///
    /// Returns whether a reset happened.
    pub fn reset_if_due(&self, now: DateTime<Utc>) -> bool {
        let today = quota_day(now, self.settings.reset_utc_offset_hours);
        let mut state = lock_state(&self.state);
        if today <= state.cycle_day {
            return false;
        }
        Self::reset_locked(&mut state, now);
        state.cycle_day = today;
        tracing::info!(day = %today, "Quota day rolled over");
        true
    }

    fn reset_locked(state: &mut PoolState, now: DateTime<Utc>) {
        for cred in state
            .credentials
            .iter_mut()
            .filter(|c| c.status != CredentialStatus::Disabled)
        {
            cred.used = 0;
            cred.status = CredentialStatus::Active;
            cred.last_reset = now;
        }
        tracing::info!(credentials = state.credentials.len(), "Credential quota cycle reset");
    }

    /// Snapshot of every credential
    pub fn health(&self) -> Vec<CredentialHealth> {
        lock_state(&self.state)
            .credentials
            .iter()
            .map(Credential::health)
            .collect()
    }

    pub fn all_disabled(&self) -> bool {
        let state = lock_state(&self.state);
        !state.credentials.is_empty()
            && state
                .credentials
                .iter()
                .all(|c| c.status == CredentialStatus::Disabled)
    }

    /// Units that could still be leased across all active credentials
    pub fn available_units(&self) -> u64 {
        lock_state(&self.state)
            .credentials
            .iter()
            .filter(|c| c.status == CredentialStatus::Active)
            .map(Credential::available)
            .sum()
    }
}

/// Calendar day of the provider's quota clock
fn quota_day(now: DateTime<Utc>, offset_hours: i32) -> NaiveDate {
    match FixedOffset::east_opt(offset_hours * 3600) {
        Some(offset) => now.with_timezone(&offset).date_naive(),
        None => now.date_naive(),
    }
}
