//! Lock-free run counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::models::RunCounters;

/// Run counters shared by all workers
#[derive(Debug, Default)]
pub struct RunStats {
    accepted: AtomicU64,
    filtered_by_dedup: AtomicU64,
    filtered_by_score: AtomicU64,
    errored: AtomicU64,
    candidates_seen: AtomicU64,
    pages_fetched: AtomicU64,
    quota_units: AtomicU64,
    queries_succeeded: AtomicU64,
    queries_failed: AtomicU64,
    queries_skipped: AtomicU64,
}

impl RunStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.filtered_by_dedup.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.filtered_by_score.fetch_add(1, Ordering::Relaxed);
    }

    /// A candidate that could not be scored or whose details never arrived
    pub fn record_error(&self) {
        self.record_errors(1);
    }

    /// Candidates abandoned when their query failed
    pub fn record_errors(&self, count: u64) {
        self.errored.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_candidates(&self, count: u64) {
        self.candidates_seen.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_page(&self, units: u64) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
        self.record_units(units);
    }

    pub fn record_units(&self, units: u64) {
        self.quota_units.fetch_add(units, Ordering::Relaxed);
    }

    pub fn record_query(&self, succeeded: bool) {
        if succeeded {
            self.queries_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.queries_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_skipped(&self) {
        self.queries_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn queries_succeeded(&self) -> u64 {
        self.queries_succeeded.load(Ordering::Relaxed)
    }

    pub fn queries_failed(&self) -> u64 {
        self.queries_failed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> RunCounters {
        RunCounters {
            accepted: self.accepted.load(Ordering::Relaxed),
            filtered_by_dedup: self.filtered_by_dedup.load(Ordering::Relaxed),
            filtered_by_score: self.filtered_by_score.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            candidates_seen: self.candidates_seen.load(Ordering::Relaxed),
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            quota_units: self.quota_units.load(Ordering::Relaxed),
            queries_succeeded: self.queries_succeeded.load(Ordering::Relaxed),
            queries_failed: self.queries_failed.load(Ordering::Relaxed),
            queries_skipped: self.queries_skipped.load(Ordering::Relaxed),
        }
    }
}
