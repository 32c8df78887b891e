//! Durable deduplication of accepted item ids
//!
//! [`Deduplicator::check_and_insert`] is the only way an id enters the store,
//! and it is atomic: when several workers race on the same id exactly one
//! sees [`DedupOutcome::New`]. Records expire through
//! [`Deduplicator::purge_older_than`], which takes the same lock as checks.
//!
//! # Implementations
//!
//! - [`SqliteDeduplicator`] - persistent, WAL-mode SQLite
//! - [`InMemoryDeduplicator`] - same contract without persistence

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::utils::error::DedupError;

/// Shared deduplicator handle
pub type SharedDeduplicator = Arc<dyn Deduplicator>;

// ============================================================================
// Core Types
// ============================================================================

/// Result of an atomic check-and-insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupOutcome {
    /// First time this id was seen; it is now recorded
    New,
    /// Already recorded
    Duplicate,
}

/// One recorded id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupRecord {
    pub item_id: String,
    pub first_seen: DateTime<Utc>,
}

fn ttl_cutoff(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
    now.checked_sub_signed(ttl).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// ============================================================================
// Trait
// ============================================================================

/// Store of item ids that have already been accepted
pub trait Deduplicator: Send + Sync {
    /// Record `item_id` as first seen at `at` unless it is already present
    fn check_and_insert_at(
        &self,
        item_id: &str,
        at: DateTime<Utc>,
    ) -> Result<DedupOutcome, DedupError>;

    /// Record `item_id` now unless it is already present
    fn check_and_insert(&self, item_id: &str) -> Result<DedupOutcome, DedupError> {
        self.check_and_insert_at(item_id, Utc::now())
    }

    /// Read-only membership check
    fn contains(&self, item_id: &str) -> Result<bool, DedupError>;

    fn get(&self, item_id: &str) -> Result<Option<DedupRecord>, DedupError>;

    /// Forget `item_id` so it counts as new again; returns whether it was present
    fn remove(&self, item_id: &str) -> Result<bool, DedupError>;

    /// Remove records first seen before `cutoff`; returns how many
    fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DedupError>;

    /// Remove records older than `ttl`; returns how many
    fn purge_older_than(&self, ttl: Duration) -> Result<usize, DedupError> {
        self.purge_before(ttl_cutoff(Utc::now(), ttl))
    }

    fn len(&self) -> Result<usize, DedupError>;

    fn is_empty(&self) -> Result<bool, DedupError> {
        Ok(self.len()? == 0)
    }
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite-backed deduplicator
///
/// Uses `Mutex` to serialize access to the connection.
pub struct SqliteDeduplicator {
    conn: Mutex<Connection>,
}

impl SqliteDeduplicator {
    /// Open (or create) the store at `path`
    pub fn new(path: impl AsRef<Path>) -> Result<Self, DedupError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "Dedup store initialized");
        Ok(store)
    }

    /// In-memory SQLite store
    pub fn in_memory() -> Result<Self, DedupError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DedupError> {
        self.conn.lock().map_err(|_| DedupError::Poisoned)
    }

    fn create_schema(&self) -> Result<(), DedupError> {
        self.conn()?.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS dedup_records (
                    item_id TEXT PRIMARY KEY,
                    first_seen_ms INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_dedup_records_first_seen
                    ON dedup_records(first_seen_ms);
                "#,
        )?;
        Ok(())
    }
}

impl Deduplicator for SqliteDeduplicator {
    fn check_and_insert_at(
        &self,
        item_id: &str,
        at: DateTime<Utc>,
    ) -> Result<DedupOutcome, DedupError> {
        let inserted = self.conn()?.execute(
            "INSERT OR IGNORE INTO dedup_records (item_id, first_seen_ms) VALUES (?1, ?2)",
            params![item_id, at.timestamp_millis()],
        )?;

        Ok(if inserted == 1 {
            DedupOutcome::New
        } else {
            DedupOutcome::Duplicate
        })
    }

    fn contains(&self, item_id: &str) -> Result<bool, DedupError> {
        let exists: bool = self.conn()?.query_row(
            "SELECT EXISTS(SELECT 1 FROM dedup_records WHERE item_id = ?1)",
            params![item_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn get(&self, item_id: &str) -> Result<Option<DedupRecord>, DedupError> {
        let millis: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT first_seen_ms FROM dedup_records WHERE item_id = ?1",
                params![item_id],
                |row| row.get(0),
            )
            .optional()?;

        millis
            .map(|ms| match Utc.timestamp_millis_opt(ms).single() {
                Some(first_seen) => Ok(DedupRecord {
                    item_id: item_id.to_string(),
                    first_seen,
                }),
                None => Err(DedupError::Corrupt {
                    id: item_id.to_string(),
                    reason: format!("timestamp {ms} out of range"),
                }),
            })
            .transpose()
    }

    fn remove(&self, item_id: &str) -> Result<bool, DedupError> {
        let removed = self.conn()?.execute(
            "DELETE FROM dedup_records WHERE item_id = ?1",
            params![item_id],
        )?;
        Ok(removed == 1)
    }

    fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DedupError> {
        let removed = self.conn()?.execute(
            "DELETE FROM dedup_records WHERE first_seen_ms < ?1",
            params![cutoff.timestamp_millis()],
        )?;
        tracing::info!(removed, cutoff = %cutoff, "Purged expired dedup records");
        Ok(removed)
    }

    fn len(&self) -> Result<usize, DedupError> {
        let count: i64 =
            self.conn()?
                .query_row("SELECT COUNT(*) FROM dedup_records", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }
}

// ============================================================================
// In-Memory Implementation
// ============================================================================

/// Non-persistent deduplicator with the same semantics
#[derive(Debug, Default)]
pub struct InMemoryDeduplicator {
    records: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl InMemoryDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> Result<MutexGuard<'_, HashMap<String, DateTime<Utc>>>, DedupError> {
        self.records.lock().map_err(|_| DedupError::Poisoned)
    }
}

impl Deduplicator for InMemoryDeduplicator {
    fn check_and_insert_at(
        &self,
        item_id: &str,
        at: DateTime<Utc>,
    ) -> Result<DedupOutcome, DedupError> {
        let mut records = self.records()?;
        if records.contains_key(item_id) {
            return Ok(DedupOutcome::Duplicate);
        }
        records.insert(item_id.to_string(), at);
        Ok(DedupOutcome::New)
    }

    fn contains(&self, item_id: &str) -> Result<bool, DedupError> {
        Ok(self.records()?.contains_key(item_id))
    }

    fn get(&self, item_id: &str) -> Result<Option<DedupRecord>, DedupError> {
        Ok(self.records()?.get(item_id).map(|first_seen| DedupRecord {
            item_id: item_id.to_string(),
            first_seen: *first_seen,
        }))
    }

    fn remove(&self, item_id: &str) -> Result<bool, DedupError> {
        Ok(self.records()?.remove(item_id).is_some())
    }

    fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DedupError> {
        let mut records = self.records()?;
        let before = records.len();
        records.retain(|_, first_seen| *first_seen >= cutoff);
        Ok(before - records.len())
    }

    fn len(&self) -> Result<usize, DedupError> {
        Ok(self.records()?.len())
    }
}
