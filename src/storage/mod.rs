//! Persistence for the extraction engine
//!
//! - [`dedup`] - durable store of already-accepted item ids
//! - [`sink`] - where accepted items are delivered

pub mod dedup;
pub mod sink;

pub use dedup::{
    DedupOutcome, DedupRecord, Deduplicator, InMemoryDeduplicator, SharedDeduplicator,
    SqliteDeduplicator,
};
pub use sink::{JsonlSink, MemorySink, RecordSink, SharedRecordSink};
