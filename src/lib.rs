//! vidscout - quota-aware video metadata extraction
//!
//! Discovers videos through a search provider, deduplicates them against a
//! durable store, scores them for regional relevance and quality, and hands
//! accepted items to a sink, all under per-credential daily quotas.
//!
//! # Architecture
//!
//! - [`credentials`] - credential pool with quota tracking and rotation
//! - [`executor`] - retrying, credential-aware provider calls
//! - [`provider`] - search provider trait and the YouTube Data API client
//! - [`storage`] - dedup store and record sinks
//! - [`scoring`] - deterministic relevance and quality scoring
//! - [`orchestrator`] - worker pool that drives an extraction run
//! - [`config`] - configuration loading and validation
//! - [`models`] - shared data types
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vidscout::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let specs = ChainedCredentialSource::from_config(&config.credentials).load()?;
//!     let pool = Arc::new(CredentialPool::new(specs, PoolSettings::from(&config.credentials)));
//!     let provider = Arc::new(YouTubeProvider::from_config(&config)?);
//!     let executor = Arc::new(RequestExecutor::new(provider, pool, &config.executor));
//!
//!     let orchestrator = ExtractionOrchestrator::new(
//!         executor,
//!         Arc::new(SqliteDeduplicator::new(&config.dedup.sqlite_path)?),
//!         ContentScorer::new(&config.scoring)?,
//!         Arc::new(JsonlSink::open(&config.sink.output_path).await?),
//!     );
//!     let snapshot = orchestrator
//!         .run(default_strategies(chrono::Utc::now()), RunConfig::from_config(&config))
//!         .await?;
//!     println!("{} accepted", snapshot.counters.accepted);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod models;
pub mod orchestrator;
pub mod provider;
pub mod scoring;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::credentials::{
        ChainedCredentialSource, CredentialPool, CredentialSource, CredentialSpec, PoolSettings,
    };
    pub use crate::error::{Error, ErrorCategory, ErrorClass, Result};
    pub use crate::executor::RequestExecutor;
    pub use crate::models::{Candidate, Query, RunSnapshot, RunStatus, ScoredItem, Strategy};
    pub use crate::orchestrator::{default_strategies, ExtractionOrchestrator, RunConfig};
    pub use crate::provider::{SearchProvider, YouTubeProvider};
    pub use crate::scoring::{ContentScorer, Thresholds};
    pub use crate::storage::{Deduplicator, JsonlSink, RecordSink, SqliteDeduplicator};
}

pub use models::{Query, RunSnapshot, RunStatus, ScoredItem, Strategy};
