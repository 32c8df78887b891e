//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};

use vidscout::config::ExecutorConfig;
use vidscout::credentials::{CredentialPool, CredentialSpec, PoolSettings};
use vidscout::executor::RequestExecutor;
use vidscout::models::{Candidate, ChannelStats};
use vidscout::orchestrator::{ExtractionOrchestrator, RunConfig};
use vidscout::provider::ScriptedProvider;
use vidscout::scoring::{ContentScorer, Thresholds};
use vidscout::storage::{InMemoryDeduplicator, MemorySink};

/// A well-formed 39 character key ending in `n`
pub fn test_key(n: u32) -> String {
    format!("AIzaSyTestKey{:0>26}", n)
}

/// A Sri Lankan travel video that clears the default thresholds comfortably
pub fn relevant_candidate(id: &str) -> Candidate {
    let fetched_at = Utc::now();
    let mut c = Candidate::new(id, "Kandy Esala Perahera walk | Sri Lanka", fetched_at);
    c.description = "Sinhala travel vlog from Colombo to Kandy".into();
    c.tags = vec!["travel".into(), "culture".into()];
    c.category_id = Some("19".into());
    c.default_language = Some("si".into());
    c.channel_id = "UC-lanka".into();
    c.channel_title = "Lanka Trails".into();
    c.view_count = 50_000;
    c.like_count = 3_000;
    c.comment_count = 200;
    c.duration_secs = Some(600);
    c.published_at = fetched_at - Duration::days(2);
    c.channel = Some(ChannelStats {
        subscriber_count: 120_000,
        video_count: 300,
        view_count: 9_000_000,
        country: Some("LK".into()),
    });
    c
}

/// Unrelated content with no regional signal
pub fn unrelated_candidate(id: &str) -> Candidate {
    let mut c = Candidate::new(id, "Cooking pasta at home", Utc::now());
    c.view_count = 10;
    c
}

/// Retry settings with no real waiting
pub fn fast_executor_config() -> ExecutorConfig {
    ExecutorConfig {
        max_attempts: 2,
        base_delay_ms: 1,
        max_delay_ms: 1,
        jitter: 0.0,
        ..Default::default()
    }
}

/// Pool of credentials whose ids and secrets are the given names
pub fn named_pool(names: &[&str], quota: u64, settings: PoolSettings) -> Arc<CredentialPool> {
    let specs = names
        .iter()
        .map(|n| CredentialSpec::new(*n, quota).with_id(*n))
        .collect();
    Arc::new(CredentialPool::new(specs, settings))
}

/// Everything an orchestrator test needs to inspect afterwards
pub struct Harness {
    pub provider: Arc<ScriptedProvider>,
    pub pool: Arc<CredentialPool>,
    pub dedup: Arc<InMemoryDeduplicator>,
    pub sink: Arc<MemorySink>,
    pub orchestrator: ExtractionOrchestrator,
}

impl Harness {
    pub fn new(provider: ScriptedProvider, pool: Arc<CredentialPool>, executor: ExecutorConfig) -> Self {
        let provider = Arc::new(provider);
        let dedup = Arc::new(InMemoryDeduplicator::new());
        let sink = Arc::new(MemorySink::new());

        let executor = Arc::new(RequestExecutor::new(
            provider.clone(),
            Arc::clone(&pool),
            &executor,
        ));
        let scorer = ContentScorer::new(&Default::default()).expect("default profile compiles");
        let orchestrator =
            ExtractionOrchestrator::new(executor, dedup.clone(), scorer, sink.clone());

        Self {
            provider,
            pool,
            dedup,
            sink,
            orchestrator,
        }
    }

    /// One credential with a generous quota
    pub fn single_key(provider: ScriptedProvider) -> Self {
        Self::new(
            provider,
            named_pool(&["key-a"], 10_000, PoolSettings::default()),
            fast_executor_config(),
        )
    }
}

pub fn serial_run_config() -> RunConfig {
    RunConfig {
        workers: 1,
        max_pages_per_query: 5,
        details_batch_size: 50,
        thresholds: Thresholds::default(),
    }
}
