//! Extraction run orchestration
//!
//! An [`ExtractionOrchestrator`] drives one run at a time over a list of
//! queries using a bounded pool of workers.
//!
//! ```text
//!                 ┌──────────┐
//!   queries ────▶ │  queue   │ ◀── worker 0..N pull one query at a time
//!                 └──────────┘
//!   per query:  search page ──▶ dedup pre-check ──▶ fetch details (batched)
//!                    ▲                                    │
//!                    │ next page                          ▼
//!                    └──────── sink ◀── score ◀── check_and_insert
//! ```
//!
//! Run status moves `Idle → Running → {Completed, Failed, Stopped}` and never
//! leaves a terminal state. [`ExtractionOrchestrator::stop`] is cooperative:
//! it is observed before each query and before each page, never mid-request.

pub mod stats;
pub mod strategies;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;
use crate::executor::SharedRequestExecutor;
use crate::models::{Candidate, Query, QueryOutcome, RunSnapshot, RunStatus};
use crate::scoring::{ContentScorer, Thresholds};
use crate::storage::{DedupOutcome, SharedDeduplicator, SharedRecordSink};
use crate::utils::error::{DedupError, ExecutorError, SinkError};
use crate::utils::truncate_text;

pub use stats::RunStats;
pub use strategies::{default_strategies, targeted};

/// Largest id batch the provider accepts in one detail call
pub const MAX_DETAILS_BATCH: usize = 50;

// ============================================================================
// Errors
// ============================================================================

/// Errors returned by the orchestrator control surface
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Run {run_id} is already running")]
    AlreadyRunning { run_id: String },

    #[error("No queries to run")]
    NoQueries,

    #[error("No run has been started")]
    NotStarted,

    #[error("Invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("Dedup store unavailable: {0}")]
    Dedup(#[from] DedupError),
}

/// Why a single query stopped early
#[derive(Error, Debug)]
enum QueryError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("sink failed: {0}")]
    Sink(#[from] SinkError),

    #[error("dedup store failed: {0}")]
    Dedup(#[from] DedupError),
}

// ============================================================================
// Run Configuration
// ============================================================================

/// Per-run settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunConfig {
    pub workers: usize,
    pub max_pages_per_query: u32,
    pub details_batch_size: usize,
    pub thresholds: Thresholds,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_pages_per_query: 2,
            details_batch_size: MAX_DETAILS_BATCH,
            thresholds: Thresholds::default(),
        }
    }
}

impl RunConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.extraction.workers,
            max_pages_per_query: config.extraction.max_pages_per_query,
            details_batch_size: config.extraction.details_batch_size,
            thresholds: Thresholds {
                min_relevance: config.scoring.min_relevance,
                min_quality: config.scoring.min_quality,
            },
        }
    }

    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.workers == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "workers must be greater than 0".into(),
            ));
        }
        if self.max_pages_per_query == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "max_pages_per_query must be greater than 0".into(),
            ));
        }
        if self.details_batch_size == 0 || self.details_batch_size > MAX_DETAILS_BATCH {
            return Err(OrchestratorError::InvalidConfig(format!(
                "details_batch_size must be between 1 and {MAX_DETAILS_BATCH}"
            )));
        }
        let Thresholds {
            min_relevance,
            min_quality,
        } = self.thresholds;
        if !(0.0..=1.0).contains(&min_relevance) || !(0.0..=1.0).contains(&min_quality) {
            return Err(OrchestratorError::InvalidConfig(
                "thresholds must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Run Context
// ============================================================================

/// Everything one run shares between its workers and the control surface
struct RunContext {
    run_id: String,
    total_queries: usize,
    started_at: DateTime<Utc>,
    stats: Arc<RunStats>,
    outcomes: Mutex<Vec<QueryOutcome>>,
    /// Also serializes the terminal transition against `request_stop`
    failure: Mutex<Option<String>>,
    finished_at: Mutex<Option<DateTime<Utc>>>,
    status: watch::Sender<RunStatus>,
    cancel: watch::Sender<bool>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RunContext {
    fn new(total_queries: usize) -> Self {
        let (status, _) = watch::channel(RunStatus::Running);
        let (cancel, _) = watch::channel(false);
        Self {
            run_id: Uuid::new_v4().to_string(),
            total_queries,
            started_at: Utc::now(),
            stats: RunStats::new(),
            outcomes: Mutex::new(Vec::with_capacity(total_queries)),
            failure: Mutex::new(None),
            finished_at: Mutex::new(None),
            status,
            cancel,
        }
    }

    fn status(&self) -> RunStatus {
        *self.status.borrow()
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    fn has_failed(&self) -> bool {
        lock(&self.failure).is_some()
    }

    /// Record a run-fatal condition; the first reason wins
    fn fail(&self, reason: impl Into<String>) {
        let mut failure = lock(&self.failure);
        if failure.is_none() {
            let reason = reason.into();
            tracing::error!(run_id = %self.run_id, reason = %reason, "Run failed");
            *failure = Some(reason);
        }
    }

    fn record_outcome(&self, outcome: QueryOutcome) {
        self.stats.record_query(outcome.succeeded);
        lock(&self.outcomes).push(outcome);
    }

    fn record_skipped(&self, query: &Query) {
        self.stats.record_skipped();
        lock(&self.outcomes).push(QueryOutcome::skipped(query));
    }

    /// Raise the cancel flag; `false` once the run has settled
    fn request_stop(&self) -> bool {
        let _guard = lock(&self.failure);
        if self.status() != RunStatus::Running {
            return false;
        }
        self.cancel.send_replace(true);
        true
    }

    /// Decide the terminal status and publish it
    fn finish(&self) {
        let mut failure = lock(&self.failure);
        let succeeded = self.stats.queries_succeeded();
        let failed = self.stats.queries_failed();

        if failure.is_none() && succeeded == 0 && failed as usize == self.total_queries {
            *failure = Some(format!("all {failed} queries failed"));
        }

        let status = if failure.is_some() {
            RunStatus::Failed
        } else if self.is_cancelled() {
            RunStatus::Stopped
        } else {
            RunStatus::Completed
        };

        *lock(&self.finished_at) = Some(Utc::now());
        self.status.send_replace(status);
        drop(failure);
    }

    fn snapshot(&self) -> RunSnapshot {
        let failure_reason = lock(&self.failure).clone();
        let finished_at = *lock(&self.finished_at);
        let outcomes = lock(&self.outcomes).clone();
        RunSnapshot {
            run_id: self.run_id.clone(),
            status: self.status(),
            counters: self.stats.snapshot(),
            outcomes,
            started_at: Some(self.started_at),
            finished_at,
            failure_reason,
        }
    }
}

// ============================================================================
// Query Processing
// ============================================================================

/// Outcome under construction plus how many of its candidates are accounted for
struct QueryProgress {
    outcome: QueryOutcome,
    settled: u64,
}

impl QueryProgress {
    fn new(query: &Query) -> Self {
        Self {
            outcome: QueryOutcome::new(query),
            settled: 0,
        }
    }

    fn settle(&mut self) {
        self.settled += 1;
    }

    /// Candidates seen by this query that never reached a counter
    fn unsettled(&self) -> u64 {
        self.outcome.candidates.saturating_sub(self.settled)
    }
}

/// Collaborators used by the workers of one run
#[derive(Clone)]
struct Pipeline {
    executor: SharedRequestExecutor,
    dedup: SharedDeduplicator,
    scorer: Arc<ContentScorer>,
    sink: SharedRecordSink,
}

impl Pipeline {
    /// Page through `query`, feeding every result through dedup, scoring and the sink
    async fn process_query(
        &self,
        query: &Query,
        config: &RunConfig,
        ctx: &RunContext,
        progress: &mut QueryProgress,
    ) -> Result<(), QueryError> {
        let mut page_token = query.page_token.clone();

        while progress.outcome.pages < config.max_pages_per_query {
            if progress.outcome.pages > 0 && ctx.is_cancelled() {
                tracing::info!(query = %query.text, pages = progress.outcome.pages, "Stop requested, truncating query");
                progress.outcome.truncated = true;
                break;
            }

            let page = self.executor.search(query, page_token.as_deref()).await?;
            ctx.stats.record_page(page.units);
            progress.outcome.pages += 1;

            tracing::debug!(
                query = %query.text,
                page = progress.outcome.pages,
                ids = page.value.ids.len(),
                credential = %page.credential_id,
                "Search page fetched"
            );

            self.process_page(query, page.value.ids, config, ctx, progress)
                .await?;

            match page.value.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(())
    }

    async fn process_page(
        &self,
        query: &Query,
        ids: Vec<String>,
        config: &RunConfig,
        ctx: &RunContext,
        progress: &mut QueryProgress,
    ) -> Result<(), QueryError> {
        ctx.stats.record_candidates(ids.len() as u64);
        progress.outcome.candidates += ids.len() as u64;

        // Known ids never cost a detail fetch
        let mut fresh: Vec<String> = Vec::with_capacity(ids.len());
        for id in ids {
            if fresh.contains(&id) || self.dedup.contains(&id)? {
                ctx.stats.record_duplicate();
                progress.settle();
            } else {
                fresh.push(id);
            }
        }

        for batch in fresh.chunks(config.details_batch_size) {
            let details = self.executor.fetch_details(batch).await?;
            ctx.stats.record_units(details.units);

            let mut by_id: HashMap<String, Candidate> = details
                .value
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect();

            for id in batch {
                match by_id.remove(id) {
                    Some(candidate) => {
                        self.process_candidate(query, candidate, ctx, progress)
                            .await?
                    }
                    None => {
                        tracing::warn!(query = %query.text, id = %id, "No details returned for item");
                        ctx.stats.record_error();
                        progress.settle();
                    }
                }
            }
        }

        Ok(())
    }

    /// Dedup, score and forward one candidate
    ///
    /// Settles the candidate on every path except a failure, which leaves it
    /// for the caller to count.
    async fn process_candidate(
        &self,
        query: &Query,
        candidate: Candidate,
        ctx: &RunContext,
        progress: &mut QueryProgress,
    ) -> Result<(), QueryError> {
        if self.dedup.check_and_insert(&candidate.id)? == DedupOutcome::Duplicate {
            ctx.stats.record_duplicate();
            progress.settle();
            return Ok(());
        }

        let item = match self.scorer.score(&candidate) {
            Ok(item) => item.with_source(query),
            Err(e) => {
                tracing::warn!(id = %candidate.id, error = %e, "Candidate could not be scored");
                ctx.stats.record_error();
                progress.settle();
                return Ok(());
            }
        };

        if !item.accepted {
            tracing::debug!(
                id = %item.id(),
                title = %truncate_text(&item.candidate.title, 60),
                relevance = item.scores.relevance,
                quality = item.scores.quality,
                "Candidate rejected"
            );
            ctx.stats.record_rejected();
            progress.settle();
            return Ok(());
        }

        if let Err(e) = self.sink.accept(&item).await {
            // Never delivered, so a later run may pick it up again
            self.dedup.remove(item.id())?;
            return Err(e.into());
        }
        ctx.stats.record_accepted();
        progress.settle();
        progress.outcome.accepted += 1;
        Ok(())
    }

    /// Pull queries until the queue drains, the run is stopped, or it fails
    async fn worker(
        self,
        worker_id: usize,
        queue: Arc<tokio::sync::Mutex<mpsc::Receiver<Query>>>,
        config: RunConfig,
        ctx: Arc<RunContext>,
    ) {
        loop {
            if ctx.is_cancelled() || ctx.has_failed() {
                break;
            }
            if ctx.stats.queries_succeeded() == 0 && self.executor.pool().all_disabled() {
                ctx.fail("all credentials disabled before any query completed");
                break;
            }

            let query = {
                let mut rx = queue.lock().await;
                rx.recv().await
            };
            let Some(query) = query else {
                break;
            };

            tracing::info!(worker_id, query = %query.text, strategy = %query.strategy, "Processing query");

            let mut progress = QueryProgress::new(&query);
            let result = self.process_query(&query, &config, &ctx, &mut progress).await;

            let abandoned = progress.unsettled();
            if abandoned > 0 {
                ctx.stats.record_errors(abandoned);
            }

            let mut outcome = progress.outcome;
            match result {
                Ok(()) => {
                    outcome.succeeded = true;
                    tracing::info!(
                        worker_id,
                        query = %query.text,
                        pages = outcome.pages,
                        accepted = outcome.accepted,
                        truncated = outcome.truncated,
                        "Query completed"
                    );
                }
                Err(e) => {
                    if let QueryError::Dedup(ref inner) = e {
                        ctx.fail(format!("dedup store error: {inner}"));
                    }
                    tracing::warn!(
                        worker_id,
                        query = %query.text,
                        abandoned,
                        error = %e,
                        "Query failed"
                    );
                    outcome.error = Some(e.to_string());
                }
            }

            ctx.record_outcome(outcome);
        }

        tracing::debug!(worker_id, "Worker shutting down");
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives extraction runs, one at a time
pub struct ExtractionOrchestrator {
    pipeline: Pipeline,
    purge_retention: Option<Duration>,
    current: Mutex<Option<Arc<RunContext>>>,
}

impl ExtractionOrchestrator {
    pub fn new(
        executor: SharedRequestExecutor,
        dedup: SharedDeduplicator,
        scorer: ContentScorer,
        sink: SharedRecordSink,
    ) -> Self {
        Self {
            pipeline: Pipeline {
                executor,
                dedup,
                scorer: Arc::new(scorer),
                sink,
            },
            purge_retention: None,
            current: Mutex::new(None),
        }
    }

    /// Purge dedup records older than `retention` at the start of every run
    #[must_use]
    pub fn with_purge(mut self, retention: Duration) -> Self {
        self.purge_retention = Some(retention);
        self
    }

    /// Begin a run in the background and return its id
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, queries: Vec<Query>, config: RunConfig) -> Result<String, OrchestratorError> {
        config.validate()?;
        if queries.is_empty() {
            return Err(OrchestratorError::NoQueries);
        }

        let mut current = lock(&self.current);
        if let Some(run) = current.as_ref() {
            if run.status() == RunStatus::Running {
                return Err(OrchestratorError::AlreadyRunning {
                    run_id: run.run_id.clone(),
                });
            }
        }

        if let Some(retention) = self.purge_retention {
            let purged = self.pipeline.dedup.purge_older_than(retention)?;
            tracing::info!(purged, retention_secs = retention.as_secs(), "Purged expired dedup records");
        }

        let ctx = Arc::new(RunContext::new(queries.len()));
        *current = Some(Arc::clone(&ctx));
        drop(current);

        tracing::info!(
            run_id = %ctx.run_id,
            queries = queries.len(),
            workers = config.workers,
            "Extraction run started"
        );

        let mut pipeline = self.pipeline.clone();
        pipeline.scorer = Arc::new(pipeline.scorer.with_thresholds(config.thresholds));
        tokio::spawn(drive(pipeline, queries, config, Arc::clone(&ctx)));

        Ok(ctx.run_id.clone())
    }

    /// Ask the current run to stop at the next query or page boundary
    ///
    /// Returns `false` if there is no running run.
    pub fn stop(&self) -> bool {
        let Some(run) = lock(&self.current).clone() else {
            return false;
        };
        let accepted = run.request_stop();
        if accepted {
            tracing::info!(run_id = %run.run_id, "Stop requested");
        }
        accepted
    }

    /// Snapshot of the current or most recent run
    pub fn status(&self) -> RunSnapshot {
        match lock(&self.current).as_ref() {
            Some(run) => run.snapshot(),
            None => RunSnapshot::idle(),
        }
    }

    /// Wait for the current run to reach a terminal status
    pub async fn wait(&self) -> Result<RunSnapshot, OrchestratorError> {
        let run = lock(&self.current)
            .clone()
            .ok_or(OrchestratorError::NotStarted)?;

        let mut rx = run.status.subscribe();
        // The sender lives in `run`, so the channel cannot close here
        let _ = rx.wait_for(RunStatus::is_terminal).await;
        Ok(run.snapshot())
    }

    /// Start a run and wait for it to finish
    pub async fn run(&self, queries: Vec<Query>, config: RunConfig) -> Result<RunSnapshot, OrchestratorError> {
        self.start(queries, config)?;
        self.wait().await
    }
}

/// Feed the queue, run the workers, then settle the run
async fn drive(pipeline: Pipeline, queries: Vec<Query>, config: RunConfig, ctx: Arc<RunContext>) {
    let (tx, rx) = mpsc::channel::<Query>(queries.len());
    for query in queries {
        if tx.send(query).await.is_err() {
            break;
        }
    }
    drop(tx);

    let queue = Arc::new(tokio::sync::Mutex::new(rx));
    let handles: Vec<JoinHandle<()>> = (0..config.workers)
        .map(|worker_id| {
            tokio::spawn(pipeline.clone().worker(
                worker_id,
                Arc::clone(&queue),
                config,
                Arc::clone(&ctx),
            ))
        })
        .collect();

    for result in join_all(handles).await {
        if let Err(e) = result {
            ctx.fail(format!("worker task failed: {e}"));
        }
    }

    // Whatever is still queued was never started
    let mut rx = queue.lock().await;
    while let Ok(query) = rx.try_recv() {
        ctx.record_skipped(&query);
    }
    drop(rx);

    if let Err(e) = pipeline.sink.flush().await {
        tracing::warn!(error = %e, "Failed to flush sink");
    }

    ctx.finish();

    let snapshot = ctx.snapshot();
    tracing::info!(
        run_id = %snapshot.run_id,
        status = %snapshot.status,
        accepted = snapshot.counters.accepted,
        duplicates = snapshot.counters.filtered_by_dedup,
        rejected = snapshot.counters.filtered_by_score,
        errored = snapshot.counters.errored,
        quota_units = snapshot.counters.quota_units,
        "Extraction run finished"
    );
}
