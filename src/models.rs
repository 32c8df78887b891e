//! Core data structures for the extraction engine
//!
//! Queries go in, candidates come back from the provider, scored items go
//! out to the sink. Run-level snapshots are defined here too so the CLI and
//! library callers share one shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Queries
// ============================================================================

/// Why a query was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Location,
    Category,
    Cultural,
    Temporal,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Location => "location",
            Strategy::Category => "category",
            Strategy::Cultural => "cultural",
            Strategy::Temporal => "temporal",
        }
    }

    pub fn all() -> &'static [Strategy] {
        &[
            Strategy::Location,
            Strategy::Category,
            Strategy::Cultural,
            Strategy::Temporal,
        ]
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "location" => Ok(Strategy::Location),
            "category" => Ok(Strategy::Category),
            "cultural" => Ok(Strategy::Cultural),
            "temporal" => Ok(Strategy::Temporal),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

/// A search issued to the provider. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub strategy: Strategy,

    /// Cursor to start paging from; `None` starts at the first page
    #[serde(default)]
    pub page_token: Option<String>,

    #[serde(default)]
    pub published_after: Option<DateTime<Utc>>,

    #[serde(default)]
    pub published_before: Option<DateTime<Utc>>,

    /// Provider sort order (relevance, date, viewCount, ...)
    #[serde(default)]
    pub order: Option<String>,
}

impl Query {
    pub fn new(text: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            text: text.into(),
            strategy,
            page_token: None,
            published_after: None,
            published_before: None,
            order: None,
        }
    }

    #[must_use]
    pub fn published_after(mut self, at: DateTime<Utc>) -> Self {
        self.published_after = Some(at);
        self
    }

    #[must_use]
    pub fn published_before(mut self, at: DateTime<Utc>) -> Self {
        self.published_before = Some(at);
        self
    }

    #[must_use]
    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    #[must_use]
    pub fn starting_at(mut self, page_token: impl Into<String>) -> Self {
        self.page_token = Some(page_token.into());
        self
    }
}

/// One page of search results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

// ============================================================================
// Candidates
// ============================================================================

/// Channel-level statistics attached to a candidate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelStats {
    pub subscriber_count: u64,
    pub video_count: u64,
    pub view_count: u64,
    pub country: Option<String>,
}

/// Raw metadata for one item, as returned by a detail fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub category_id: Option<String>,
    pub default_language: Option<String>,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub channel_title: String,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    pub duration_secs: Option<u64>,
    pub definition: Option<String>,
    #[serde(default)]
    pub has_captions: bool,
    pub published_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub fetched_at: DateTime<Utc>,
    pub channel: Option<ChannelStats>,
}

impl Candidate {
    /// Minimal candidate with the given id and title; counters zeroed
    pub fn new(id: impl Into<String>, title: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            tags: Vec::new(),
            category_id: None,
            default_language: None,
            channel_id: String::new(),
            channel_title: String::new(),
            view_count: 0,
            like_count: 0,
            comment_count: 0,
            duration_secs: None,
            definition: None,
            has_captions: false,
            published_at: at,
            fetched_at: at,
            channel: None,
        }
    }
}

// ============================================================================
// Scored items
// ============================================================================

/// Sub-scores and composites, all in [0, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentScores {
    pub location: f64,
    pub cultural: f64,
    pub category: f64,
    pub relevance: f64,
    pub engagement_rate: f64,
    pub view_velocity: f64,
    pub completeness: f64,
    pub authority: f64,
    pub quality: f64,
}

/// Writing system detected in the item text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Script {
    Latin,
    Sinhala,
    Tamil,
    Mixed,
    Unknown,
}

/// A candidate with its scores and verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub candidate: Candidate,
    pub scores: ContentScores,
    pub accepted: bool,

    /// Informational only; never part of the verdict
    pub spam_score: f64,
    pub matched_terms: Vec<String>,
    pub script: Script,
    pub content_category: Option<String>,

    /// Query that surfaced the item, filled in by the orchestrator
    pub query: Option<String>,
    pub strategy: Option<Strategy>,
}

impl ScoredItem {
    pub fn id(&self) -> &str {
        &self.candidate.id
    }

    #[must_use]
    pub fn with_source(mut self, query: &Query) -> Self {
        self.query = Some(query.text.clone());
        self.strategy = Some(query.strategy);
        self
    }
}

// ============================================================================
// Runs
// ============================================================================

/// Lifecycle of an extraction run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Stopped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How one query ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub query: String,
    pub strategy: Strategy,
    pub succeeded: bool,
    pub pages: u32,
    pub candidates: u64,
    pub accepted: u64,

    /// Paging stopped early because the run was asked to stop
    pub truncated: bool,

    /// Never started because the run stopped or failed first
    #[serde(default)]
    pub skipped: bool,
    pub error: Option<String>,
}

impl QueryOutcome {
    /// Empty outcome for a query that is about to be processed
    pub fn new(query: &Query) -> Self {
        Self {
            query: query.text.clone(),
            strategy: query.strategy,
            succeeded: false,
            pages: 0,
            candidates: 0,
            accepted: 0,
            truncated: false,
            skipped: false,
            error: None,
        }
    }

    pub fn skipped(query: &Query) -> Self {
        Self {
            skipped: true,
            ..Self::new(query)
        }
    }
}

/// Aggregate counters for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub accepted: u64,
    pub filtered_by_dedup: u64,
    pub filtered_by_score: u64,
    pub errored: u64,
    pub candidates_seen: u64,
    pub pages_fetched: u64,
    pub quota_units: u64,
    pub queries_succeeded: u64,
    pub queries_failed: u64,
    #[serde(default)]
    pub queries_skipped: u64,
}

impl RunCounters {
    /// Share of scored candidates that were accepted (0.0 - 1.0)
    pub fn acceptance_rate(&self) -> f64 {
        let scored = self.accepted + self.filtered_by_score;
        if scored == 0 {
            return 0.0;
        }
        self.accepted as f64 / scored as f64
    }

    /// Every candidate seen ends in exactly one of these buckets
    pub fn settled(&self) -> u64 {
        self.accepted + self.filtered_by_dedup + self.filtered_by_score + self.errored
    }
}

/// Point-in-time view of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: String,
    pub status: RunStatus,
    pub counters: RunCounters,
    pub outcomes: Vec<QueryOutcome>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl RunSnapshot {
    pub fn idle() -> Self {
        Self {
            run_id: String::new(),
            status: RunStatus::Idle,
            counters: RunCounters::default(),
            outcomes: Vec::new(),
            started_at: None,
            finished_at: None,
            failure_reason: None,
        }
    }

    pub fn outcome(&self, query: &str) -> Option<&QueryOutcome> {
        self.outcomes.iter().find(|o| o.query == query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_round_trip() {
        for strategy in Strategy::all() {
            assert_eq!(strategy.as_str().parse::<Strategy>().unwrap(), *strategy);
        }
        assert!("weather".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!RunStatus::Idle.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Stopped.is_terminal());
    }

    #[test]
    fn test_acceptance_rate() {
        let counters = RunCounters {
            accepted: 3,
            filtered_by_score: 1,
            ..Default::default()
        };
        assert!((counters.acceptance_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(RunCounters::default().acceptance_rate(), 0.0);
    }
}
