//! In-process provider driven by canned responses
//!
//! Backs `vidscout extract --replay` and the test suite: search pages are
//! keyed by query text, details by item id, and failures can be injected per
//! credential secret or per item. Every call is recorded so callers can
//! assert which credential served which request.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::SearchProvider;
use crate::models::{Candidate, Query, SearchPage};
use crate::utils::error::ProviderError;

/// Which provider method was called
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Search,
    Details,
}

/// One recorded provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub secret: String,
    /// Query text for searches, comma-joined ids for detail fetches
    pub target: String,
    pub page_token: Option<String>,
}

#[derive(Debug, Default)]
struct Script {
    pages: HashMap<String, Vec<Vec<String>>>,
    details: HashMap<String, Candidate>,
    queued_failures: HashMap<String, VecDeque<ProviderError>>,
    sticky_failures: HashMap<String, ProviderError>,
    detail_failures: HashMap<String, ProviderError>,
    calls: Vec<RecordedCall>,
}

/// Recorded responses for a replay run
///
/// ```json
/// {
///   "pages": { "Kandy Sri Lanka": [["v1", "v2"], ["v3"]] },
///   "candidates": [{ "id": "v1", "title": "...", "published_at": "2024-04-14T06:30:00Z" }]
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct ReplayFixture {
    #[serde(default)]
    pub pages: HashMap<String, Vec<Vec<String>>>,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// Provider that replays a script
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Mutex<Script>,
    latency: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Provider that replays `fixture`
    pub fn from_fixture(fixture: ReplayFixture) -> Self {
        let provider = Self::new();
        {
            let mut script = provider.script();
            script.pages = fixture.pages;
            script.details = fixture
                .candidates
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect();
        }
        provider
    }

    /// Load a [`ReplayFixture`] from a JSON file
    pub fn load_fixture(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file: {}", path.display()))?;
        let fixture: ReplayFixture = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse replay file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            queries = fixture.pages.len(),
            candidates = fixture.candidates.len(),
            "Loaded replay fixture"
        );
        Ok(Self::from_fixture(fixture))
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Result pages for `query`, in paging order
    pub fn add_pages<I, P, S>(&self, query: &str, pages: I)
    where
        I: IntoIterator<Item = P>,
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pages = pages
            .into_iter()
            .map(|p| p.into_iter().map(Into::into).collect())
            .collect();
        self.script().pages.insert(query.to_string(), pages);
    }

    pub fn add_candidate(&self, candidate: Candidate) {
        self.script()
            .details
            .insert(candidate.id.clone(), candidate);
    }

    /// Fail the next call made with `secret`
    pub fn fail_next(&self, secret: &str, error: ProviderError) {
        self.script()
            .queued_failures
            .entry(secret.to_string())
            .or_default()
            .push_back(error);
    }

    /// Fail every call made with `secret`
    pub fn fail_always(&self, secret: &str, error: ProviderError) {
        self.script()
            .sticky_failures
            .insert(secret.to_string(), error);
    }

    /// Fail every detail batch that contains `id`
    pub fn fail_details(&self, id: &str, error: ProviderError) {
        self.script()
            .detail_failures
            .insert(id.to_string(), error);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.script().calls.clone()
    }

    pub fn search_secrets(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.kind == CallKind::Search)
            .map(|c| c.secret)
            .collect()
    }

    fn record(&self, call: RecordedCall) -> Result<(), ProviderError> {
        let mut script = self.script();
        let secret = call.secret.clone();
        script.calls.push(call);

        if let Some(err) = script.sticky_failures.get(&secret) {
            return Err(err.clone());
        }
        if let Some(err) = script
            .queued_failures
            .get_mut(&secret)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        Ok(())
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn page_index(token: Option<&str>) -> usize {
    token
        .and_then(|t| t.strip_prefix("page-"))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl SearchProvider for ScriptedProvider {
    async fn search(
        &self,
        secret: &str,
        query: &Query,
        page_token: Option<&str>,
    ) -> Result<SearchPage, ProviderError> {
        self.pause().await;
        self.record(RecordedCall {
            kind: CallKind::Search,
            secret: secret.to_string(),
            target: query.text.clone(),
            page_token: page_token.map(str::to_string),
        })?;

        let idx = page_index(page_token);
        let script = self.script();
        let Some(pages) = script.pages.get(&query.text) else {
            return Ok(SearchPage::default());
        };

        Ok(SearchPage {
            ids: pages.get(idx).cloned().unwrap_or_default(),
            next_page_token: (idx + 1 < pages.len()).then(|| format!("page-{}", idx + 1)),
        })
    }

    async fn fetch_details(
        &self,
        secret: &str,
        ids: &[String],
    ) -> Result<Vec<Candidate>, ProviderError> {
        self.pause().await;
        self.record(RecordedCall {
            kind: CallKind::Details,
            secret: secret.to_string(),
            target: ids.join(","),
            page_token: None,
        })?;

        let script = self.script();
        if let Some(err) = ids.iter().find_map(|id| script.detail_failures.get(id)) {
            return Err(err.clone());
        }
        Ok(ids
            .iter()
            .filter_map(|id| script.details.get(id).cloned())
            .collect())
    }
}
