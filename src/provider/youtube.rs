//! YouTube Data API v3 provider
//!
//! Implements [`SearchProvider`] with reqwest, behind a governor rate
//! limiter. Search pages come from `search.list`; details come from
//! `videos.list` followed by one `channels.list` for the distinct channels.
//!
//! # Error classification
//!
//! | Response                                         | Classified as      |
//! |--------------------------------------------------|--------------------|
//! | timeout, connection error, 5xx, undecodable body | `Transient`        |
//! | 429, or 403 with a quota/rate-limit reason       | `QuotaExceeded`    |
//! | any other 4xx                                    | `PermanentInvalid` |

use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer};

use super::SearchProvider;
use crate::config::Config;
use crate::models::{Candidate, ChannelStats, Query, SearchPage};
use crate::utils::error::ProviderError;
use crate::utils::{normalize_whitespace, parse_iso8601_duration};

/// Provider-side ceiling for ids per list call and results per page
const MAX_IDS_PER_CALL: usize = 50;

/// Error reasons that mean "this key is spent", not "this key is bad"
const QUOTA_REASONS: &[&str] = &[
    "quotaExceeded",
    "dailyLimitExceeded",
    "rateLimitExceeded",
    "userRateLimitExceeded",
];

/// Error reasons that blame the key rather than the request
const KEY_REASONS: &[&str] = &[
    "keyInvalid",
    "keyExpired",
    "forbidden",
    "accessNotConfigured",
    "ipRefererBlocked",
];

/// YouTube Data API client
pub struct YouTubeProvider {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    base_url: String,
    region_code: String,
    relevance_language: String,
    max_results: u32,
    timeout: Duration,
}

impl YouTubeProvider {
    /// Create a provider against `base_url`
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Transient` if the HTTP client cannot be built
    pub fn new(
        base_url: &str,
        requests_per_second: u32,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let user_agent = format!("vidscout/{}", env!("CARGO_PKG_VERSION"));
        Self::build(base_url, requests_per_second, timeout, &user_agent)
    }

    fn build(
        base_url: &str,
        requests_per_second: u32,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .user_agent(user_agent)
            .build()?;

        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            rate_limiter,
            base_url: base_url.trim_end_matches('/').to_string(),
            region_code: String::from("LK"),
            relevance_language: String::from("en"),
            max_results: MAX_IDS_PER_CALL as u32,
            timeout,
        })
    }

    /// Create a provider from the full application config
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let mut provider = Self::build(
            &config.provider.base_url,
            config.provider.requests_per_second,
            config.request_timeout(),
            &config.provider.user_agent,
        )?;
        provider.region_code = config.provider.region_code.clone();
        provider.relevance_language = config.provider.relevance_language.clone();
        provider.max_results = config.extraction.max_results_per_page;
        Ok(provider)
    }

    #[must_use]
    pub fn with_region(mut self, region_code: impl Into<String>) -> Self {
        self.region_code = region_code.into();
        self
    }

    #[must_use]
    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results.clamp(1, MAX_IDS_PER_CALL as u32);
        self
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/{endpoint}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout)
                } else {
                    ProviderError::Transient(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ProviderError::Decode(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let err = classify_error(status, &body);
        tracing::debug!(endpoint, status = status.as_u16(), error = %err, "Provider call failed");
        Err(err)
    }

    async fn fetch_channels(
        &self,
        secret: &str,
        channel_ids: &[String],
    ) -> Result<HashMap<String, ChannelStats>, ProviderError> {
        let mut out = HashMap::with_capacity(channel_ids.len());

        for chunk in channel_ids.chunks(MAX_IDS_PER_CALL) {
            let params = [
                ("part", String::from("snippet,statistics")),
                ("id", chunk.join(",")),
                ("key", secret.to_string()),
            ];
            let resp: ListResponse<ChannelItem> = self.get_json("channels", &params).await?;

            for item in resp.items {
                let stats = item.statistics.unwrap_or_default();
                out.insert(
                    item.id,
                    ChannelStats {
                        subscriber_count: stats.subscriber_count,
                        video_count: stats.video_count,
                        view_count: stats.view_count,
                        country: item.snippet.and_then(|s| s.country),
                    },
                );
            }
        }

        Ok(out)
    }
}

#[async_trait]
impl SearchProvider for YouTubeProvider {
    async fn search(
        &self,
        secret: &str,
        query: &Query,
        page_token: Option<&str>,
    ) -> Result<SearchPage, ProviderError> {
        let mut params = vec![
            ("part", String::from("id")),
            ("q", query.text.clone()),
            ("type", String::from("video")),
            ("maxResults", self.max_results.to_string()),
            ("order", query.order.clone().unwrap_or_else(|| "relevance".into())),
            ("regionCode", self.region_code.clone()),
            ("relevanceLanguage", self.relevance_language.clone()),
            ("key", secret.to_string()),
        ];
        if let Some(after) = query.published_after {
            params.push(("publishedAfter", after.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)));
        }
        if let Some(before) = query.published_before {
            params.push(("publishedBefore", before.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let resp: SearchResponse = self.get_json("search", &params).await?;
        let ids = resp
            .items
            .into_iter()
            .filter_map(|item| item.id.video_id)
            .collect::<Vec<_>>();

        tracing::debug!(query = %query.text, results = ids.len(), "Search page fetched");
        Ok(SearchPage {
            ids,
            next_page_token: resp.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn fetch_details(
        &self,
        secret: &str,
        ids: &[String],
    ) -> Result<Vec<Candidate>, ProviderError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut videos = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IDS_PER_CALL) {
            let params = [
                ("part", String::from("snippet,statistics,contentDetails")),
                ("id", chunk.join(",")),
                ("key", secret.to_string()),
            ];
            let resp: ListResponse<VideoItem> = self.get_json("videos", &params).await?;
            videos.extend(resp.items);
        }

        let mut seen = HashSet::new();
        let channel_ids: Vec<String> = videos
            .iter()
            .filter_map(|v| v.snippet.as_ref().map(|s| s.channel_id.clone()))
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect();

        let channels = if channel_ids.is_empty() {
            HashMap::new()
        } else {
            self.fetch_channels(secret, &channel_ids).await?
        };

        let fetched_at = Utc::now();
        Ok(videos
            .into_iter()
            .filter_map(|v| v.into_candidate(&channels, fetched_at))
            .collect())
    }
}

/// Map a non-success response onto the failure taxonomy
pub fn classify_error(status: StatusCode, body: &str) -> ProviderError {
    let parsed: Option<ErrorEnvelope> = serde_json::from_str(body).ok();
    let (message, reasons) = match parsed {
        Some(env) => (
            env.error.message,
            env.error.errors.into_iter().map(|e| e.reason).collect(),
        ),
        None => (status.to_string(), Vec::<String>::new()),
    };
    let detail = match reasons.first() {
        Some(reason) => format!("{} ({reason})", status.as_u16()),
        None => format!("{}: {message}", status.as_u16()),
    };

    if status.is_server_error() {
        return ProviderError::Transient(detail);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ProviderError::QuotaExceeded(detail);
    }
    if status == StatusCode::FORBIDDEN
        && (reasons.iter().any(|r| QUOTA_REASONS.contains(&r.as_str()))
            || message.to_lowercase().contains("quota"))
    {
        return ProviderError::QuotaExceeded(detail);
    }

    let blames_key = reasons.iter().any(|r| KEY_REASONS.contains(&r.as_str()))
        || message.to_lowercase().contains("api key");
    match status {
        StatusCode::UNAUTHORIZED => ProviderError::PermanentInvalid(detail),
        StatusCode::FORBIDDEN if blames_key || reasons.is_empty() => {
            ProviderError::PermanentInvalid(detail)
        }
        StatusCode::BAD_REQUEST if blames_key => ProviderError::PermanentInvalid(detail),
        s if s.is_client_error() => ProviderError::BadRequest(detail),
        _ => ProviderError::Transient(detail),
    }
}

// ============================================================================
// Wire types
// ============================================================================

fn de_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Num(u64),
        Str(String),
    }

    Ok(match Option::<Count>::deserialize(deserializer)? {
        Some(Count::Num(n)) => n,
        Some(Count::Str(s)) => s.parse().unwrap_or(0),
        None => 0,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    #[serde(default)]
    snippet: Option<VideoSnippet>,
    #[serde(default)]
    statistics: Option<VideoStatistics>,
    #[serde(default)]
    content_details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    published_at: DateTime<Utc>,
    #[serde(default)]
    channel_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    channel_title: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    category_id: Option<String>,
    #[serde(default)]
    default_language: Option<String>,
    #[serde(default)]
    default_audio_language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    #[serde(default, deserialize_with = "de_count")]
    view_count: u64,
    #[serde(default, deserialize_with = "de_count")]
    like_count: u64,
    #[serde(default, deserialize_with = "de_count")]
    comment_count: u64,
}

#[derive(Debug, Default, Deserialize)]
struct ContentDetails {
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    definition: Option<String>,
    #[serde(default)]
    caption: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelItem {
    id: String,
    #[serde(default)]
    snippet: Option<ChannelSnippet>,
    #[serde(default)]
    statistics: Option<ChannelStatistics>,
}

#[derive(Debug, Deserialize)]
struct ChannelSnippet {
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelStatistics {
    #[serde(default, deserialize_with = "de_count")]
    subscriber_count: u64,
    #[serde(default, deserialize_with = "de_count")]
    video_count: u64,
    #[serde(default, deserialize_with = "de_count")]
    view_count: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: String,
}

impl VideoItem {
    /// Items without a snippet carry nothing scorable and are dropped
    fn into_candidate(
        self,
        channels: &HashMap<String, ChannelStats>,
        fetched_at: DateTime<Utc>,
    ) -> Option<Candidate> {
        let snippet = self.snippet?;
        let stats = self.statistics.unwrap_or_default();
        let details = self.content_details.unwrap_or_default();

        Some(Candidate {
            channel: channels.get(&snippet.channel_id).cloned(),
            id: self.id,
            title: normalize_whitespace(&snippet.title),
            description: snippet.description,
            tags: snippet.tags,
            category_id: snippet.category_id,
            default_language: snippet.default_language.or(snippet.default_audio_language),
            channel_id: snippet.channel_id,
            channel_title: snippet.channel_title,
            view_count: stats.view_count,
            like_count: stats.like_count,
            comment_count: stats.comment_count,
            duration_secs: details.duration.as_deref().and_then(parse_iso8601_duration),
            definition: details.definition,
            has_captions: details.caption.as_deref() == Some("true"),
            published_at: snippet.published_at,
            fetched_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::FailureKind;

    fn quota_body(reason: &str) -> String {
        format!(
            r#"{{"error":{{"code":403,"message":"The request cannot be completed.","errors":[{{"reason":"{reason}","domain":"youtube.quota"}}]}}}}"#
        )
    }

    #[test]
    fn test_classify_quota_reasons() {
        for reason in QUOTA_REASONS {
            let err = classify_error(StatusCode::FORBIDDEN, &quota_body(reason));
            assert!(matches!(err, ProviderError::QuotaExceeded(_)), "{reason}");
        }
    }

    #[test]
    fn test_classify_forbidden_without_quota_reason() {
        let err = classify_error(StatusCode::FORBIDDEN, &quota_body("forbidden"));
        assert!(matches!(err, ProviderError::PermanentInvalid(_)));
    }

    #[test]
    fn test_classify_status_families() {
        assert!(matches!(
            classify_error(StatusCode::SERVICE_UNAVAILABLE, ""),
            ProviderError::Transient(_)
        ));
        assert!(matches!(
            classify_error(StatusCode::TOO_MANY_REQUESTS, ""),
            ProviderError::QuotaExceeded(_)
        ));
        assert!(matches!(
            classify_error(StatusCode::BAD_REQUEST, &quota_body("keyInvalid")),
            ProviderError::PermanentInvalid(_)
        ));
    }

    #[test]
    fn test_classify_request_errors_spare_the_key() {
        for reason in ["invalidPageToken", "badRequest", "invalidParameter"] {
            let err = classify_error(StatusCode::BAD_REQUEST, &quota_body(reason));
            assert!(matches!(err, ProviderError::BadRequest(_)), "{reason}");
            assert_eq!(err.kind(), FailureKind::InvalidRequest);
        }
        assert!(matches!(
            classify_error(StatusCode::NOT_FOUND, ""),
            ProviderError::BadRequest(_)
        ));
        assert!(matches!(
            classify_error(StatusCode::UNAUTHORIZED, ""),
            ProviderError::PermanentInvalid(_)
        ));

        // Google reports a bad key as 400 badRequest with a key message
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","errors":[{"reason":"badRequest"}]}}"#;
        assert!(matches!(
            classify_error(StatusCode::BAD_REQUEST, body),
            ProviderError::PermanentInvalid(_)
        ));
    }

    #[test]
    fn test_video_item_conversion() {
        let json = r#"{
            "id": "abc123",
            "snippet": {
                "publishedAt": "2024-01-10T08:00:00Z",
                "channelId": "UC1",
                "title": "Kandy Esala Perahera",
                "description": "Festival night",
                "channelTitle": "Lanka Vlogs",
                "tags": ["kandy", "perahera"],
                "categoryId": "19",
                "defaultAudioLanguage": "si"
            },
            "statistics": {"viewCount": "1500", "likeCount": "90", "commentCount": "12"},
            "contentDetails": {"duration": "PT12M5S", "definition": "hd", "caption": "false"}
        }"#;
        let item: VideoItem = serde_json::from_str(json).unwrap();

        let mut channels = HashMap::new();
        channels.insert(
            "UC1".to_string(),
            ChannelStats {
                subscriber_count: 12_000,
                country: Some("LK".into()),
                ..Default::default()
            },
        );

        let c = item.into_candidate(&channels, Utc::now()).unwrap();
        assert_eq!(c.id, "abc123");
        assert_eq!(c.view_count, 1500);
        assert_eq!(c.comment_count, 12);
        assert_eq!(c.duration_secs, Some(725));
        assert_eq!(c.default_language.as_deref(), Some("si"));
        assert!(!c.has_captions);
        assert_eq!(c.channel.unwrap().subscriber_count, 12_000);
    }
}
