//! Configuration management for vidscout
//!
//! Settings come from a TOML file (`Config::from_file`) or from `VIDSCOUT_*`
//! environment variables (`Config::from_env`). Every section has defaults, so
//! a config file only needs the keys it wants to change. Call
//! [`Config::validate`] before handing the config to the engine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scoring::indicators::ScoringProfile;
use crate::utils::retry::RetryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run and worker-pool settings
    pub extraction: ExtractionConfig,

    /// Credential pool settings
    pub credentials: CredentialsConfig,

    /// Request executor settings
    pub executor: ExecutorConfig,

    /// Provider endpoint settings
    pub provider: ProviderConfig,

    /// Scoring thresholds and keyword profile
    pub scoring: ScoringConfig,

    /// Deduplication store settings
    pub dedup: DedupConfig,

    /// Accepted-record output
    pub sink: SinkConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Run and worker-pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Number of concurrent query workers
    pub workers: usize,

    /// Maximum pages fetched per query
    pub max_pages_per_query: u32,

    /// Results requested per search page (provider maximum is 50)
    pub max_results_per_page: u32,

    /// Ids per detail fetch (provider maximum is 50)
    pub details_batch_size: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_pages_per_query: 2,
            max_results_per_page: 50,
            details_batch_size: 50,
        }
    }
}

/// Credential pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Daily quota units per credential
    pub daily_quota: u64,

    /// Permanent failures within the window before a credential is disabled
    pub failure_threshold: u32,

    /// Sliding window for permanent failures, in seconds
    pub failure_window_secs: u64,

    /// UTC offset of the provider's daily quota reset, in hours
    pub reset_utc_offset_hours: i32,

    /// Keys listed directly in the config file
    pub keys: Vec<String>,

    /// Prefix of numbered environment variables holding keys
    pub env_prefix: String,

    /// Highest index probed for numbered environment keys
    pub max_env_keys: usize,

    /// Reject keys that do not look like provider API keys
    pub validate_key_format: bool,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            daily_quota: 10_000,
            failure_threshold: 3,
            failure_window_secs: 3600,
            reset_utc_offset_hours: -8,
            keys: Vec::new(),
            env_prefix: String::from("YOUTUBE_API_KEY"),
            max_env_keys: 50,
            validate_key_format: true,
        }
    }
}

/// Request executor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Deadline for a single attempt, in seconds
    pub attempt_timeout_secs: u64,

    /// Attempts per credential for transient failures
    pub max_attempts: u32,

    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,

    /// Jitter ratio applied to every backoff delay
    pub jitter: f64,

    /// Quota units charged for one search page
    pub search_cost: u64,

    /// Quota units charged for one detail batch
    pub details_cost: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: 30,
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: 0.3,
            search_cost: 100,
            details_cost: 2,
        }
    }
}

impl ExecutorConfig {
    #[must_use]
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            backoff_multiplier: self.backoff_multiplier,
            jitter: self.jitter,
        }
    }
}

/// Provider endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API base URL
    pub base_url: String,

    /// Client-side rate limit (requests per second)
    pub requests_per_second: u32,

    /// Region passed to searches
    pub region_code: String,

    /// Relevance language passed to searches
    pub relevance_language: String,

    /// User agent string
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("https://www.googleapis.com/youtube/v3"),
            requests_per_second: 5,
            region_code: String::from("LK"),
            relevance_language: String::from("en"),
            user_agent: format!("vidscout/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Scoring thresholds and keyword profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub min_relevance: f64,
    pub min_quality: f64,

    /// Channel country that earns the location bonus
    pub region_code: String,

    /// Provider category ids that earn the category bonus
    pub preferred_category_ids: Vec<String>,

    /// Keyword sets used by the sub-scores
    pub profile: ScoringProfile,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_relevance: 0.3,
            min_quality: 0.2,
            region_code: String::from("LK"),
            preferred_category_ids: ["10", "17", "19", "22", "24", "25", "27"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            profile: ScoringProfile::default(),
        }
    }
}

/// Deduplication store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,

    /// Records older than this are purged
    pub retention_hours: u64,

    /// Purge expired records when a run starts
    pub purge_on_start: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/dedup.db"),
            retention_hours: 24,
            purge_on_start: true,
        }
    }
}

impl DedupConfig {
    #[must_use]
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }
}

/// Accepted-record output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// JSON-lines file accepted items are appended to
    pub output_path: PathBuf,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("data/accepted.jsonl"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset or unparsable variables fall back to defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        let e = &mut config.extraction;
        e.workers = env_parse("VIDSCOUT_WORKERS").unwrap_or(e.workers);
        e.max_pages_per_query =
            env_parse("VIDSCOUT_MAX_PAGES").unwrap_or(e.max_pages_per_query);
        e.max_results_per_page =
            env_parse("VIDSCOUT_MAX_RESULTS").unwrap_or(e.max_results_per_page);

        let c = &mut config.credentials;
        c.daily_quota = env_parse("VIDSCOUT_DAILY_QUOTA").unwrap_or(c.daily_quota);
        c.failure_threshold =
            env_parse("VIDSCOUT_FAILURE_THRESHOLD").unwrap_or(c.failure_threshold);
        if let Ok(prefix) = std::env::var("VIDSCOUT_KEY_PREFIX") {
            c.env_prefix = prefix;
        }

        let x = &mut config.executor;
        x.attempt_timeout_secs =
            env_parse("VIDSCOUT_REQUEST_TIMEOUT").unwrap_or(x.attempt_timeout_secs);
        x.max_attempts = env_parse("VIDSCOUT_MAX_ATTEMPTS").unwrap_or(x.max_attempts);

        if let Ok(url) = std::env::var("VIDSCOUT_API_BASE_URL") {
            config.provider.base_url = url;
        }
        config.provider.requests_per_second =
            env_parse("VIDSCOUT_RATE_LIMIT").unwrap_or(config.provider.requests_per_second);

        let s = &mut config.scoring;
        s.min_relevance = env_parse("VIDSCOUT_MIN_RELEVANCE").unwrap_or(s.min_relevance);
        s.min_quality = env_parse("VIDSCOUT_MIN_QUALITY").unwrap_or(s.min_quality);

        if let Ok(path) = std::env::var("VIDSCOUT_DEDUP_PATH") {
            config.dedup.sqlite_path = path.into();
        }
        config.dedup.retention_hours =
            env_parse("VIDSCOUT_DEDUP_RETENTION_HOURS").unwrap_or(config.dedup.retention_hours);

        if let Ok(path) = std::env::var("VIDSCOUT_OUTPUT") {
            config.sink.output_path = path.into();
        }

        if let Ok(level) = std::env::var("VIDSCOUT_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("VIDSCOUT_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.extraction.workers == 0 {
            anyhow::bail!("extraction.workers must be greater than 0");
        }

        if self.extraction.max_pages_per_query == 0 {
            anyhow::bail!("extraction.max_pages_per_query must be greater than 0");
        }

        if !(1..=50).contains(&self.extraction.max_results_per_page) {
            anyhow::bail!("extraction.max_results_per_page must be between 1 and 50");
        }

        if !(1..=50).contains(&self.extraction.details_batch_size) {
            anyhow::bail!("extraction.details_batch_size must be between 1 and 50");
        }

        if self.credentials.daily_quota == 0 {
            anyhow::bail!("credentials.daily_quota must be greater than 0");
        }

        if self.credentials.failure_threshold == 0 {
            anyhow::bail!("credentials.failure_threshold must be greater than 0");
        }

        if !(-12..=14).contains(&self.credentials.reset_utc_offset_hours) {
            anyhow::bail!("credentials.reset_utc_offset_hours must be between -12 and 14");
        }

        if self.executor.max_attempts == 0 {
            anyhow::bail!("executor.max_attempts must be at least 1");
        }

        if self.executor.attempt_timeout_secs == 0 {
            anyhow::bail!("executor.attempt_timeout_secs must be greater than 0");
        }

        if !(0.0..1.0).contains(&self.executor.jitter) {
            anyhow::bail!("executor.jitter must be in [0, 1)");
        }

        if self.executor.search_cost > self.credentials.daily_quota {
            anyhow::bail!("executor.search_cost exceeds credentials.daily_quota");
        }

        if self.provider.requests_per_second == 0 {
            anyhow::bail!("provider.requests_per_second must be greater than 0");
        }

        url::Url::parse(&self.provider.base_url)
            .with_context(|| format!("provider.base_url is not a URL: {}", self.provider.base_url))?;

        for (name, value) in [
            ("scoring.min_relevance", self.scoring.min_relevance),
            ("scoring.min_quality", self.scoring.min_quality),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{name} must be within [0, 1], got {value}");
            }
        }

        Ok(())
    }

    /// Get per-attempt request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.executor.attempt_timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_workers() {
        let mut config = Config::default();
        config.extraction.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_out_of_range() {
        let mut config = Config::default();
        config.scoring.min_quality = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_base_url() {
        let mut config = Config::default();
        config.provider.base_url = String::from("not a url");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [extraction]
            workers = 8

            [scoring]
            min_relevance = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.extraction.workers, 8);
        assert_eq!(config.extraction.details_batch_size, 50);
        assert_eq!(config.scoring.min_relevance, 0.5);
        assert_eq!(config.scoring.min_quality, 0.2);
        assert_eq!(config.credentials.daily_quota, 10_000);
        assert!(!config.scoring.profile.locations.is_empty());
    }

    #[test]
    fn test_duration_helpers() {
        let config = Config::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.dedup.retention(), Duration::from_secs(24 * 3600));
    }
}
