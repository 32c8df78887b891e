//! Tests for configuration loading and credential sources
//!
//! Environment-driven tests are serialized because they mutate process-wide
//! variables.

mod common;

use std::io::Write;
use std::path::Path;

use serial_test::serial;
use tokio_test::{assert_err, assert_ok};

use common::test_key;
use vidscout::config::Config;
use vidscout::credentials::{ChainedCredentialSource, CredentialSource, EnvCredentialSource};

const TEST_PREFIX: &str = "VIDSCOUT_TEST_KEY";

fn clear_test_keys() {
    for i in 1..=10 {
        std::env::remove_var(format!("{TEST_PREFIX}_{i}"));
    }
}

// ============================================================================
// Config file
// ============================================================================

#[test]
fn test_shipped_config_parses_and_validates() {
    let config = assert_ok!(Config::from_file(Path::new("config.toml")));
    assert_ok!(config.validate());

    assert_eq!(config.extraction.workers, 4);
    assert_eq!(config.credentials.daily_quota, 10_000);
    assert_eq!(config.executor.search_cost, 100);
    assert_eq!(config.scoring.region_code, "LK");
}

#[test]
fn test_partial_file_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[extraction]
workers = 8

[scoring]
min_quality = 0.5

[scoring.profile]
locations = ["ella"]
"#
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.extraction.workers, 8);
    assert_eq!(config.extraction.max_pages_per_query, 2);
    assert_eq!(config.scoring.min_quality, 0.5);
    assert_eq!(config.scoring.profile.locations, vec!["ella"]);
    // Lists not mentioned keep the built-in profile
    assert!(!config.scoring.profile.cultural_terms.is_empty());
}

#[test]
fn test_invalid_values_are_rejected() {
    let mut config = Config::default();
    config.scoring.min_relevance = 1.2;
    assert_err!(config.validate());

    let mut config = Config::default();
    config.provider.base_url = "not a url".into();
    assert_err!(config.validate());

    let mut config = Config::default();
    config.executor.search_cost = 20_000;
    assert_err!(config.validate());
}

#[test]
fn test_missing_file_is_an_error() {
    let err = Config::from_file(Path::new("does/not/exist.toml")).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to read config file"));
}

// ============================================================================
// Environment
// ============================================================================

#[test]
#[serial]
fn test_from_env_overrides() {
    std::env::set_var("VIDSCOUT_WORKERS", "6");
    std::env::set_var("VIDSCOUT_MIN_RELEVANCE", "0.45");
    std::env::set_var("VIDSCOUT_MAX_PAGES", "not-a-number");

    let config = Config::from_env().unwrap();

    std::env::remove_var("VIDSCOUT_WORKERS");
    std::env::remove_var("VIDSCOUT_MIN_RELEVANCE");
    std::env::remove_var("VIDSCOUT_MAX_PAGES");

    assert_eq!(config.extraction.workers, 6);
    assert_eq!(config.scoring.min_relevance, 0.45);
    // Unparsable values fall back to the default
    assert_eq!(config.extraction.max_pages_per_query, 2);
}

#[test]
#[serial]
fn test_env_keys_skip_placeholders_and_gaps() {
    clear_test_keys();
    std::env::set_var(format!("{TEST_PREFIX}_1"), test_key(1));
    std::env::set_var(format!("{TEST_PREFIX}_2"), "your_api_key_here");
    std::env::set_var(format!("{TEST_PREFIX}_4"), test_key(4));

    let specs = EnvCredentialSource::new(TEST_PREFIX, 5_000).load().unwrap();
    clear_test_keys();

    let secrets: Vec<_> = specs.iter().map(|s| s.secret.clone()).collect();
    assert_eq!(secrets, vec![test_key(1), test_key(4)]);
    assert!(specs.iter().all(|s| s.daily_quota == 5_000));
}

#[test]
#[serial]
fn test_chained_source_dedups_file_and_env_keys() {
    clear_test_keys();
    std::env::set_var(format!("{TEST_PREFIX}_1"), test_key(1));
    std::env::set_var(format!("{TEST_PREFIX}_2"), test_key(2));

    let mut config = Config::default();
    config.credentials.env_prefix = TEST_PREFIX.into();
    config.credentials.keys = vec![test_key(2), test_key(3)];

    let specs = ChainedCredentialSource::from_config(&config.credentials)
        .load()
        .unwrap();
    clear_test_keys();

    let secrets: Vec<_> = specs.into_iter().map(|s| s.secret).collect();
    assert_eq!(secrets, vec![test_key(2), test_key(3), test_key(1)]);
}
