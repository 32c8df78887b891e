//! Integration tests for YouTubeProvider using wiremock
//!
//! These tests validate request shape, response parsing and error
//! classification against a mock Data API.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{fast_executor_config, test_key};
use vidscout::credentials::{CredentialPool, CredentialSpec, CredentialStatus, PoolSettings};
use vidscout::executor::RequestExecutor;
use vidscout::models::{Query, Strategy};
use vidscout::provider::{SearchProvider, YouTubeProvider};
use vidscout::utils::error::{ExecutorError, ProviderError};

fn provider(server: &MockServer) -> YouTubeProvider {
    YouTubeProvider::new(&server.uri(), 100, Duration::from_secs(5)).unwrap()
}

fn quota_error(reason: &str) -> serde_json::Value {
    json!({
        "error": {
            "code": 403,
            "message": "The request cannot be completed because you have exceeded your quota.",
            "errors": [{ "reason": reason, "domain": "youtube.quota" }]
        }
    })
}

fn search_body(ids: &[&str], next: Option<&str>) -> serde_json::Value {
    let items: Vec<_> = ids
        .iter()
        .map(|id| json!({ "kind": "youtube#searchResult", "id": { "kind": "youtube#video", "videoId": id } }))
        .collect();
    match next {
        Some(token) => json!({ "items": items, "nextPageToken": token }),
        None => json!({ "items": items }),
    }
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn test_search_sends_expected_parameters() {
    let server = MockServer::start().await;
    let key = test_key(1);

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "Galle Sri Lanka"))
        .and(query_param("type", "video"))
        .and(query_param("regionCode", "LK"))
        .and(query_param("key", key.as_str()))
        .and(query_param("pageToken", "CAUQAA"))
        .and(query_param("publishedAfter", "2024-05-01T00:00:00Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(&["a1", "a2"], Some("CAoQAA"))))
        .expect(1)
        .mount(&server)
        .await;

    let query = Query::new("Galle Sri Lanka", Strategy::Temporal)
        .published_after(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
    let page = provider(&server)
        .search(&key, &query, Some("CAUQAA"))
        .await
        .unwrap();

    assert_eq!(page.ids, vec!["a1", "a2"]);
    assert_eq!(page.next_page_token.as_deref(), Some("CAoQAA"));
}

#[tokio::test]
async fn test_search_skips_non_video_results() {
    let server = MockServer::start().await;
    let body = json!({
        "items": [
            { "id": { "kind": "youtube#channel", "channelId": "UC1" } },
            { "id": { "kind": "youtube#video", "videoId": "v1" } }
        ],
        "nextPageToken": ""
    });
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let page = provider(&server)
        .search(&test_key(1), &Query::new("Colombo", Strategy::Location), None)
        .await
        .unwrap();

    assert_eq!(page.ids, vec!["v1"]);
    assert!(page.next_page_token.is_none());
}

// ============================================================================
// Details
// ============================================================================

#[tokio::test]
async fn test_fetch_details_joins_channel_stats() {
    let server = MockServer::start().await;

    let videos = json!({
        "items": [{
            "id": "v1",
            "snippet": {
                "publishedAt": "2024-04-14T06:30:00Z",
                "channelId": "UC-lanka",
                "title": "Avurudu games in Kandy",
                "description": "Sinhala and Tamil New Year",
                "channelTitle": "Lanka Trails",
                "tags": ["culture", "festival"],
                "categoryId": "19",
                "defaultAudioLanguage": "si"
            },
            "statistics": { "viewCount": "12000", "likeCount": "800", "commentCount": "45" },
            "contentDetails": { "duration": "PT12M30S", "definition": "hd", "caption": "true" }
        }]
    });
    let channels = json!({
        "items": [{
            "id": "UC-lanka",
            "snippet": { "country": "LK" },
            "statistics": { "subscriberCount": "54000", "videoCount": "210", "viewCount": "3100000" }
        }]
    });

    Mock::given(method("GET"))
        .and(path("/videos"))
        .and(query_param("id", "v1,missing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(videos))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/channels"))
        .and(query_param("id", "UC-lanka"))
        .respond_with(ResponseTemplate::new(200).set_body_json(channels))
        .expect(1)
        .mount(&server)
        .await;

    let candidates = provider(&server)
        .fetch_details(&test_key(1), &["v1".to_string(), "missing".to_string()])
        .await
        .unwrap();

    assert_eq!(candidates.len(), 1);
    let c = &candidates[0];
    assert_eq!(c.id, "v1");
    assert_eq!(c.view_count, 12_000);
    assert_eq!(c.like_count, 800);
    assert_eq!(c.duration_secs, Some(750));
    assert!(c.has_captions);
    assert_eq!(c.default_language.as_deref(), Some("si"));

    let channel = c.channel.as_ref().unwrap();
    assert_eq!(channel.subscriber_count, 54_000);
    assert_eq!(channel.country.as_deref(), Some("LK"));
}

#[tokio::test]
async fn test_fetch_details_with_no_ids_makes_no_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let candidates = provider(&server).fetch_details(&test_key(1), &[]).await.unwrap();
    assert!(candidates.is_empty());
}

// ============================================================================
// Error classification
// ============================================================================

#[tokio::test]
async fn test_error_statuses_are_classified() {
    let server = MockServer::start().await;
    let cases = [
        ("k503", ResponseTemplate::new(503)),
        ("k429", ResponseTemplate::new(429)),
        ("kquota", ResponseTemplate::new(403).set_body_json(quota_error("quotaExceeded"))),
        ("kbad", ResponseTemplate::new(400).set_body_json(quota_error("keyInvalid"))),
        ("ktoken", ResponseTemplate::new(400).set_body_json(quota_error("invalidPageToken"))),
        ("kparam", ResponseTemplate::new(400).set_body_json(quota_error("invalidParameter"))),
    ];
    for (key, response) in cases {
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("key", key))
            .respond_with(response)
            .mount(&server)
            .await;
    }

    let yt = provider(&server);
    let query = Query::new("Jaffna", Strategy::Location);

    assert!(matches!(
        yt.search("k503", &query, None).await,
        Err(ProviderError::Transient(_))
    ));
    assert!(matches!(
        yt.search("k429", &query, None).await,
        Err(ProviderError::QuotaExceeded(_))
    ));
    assert!(matches!(
        yt.search("kquota", &query, None).await,
        Err(ProviderError::QuotaExceeded(_))
    ));
    assert!(matches!(
        yt.search("kbad", &query, None).await,
        Err(ProviderError::PermanentInvalid(_))
    ));
    assert!(matches!(
        yt.search("ktoken", &query, None).await,
        Err(ProviderError::BadRequest(_))
    ));
    assert!(matches!(
        yt.search("kparam", &query, None).await,
        Err(ProviderError::BadRequest(_))
    ));
}

#[tokio::test]
async fn test_malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let result = provider(&server)
        .search(&test_key(1), &Query::new("Ella", Strategy::Location), None)
        .await;
    assert!(matches!(result, Err(ProviderError::Decode(_))));
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(search_body(&[], None))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let yt = YouTubeProvider::new(&server.uri(), 100, Duration::from_millis(200)).unwrap();
    let result = yt
        .search(&test_key(1), &Query::new("Ella", Strategy::Location), None)
        .await;
    assert!(matches!(result, Err(ProviderError::Timeout(_))));
}

// ============================================================================
// Through the executor
// ============================================================================

fn pool(keys: &[String]) -> Arc<CredentialPool> {
    let specs = keys.iter().map(|k| CredentialSpec::new(k.clone(), 10_000)).collect();
    Arc::new(CredentialPool::new(specs, PoolSettings::default()))
}

#[tokio::test]
async fn test_executor_retries_server_errors_on_same_key() {
    let server = MockServer::start().await;
    let key = test_key(1);

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("key", key.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(&["v1"], None)))
        .expect(1)
        .mount(&server)
        .await;

    let pool = pool(&[key]);
    let executor = RequestExecutor::new(Arc::new(provider(&server)), Arc::clone(&pool), &fast_executor_config());

    let page = executor
        .search(&Query::new("Sigiriya", Strategy::Location), None)
        .await
        .unwrap();

    assert_eq!(page.value.ids, vec!["v1"]);
    assert_eq!(page.units, 100);
    assert_eq!(pool.health()[0].used, 100);
}

#[tokio::test]
async fn test_executor_rotates_on_quota_response() {
    let server = MockServer::start().await;
    let (k1, k2) = (test_key(1), test_key(2));

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("key", k1.as_str()))
        .respond_with(ResponseTemplate::new(403).set_body_json(quota_error("dailyLimitExceeded")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("key", k2.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body(&["v1"], None)))
        .expect(1)
        .mount(&server)
        .await;

    let pool = pool(&[k1, k2]);
    let executor = RequestExecutor::new(Arc::new(provider(&server)), Arc::clone(&pool), &fast_executor_config());

    let page = executor
        .search(&Query::new("Mirissa", Strategy::Location), None)
        .await
        .unwrap();
    assert_eq!(page.credential_id, "key-2");

    let health = pool.health();
    assert_eq!(health[0].status, CredentialStatus::Exhausted);
    assert_eq!(health[1].status, CredentialStatus::Active);
}

#[tokio::test]
async fn test_executor_does_not_retry_invalid_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(400).set_body_json(quota_error("keyInvalid")))
        .expect(1)
        .mount(&server)
        .await;

    let executor = RequestExecutor::new(
        Arc::new(provider(&server)),
        pool(&[test_key(1)]),
        &fast_executor_config(),
    );
    let err = executor
        .search(&Query::new("Matara", Strategy::Location), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::PermanentCredential { .. }));
}

#[tokio::test]
async fn test_bad_requests_do_not_disable_the_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(400).set_body_json(quota_error("invalidPageToken")))
        .expect(5)
        .mount(&server)
        .await;

    let pool = pool(&[test_key(1)]);
    let executor = RequestExecutor::new(Arc::new(provider(&server)), Arc::clone(&pool), &fast_executor_config());

    // Well past the default failure threshold
    for _ in 0..5 {
        let err = executor
            .search(&Query::new("Trincomalee", Strategy::Location), Some("stale-token"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidRequest { .. }));
    }

    let health = pool.health();
    assert_eq!(health[0].status, CredentialStatus::Active);
    assert_eq!(health[0].used, 0);
}
