//! Built-in query set
//!
//! Ordered roughly by priority: broad location searches first, then culture,
//! media, travel, and finally the "current" searches restricted to recent
//! uploads.

use chrono::{DateTime, Duration, Utc};

use crate::models::{Query, Strategy};

/// How far back temporal queries look
pub const TEMPORAL_WINDOW_DAYS: i64 = 7;

const LOCATION: &[&str] = &[
    "Sri Lanka",
    "Colombo",
    "Kandy Sri Lanka",
    "Galle Sri Lanka",
    "Jaffna Sri Lanka",
    "Sigiriya",
];

const CULTURAL: &[&str] = &[
    "Sinhala",
    "Tamil Sri Lanka",
    "Vesak Sri Lanka",
    "Avurudu Sri Lanka",
    "Sri Lankan food",
    "Ceylon",
];

const CATEGORY: &[&str] = &[
    "Sri Lankan music",
    "Sri Lankan movies",
    "Sri Lankan news",
    "Sri Lankan cricket",
    "Sri Lanka tourism",
    "Visit Sri Lanka",
    "Sri Lanka beaches",
];

const TEMPORAL: &[&str] = &["Sri Lanka today", "Sri Lanka update"];

/// The default query set, with temporal queries anchored at `now`
pub fn default_strategies(now: DateTime<Utc>) -> Vec<Query> {
    let since = now - Duration::days(TEMPORAL_WINDOW_DAYS);

    let plain = |texts: &[&str], strategy: Strategy| -> Vec<Query> {
        texts
            .iter()
            .map(|t| Query::new(*t, strategy).order("relevance"))
            .collect()
    };

    let mut queries = plain(LOCATION, Strategy::Location);
    queries.extend(plain(CULTURAL, Strategy::Cultural));
    queries.extend(plain(CATEGORY, Strategy::Category));
    queries.extend(
        TEMPORAL
            .iter()
            .map(|t| Query::new(*t, Strategy::Temporal).order("date").published_after(since)),
    );
    queries
}

/// Ad-hoc queries given on the command line
pub fn targeted(texts: &[String], strategy: Strategy) -> Vec<Query> {
    texts
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| Query::new(t, strategy).order("relevance"))
        .collect()
}
