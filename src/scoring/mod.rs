//! Deterministic content scoring
//!
//! Maps a [`Candidate`] to relevance and quality scores in [0, 1] and an
//! accept/reject verdict. There is no learned model: the same candidate and
//! profile always produce bit-identical output.
//!
//! ```text
//! relevance = 0.40·location + 0.40·cultural + 0.20·category
//! quality   = 0.35·engagement + 0.25·velocity + 0.20·completeness + 0.20·authority
//! accept    = relevance ≥ min_relevance  &&  quality ≥ min_quality
//! ```
//!
//! Each sub-score is a free function so it can be checked on its own.

pub mod indicators;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::Regex;
use thiserror::Error;

use crate::config::ScoringConfig;
use crate::models::{Candidate, ContentScores, ScoredItem, Script};
use indicators::{detect_script, matches_each, ScoringProfile, TokenText};

/// Publish times this far past the fetch time are treated as clock skew
const CLOCK_SKEW_TOLERANCE_SECS: i64 = 3600;

/// Views per day that saturate the velocity score
const VELOCITY_SATURATION: f64 = 10_000.0;

/// Errors for candidates that cannot be scored
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("Candidate has no id")]
    MissingId,

    #[error("Candidate {id} has no title")]
    MissingTitle { id: String },

    #[error("Candidate {id} published at {published_at} after it was fetched at {fetched_at}")]
    PublishedAfterFetch {
        id: String,
        published_at: DateTime<Utc>,
        fetched_at: DateTime<Utc>,
    },

    #[error("Invalid spam pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Acceptance thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub min_relevance: f64,
    pub min_quality: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_relevance: 0.3,
            min_quality: 0.2,
        }
    }
}

impl Thresholds {
    pub fn accepts(&self, relevance: f64, quality: f64) -> bool {
        relevance >= self.min_relevance && quality >= self.min_quality
    }
}

// ============================================================================
// Sub-scores
// ============================================================================

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Weighted relevance composite
pub fn relevance(location: f64, cultural: f64, category: f64) -> f64 {
    unit(0.40 * unit(location) + 0.40 * unit(cultural) + 0.20 * unit(category))
}

/// Weighted quality composite
pub fn quality(engagement: f64, velocity: f64, completeness: f64, authority: f64) -> f64 {
    unit(
        0.35 * unit(engagement)
            + 0.25 * unit(velocity)
            + 0.20 * unit(completeness)
            + 0.20 * unit(authority),
    )
}

/// 0.25 per distinct location term, plus 0.5 when the channel is in-region
pub fn location_score(location_hits: usize, channel_in_region: bool) -> f64 {
    let bonus = if channel_in_region { 0.5 } else { 0.0 };
    unit(0.25 * location_hits as f64 + bonus)
}

/// Cultural, language and institutional signals plus a regional-script bonus
pub fn cultural_score(
    cultural_hits: usize,
    language_hits: usize,
    institution_hits: usize,
    regional_script: bool,
) -> f64 {
    let script = if regional_script { 0.3 } else { 0.0 };
    unit(
        0.2 * cultural_hits as f64
            + 0.2 * language_hits as f64
            + 0.1 * institution_hits as f64
            + script,
    )
}

/// 0.5 per tag overlapping the category vocabulary, plus 0.5 for a preferred category id
pub fn category_score(tag_hits: usize, preferred_category: bool) -> f64 {
    let bonus = if preferred_category { 0.5 } else { 0.0 };
    unit(0.5 * tag_hits as f64 + bonus)
}

/// `(likes + 2·comments) / views`, scaled so a 10% rate saturates
pub fn engagement_rate(views: u64, likes: u64, comments: u64) -> f64 {
    if views == 0 {
        return 0.0;
    }
    let interactions = likes as f64 + 2.0 * comments as f64;
    unit(10.0 * interactions / views as f64)
}

/// Log-scaled views per day since publication; at least one day is assumed
pub fn view_velocity(views: u64, published_at: DateTime<Utc>, fetched_at: DateTime<Utc>) -> f64 {
    let age_days = (fetched_at - published_at).num_seconds() as f64 / 86_400.0;
    let days = age_days.max(1.0);
    let per_day = views as f64 / days;
    unit((1.0 + per_day).log10() / (1.0 + VELOCITY_SATURATION).log10())
}

/// Fraction of {title, description, tags, duration, category, language} present
pub fn completeness(candidate: &Candidate) -> f64 {
    let present = [
        !candidate.title.trim().is_empty(),
        !candidate.description.trim().is_empty(),
        !candidate.tags.is_empty(),
        candidate.duration_secs.is_some(),
        candidate.category_id.is_some(),
        candidate.default_language.is_some(),
    ]
    .iter()
    .filter(|p| **p)
    .count();
    present as f64 / 6.0
}

/// `log10(1 + subscribers) / 6`; a million subscribers saturates
pub fn authority(subscribers: u64) -> f64 {
    unit((1.0 + subscribers as f64).log10() / 6.0)
}

// ============================================================================
// Scorer
// ============================================================================

#[derive(Debug)]
struct CompiledProfile {
    profile: ScoringProfile,
    category_vocabulary: Vec<String>,
    institution_terms: Vec<String>,
    spam: Vec<Regex>,
}

/// Scores candidates against a keyword profile
#[derive(Debug, Clone)]
pub struct ContentScorer {
    profile: Arc<CompiledProfile>,
    thresholds: Thresholds,
    region_code: String,
    preferred_categories: Vec<String>,
}

impl ContentScorer {
    /// Build a scorer; fails if a spam pattern does not compile
    pub fn new(config: &ScoringConfig) -> Result<Self, ScoringError> {
        let profile = config.profile.clone();
        let spam = profile
            .spam_patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("(?i){p}")).map_err(|e| ScoringError::InvalidPattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let institution_terms = profile
            .institutions
            .iter()
            .chain(profile.media_outlets.iter())
            .chain(profile.public_figures.iter())
            .cloned()
            .collect();

        Ok(Self {
            profile: Arc::new(CompiledProfile {
                category_vocabulary: profile.category_vocabulary(),
                institution_terms,
                spam,
                profile,
            }),
            thresholds: Thresholds {
                min_relevance: config.min_relevance,
                min_quality: config.min_quality,
            },
            region_code: config.region_code.to_uppercase(),
            preferred_categories: config.preferred_category_ids.clone(),
        })
    }

    /// Same profile, different thresholds
    #[must_use]
    pub fn with_thresholds(&self, thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            ..self.clone()
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Score one candidate
    pub fn score(&self, candidate: &Candidate) -> Result<ScoredItem, ScoringError> {
        validate(candidate)?;

        let compiled = &*self.profile;
        let p = &compiled.profile;
        let raw_text = format!(
            "{} {} {} {}",
            candidate.title,
            candidate.description,
            candidate.channel_title,
            candidate.tags.join(" ")
        );
        let text = TokenText::new(&raw_text);

        let locations = text.matches(&p.locations);
        let cultural = text.matches(&p.cultural_terms);
        let languages = text.matches(&p.languages);
        let institutions = text.matches(&compiled.institution_terms);
        let tag_hits = matches_each(&candidate.tags, &compiled.category_vocabulary).len();

        let script = detect_script(&raw_text);
        let regional_script = matches!(script, Script::Sinhala | Script::Tamil | Script::Mixed);

        let in_region = candidate
            .channel
            .as_ref()
            .and_then(|c| c.country.as_deref())
            .is_some_and(|country| country.eq_ignore_ascii_case(&self.region_code));
        let preferred = candidate
            .category_id
            .as_ref()
            .is_some_and(|id| self.preferred_categories.contains(id));

        let location = location_score(locations.len(), in_region);
        let cultural_s = cultural_score(
            cultural.len(),
            languages.len(),
            institutions.len(),
            regional_script,
        );
        let category = category_score(tag_hits, preferred);

        let engagement = engagement_rate(
            candidate.view_count,
            candidate.like_count,
            candidate.comment_count,
        );
        let velocity = view_velocity(
            candidate.view_count,
            candidate.published_at,
            candidate.fetched_at,
        );
        let complete = completeness(candidate);
        let auth = authority(
            candidate
                .channel
                .as_ref()
                .map(|c| c.subscriber_count)
                .unwrap_or(0),
        );

        let scores = ContentScores {
            location,
            cultural: cultural_s,
            category,
            relevance: relevance(location, cultural_s, category),
            engagement_rate: engagement,
            view_velocity: velocity,
            completeness: complete,
            authority: auth,
            quality: quality(engagement, velocity, complete, auth),
        };

        let matched_terms = locations
            .into_iter()
            .chain(cultural)
            .chain(languages)
            .chain(institutions)
            .map(str::to_string)
            .collect();

        Ok(ScoredItem {
            accepted: self.thresholds.accepts(scores.relevance, scores.quality),
            spam_score: self.spam_score(&raw_text),
            content_category: Some(self.categorize(&text)),
            candidate: candidate.clone(),
            scores,
            matched_terms,
            script,
            query: None,
            strategy: None,
        })
    }

    /// Pattern hits plus shouting and punctuation heuristics, 0.2 each
    fn spam_score(&self, text: &str) -> f64 {
        let mut hits = self
            .profile
            .spam
            .iter()
            .filter(|re| re.is_match(text))
            .count();

        let len = text.chars().count();
        if len > 50 {
            let caps = text.chars().filter(|c| c.is_uppercase()).count();
            if caps as f64 / len as f64 > 0.3 {
                hits += 1;
            }
        }
        if len > 0 {
            let punct = text.chars().filter(|c| matches!(c, '!' | '?' | '.')).count();
            if punct as f64 / len as f64 > 0.1 {
                hits += 1;
            }
        }

        unit(0.2 * hits as f64)
    }

    fn categorize(&self, text: &TokenText) -> String {
        self.profile
            .profile
            .categories
            .iter()
            .find(|c| c.keywords.iter().any(|k| text.contains(k)))
            .map(|c| c.name.clone())
            .unwrap_or_else(|| String::from("general"))
    }
}

fn validate(candidate: &Candidate) -> Result<(), ScoringError> {
    if candidate.id.trim().is_empty() {
        return Err(ScoringError::MissingId);
    }
    if candidate.title.trim().is_empty() {
        return Err(ScoringError::MissingTitle {
            id: candidate.id.clone(),
        });
    }
    if (candidate.published_at - candidate.fetched_at).num_seconds() > CLOCK_SKEW_TOLERANCE_SECS {
        return Err(ScoringError::PublishedAfterFetch {
            id: candidate.id.clone(),
            published_at: candidate.published_at,
            fetched_at: candidate.fetched_at,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChannelStats;
    use chrono::TimeZone;

    fn scorer() -> ContentScorer {
        ContentScorer::new(&ScoringConfig::default()).unwrap()
    }

    fn fetched() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn kandy_video() -> Candidate {
        let mut c = Candidate::new("v1", "Kandy Esala Perahera 2024", fetched());
        c.published_at = fetched() - chrono::Duration::days(10);
        c.description = "Full procession from the Temple of Tooth, Sri Lanka".into();
        c.tags = vec!["perahera".into(), "festival".into(), "travel".into()];
        c.category_id = Some("19".into());
        c.default_language = Some("en".into());
        c.duration_secs = Some(1800);
        c.view_count = 50_000;
        c.like_count = 2_000;
        c.comment_count = 300;
        c.channel = Some(ChannelStats {
            subscriber_count: 120_000,
            country: Some("LK".into()),
            ..Default::default()
        });
        c
    }

    #[test]
    fn test_composite_boundaries() {
        assert!((relevance(1.0, 1.0, 1.0) - 1.0).abs() < 1e-12);
        let q = quality(0.5, 0.5, 1.0, 0.5);
        assert!((q - 0.60).abs() < 1e-12);
        assert!(Thresholds {
            min_relevance: 0.3,
            min_quality: 0.3
        }
        .accepts(1.0, q));
    }

    #[test]
    fn test_sub_scores() {
        assert_eq!(location_score(0, false), 0.0);
        assert_eq!(location_score(1, true), 0.75);
        assert_eq!(location_score(5, false), 1.0);
        assert!((cultural_score(1, 1, 1, false) - 0.5).abs() < 1e-12);
        assert_eq!(category_score(0, true), 0.5);
        assert_eq!(engagement_rate(0, 10, 10), 0.0);
        assert!((engagement_rate(1000, 5, 0) - 0.05).abs() < 1e-12);
        assert_eq!(engagement_rate(100, 50, 50), 1.0);
        assert_eq!(authority(0), 0.0);
        assert_eq!(authority(10_000_000), 1.0);
    }

    #[test]
    fn test_view_velocity_floors_age() {
        let now = fetched();
        let fresh = view_velocity(10_000, now - chrono::Duration::hours(2), now);
        assert_eq!(fresh, 1.0);
        let old = view_velocity(10_000, now - chrono::Duration::days(1000), now);
        assert!(old > 0.0 && old < 0.5);
        assert_eq!(view_velocity(0, now, now), 0.0);
    }

    #[test]
    fn test_completeness() {
        let bare = Candidate::new("x", "title only", fetched());
        assert!((completeness(&bare) - 1.0 / 6.0).abs() < 1e-12);
        assert_eq!(completeness(&kandy_video()), 1.0);
    }

    #[test]
    fn test_relevant_video_accepted() {
        let item = scorer().score(&kandy_video()).unwrap();
        assert!(item.accepted);
        assert_eq!(item.scores.location, 1.0);
        assert!(item.scores.relevance >= 0.7);
        assert!(item.matched_terms.contains(&"kandy".to_string()));
        assert!(item.matched_terms.contains(&"perahera".to_string()));
        assert_eq!(item.content_category.as_deref(), Some("travel"));
        assert_eq!(item.script, Script::Latin);
    }

    #[test]
    fn test_unrelated_video_rejected() {
        let mut c = Candidate::new("v2", "Unboxing a new laptop", fetched());
        c.published_at = fetched() - chrono::Duration::days(3);
        c.view_count = 900;
        c.like_count = 40;
        let item = scorer().score(&c).unwrap();
        assert!(!item.accepted);
        assert_eq!(item.scores.relevance, 0.0);
    }

    #[test]
    fn test_tag_terms_do_not_span_tags() {
        let mut split = Candidate::new("v3", "Weekend vlog", fetched());
        split.published_at = fetched() - chrono::Duration::days(3);
        split.tags = vec!["how".into(), "to".into()];
        assert_eq!(scorer().score(&split).unwrap().scores.category, 0.0);

        let mut whole = split.clone();
        whole.tags = vec!["how to".into()];
        assert!(scorer().score(&whole).unwrap().scores.category > 0.0);
    }

    #[test]
    fn test_score_is_deterministic() {
        let s = scorer();
        let a = s.score(&kandy_video()).unwrap();
        let b = s.score(&kandy_video()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.scores.quality.to_bits(), b.scores.quality.to_bits());
    }

    #[test]
    fn test_thresholds_change_verdict() {
        let strict = scorer().with_thresholds(Thresholds {
            min_relevance: 0.99,
            min_quality: 0.99,
        });
        assert!(!strict.score(&kandy_video()).unwrap().accepted);
    }

    #[test]
    fn test_invalid_candidates() {
        let s = scorer();
        let mut c = kandy_video();
        c.title = "  ".into();
        assert!(matches!(s.score(&c), Err(ScoringError::MissingTitle { .. })));

        let mut c = kandy_video();
        c.id.clear();
        assert_eq!(s.score(&c), Err(ScoringError::MissingId));

        let mut c = kandy_video();
        c.published_at = c.fetched_at + chrono::Duration::days(2);
        assert!(matches!(s.score(&c), Err(ScoringError::PublishedAfterFetch { .. })));
    }

    #[test]
    fn test_spam_score_is_informational() {
        let mut c = kandy_video();
        c.title = "SHOCKING secret revealed!!! Kandy".into();
        let item = scorer().score(&c).unwrap();
        assert!(item.spam_score >= 0.4);
        assert!(item.accepted);
    }

    #[test]
    fn test_regional_script_bonus() {
        let mut c = Candidate::new("v3", "අවුරුදු උත්සවය", fetched());
        c.published_at = fetched() - chrono::Duration::days(1);
        let item = scorer().score(&c).unwrap();
        assert_eq!(item.script, Script::Sinhala);
        assert!((item.scores.cultural - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_bad_spam_pattern_rejected() {
        let mut config = ScoringConfig::default();
        config.profile.spam_patterns = vec!["(unclosed".into()];
        assert!(matches!(
            ContentScorer::new(&config),
            Err(ScoringError::InvalidPattern { .. })
        ));
    }
}
