//! Common utilities and helper functions

pub mod error;
pub mod retry;

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

    let re = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    re.replace_all(text.trim(), " ").to_string()
}

/// Short, non-reversible fingerprint of a secret for logs and health output
///
/// First 16 hex characters of the SHA-256 digest.
pub fn secret_fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    digest
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Parse an ISO-8601 duration such as `PT1H2M10S` into seconds
///
/// Only the day and time designators the video API emits are supported.
/// Returns `None` for anything else.
pub fn parse_iso8601_duration(value: &str) -> Option<u64> {
    static DURATION_RE: OnceLock<Regex> = OnceLock::new();

    let re = DURATION_RE.get_or_init(|| {
        Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$")
            .expect("Invalid regex pattern")
    });

    if value == "P" || value == "PT" {
        return None;
    }

    let caps = re.captures(value.trim())?;
    let part = |idx: usize, scale: u64| -> Option<u64> {
        match caps.get(idx) {
            Some(m) => m.as_str().parse::<u64>().ok().map(|n| n * scale),
            None => Some(0),
        }
    };

    Some(part(1, 86_400)? + part(2, 3_600)? + part(3, 60)? + part(4, 1)?)
}

/// Truncate text to a maximum number of characters
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  hello   world  "), "hello world");
        assert_eq!(normalize_whitespace("hello\n\nworld"), "hello world");
    }

    #[test]
    fn test_secret_fingerprint() {
        let fp = secret_fingerprint("AIzaSyExample");
        assert_eq!(fp.len(), 16);
        assert_eq!(fp, secret_fingerprint("AIzaSyExample"));
        assert_ne!(fp, secret_fingerprint("AIzaSyOther"));
    }

    #[test]
    fn test_parse_iso8601_duration() {
        assert_eq!(parse_iso8601_duration("PT1H2M10S"), Some(3730));
        assert_eq!(parse_iso8601_duration("PT45S"), Some(45));
        assert_eq!(parse_iso8601_duration("PT15M"), Some(900));
        assert_eq!(parse_iso8601_duration("P1DT1S"), Some(86_401));
        assert_eq!(parse_iso8601_duration("P0D"), Some(0));
        assert_eq!(parse_iso8601_duration("garbage"), None);
        assert_eq!(parse_iso8601_duration("PT"), None);
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("very long text here", 10), "very lo...");
        assert_eq!(truncate_text("ශ්‍රී ලංකාව", 4), "ශ...");
    }
}
