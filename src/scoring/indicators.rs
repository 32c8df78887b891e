//! Keyword profile used by the content scorer
//!
//! A [`ScoringProfile`] lists the terms each sub-score looks for. The default
//! profile targets Sri Lankan content; any of its lists can be replaced from
//! the `[scoring.profile]` section of the config file.
//!
//! Matching is done on whole tokens: text is lowercased, split on anything
//! that is not a letter, mark or digit, and terms must match a run of
//! complete tokens. `"ella"` therefore matches "Ella rock" but not "umbrella".

use serde::{Deserialize, Serialize};

use crate::models::Script;

/// A named content category and the words that signal it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentCategory {
    pub name: String,
    pub keywords: Vec<String>,
}

/// Keyword sets consumed by the sub-scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringProfile {
    pub locations: Vec<String>,
    pub languages: Vec<String>,
    pub cultural_terms: Vec<String>,
    pub institutions: Vec<String>,
    pub media_outlets: Vec<String>,
    pub public_figures: Vec<String>,

    /// Checked in order; the first category with a hit wins
    pub categories: Vec<ContentCategory>,

    /// Case-insensitive regexes; each hit adds to the informational spam score
    pub spam_patterns: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn category(name: &str, keywords: &[&str]) -> ContentCategory {
    ContentCategory {
        name: name.to_string(),
        keywords: words(keywords),
    }
}

impl Default for ScoringProfile {
    fn default() -> Self {
        Self {
            locations: words(&[
                "sri lanka", "colombo", "kandy", "galle", "jaffna", "negombo", "anuradhapura",
                "polonnaruwa", "trincomalee", "batticaloa", "ratnapura", "kurunegala", "puttalam",
                "badulla", "bandarawela", "ella", "nuwara eliya", "matara", "hambantota",
                "chilaw", "kegalle", "monaragala", "vavuniya", "mannar", "ampara", "kalutara",
                "gampaha", "matale", "sigiriya", "dambulla", "bentota", "hikkaduwa", "unawatuna",
                "mirissa", "arugam bay", "yala", "udawalawe", "sinharaja", "horton plains",
                "adams peak", "pidurangala", "temple of tooth", "gangaramaya", "kelaniya",
                "kataragama", "sri pada",
            ]),
            languages: words(&["sinhala", "tamil", "sinhalese", "sri lankan", "lk", "ceylon"]),
            cultural_terms: words(&[
                "ayubowan", "vanakkam", "poya", "vesak", "poson", "esala", "perahera", "kathina",
                "avurudu", "sinhala new year", "tamil new year", "deepavali", "kiribath", "kottu",
                "hoppers", "string hoppers", "pol sambol", "parippu", "rice and curry",
                "watalappan", "kokis", "achcharu", "pittu", "thala guli", "aggala", "halapa",
                "kevum", "athirasa", "baila",
            ]),
            institutions: words(&[
                "university of colombo", "university of peradeniya", "university of moratuwa",
                "university of kelaniya", "university of sri jayewardenepura",
                "university of ruhuna", "university of jaffna", "open university of sri lanka",
                "sliit", "nsbm", "royal college", "nalanda college", "ananda college",
                "dharmaraja college", "trinity college", "visakha vidyalaya",
                "sri lanka cricket",
            ]),
            media_outlets: words(&[
                "daily mirror", "sunday times", "daily news", "lankadeepa", "divaina",
                "ada derana", "tv derana", "itn", "rupavahini", "charana tv", "sirasa tv",
                "hiru tv", "hiru news", "swarnavahini", "shakthi tv", "newsfirst",
            ]),
            public_figures: words(&[
                "ranil wickremesinghe", "mahinda rajapaksa", "gotabaya rajapaksa",
                "sajith premadasa", "maithripala sirisena", "anura kumara dissanayake",
                "sanath jayasuriya", "kumar sangakkara", "mahela jayawardene", "lasith malinga",
                "muttiah muralitharan",
            ]),
            categories: vec![
                category("news", &["news", "breaking", "update", "report", "announcement"]),
                category(
                    "entertainment",
                    &["music", "song", "dance", "comedy", "movie", "film", "teledrama"],
                ),
                category("sports", &["cricket", "football", "rugby", "sports", "match"]),
                category(
                    "travel",
                    &["travel", "visit", "tour", "tourism", "destination", "hotel", "beach"],
                ),
                category("food", &["food", "recipe", "cooking", "restaurant", "curry"]),
                category(
                    "education",
                    &["education", "tutorial", "learn", "how to", "guide", "lesson"],
                ),
                category(
                    "politics",
                    &["politics", "election", "government", "minister", "parliament"],
                ),
                category(
                    "culture",
                    &["culture", "festival", "tradition", "temple", "religious", "ceremony"],
                ),
            ],
            spam_patterns: words(&[
                r"\b(100%|guaranteed|instant|urgent|limited time)\b",
                r"\b(click here|download now|act now|order now)\b",
                r"\$[\d,]+\s*(dollars?|usd|earn|make|profit)",
                r"\b(miracle|secret|revealed|exposed|shocking)\b",
                r"!{3,}|\?{3,}|\.{4,}",
                r"\bwatch\b.*\bbefore\b.*\b(deleted|removed|banned)\b",
            ]),
        }
    }
}

impl ScoringProfile {
    /// Every keyword of every category, deduplicated, in profile order
    pub fn category_vocabulary(&self) -> Vec<String> {
        let mut vocab: Vec<String> = Vec::new();
        for kw in self.categories.iter().flat_map(|c| c.keywords.iter()) {
            let kw = kw.to_lowercase();
            if !vocab.contains(&kw) {
                vocab.push(kw);
            }
        }
        vocab
    }
}

/// Text normalized for whole-token matching
#[derive(Debug, Clone)]
pub struct TokenText {
    padded: String,
}

impl TokenText {
    pub fn new(text: &str) -> Self {
        Self {
            padded: format!(" {} ", tokenize(text).join(" ")),
        }
    }

    /// Whether `term` occurs as a run of whole tokens
    pub fn contains(&self, term: &str) -> bool {
        let needle = tokenize(term);
        if needle.is_empty() {
            return false;
        }
        self.padded.contains(&format!(" {} ", needle.join(" ")))
    }

    /// Terms from `terms` that occur, in list order, without repeats
    pub fn matches<'a>(&self, terms: &'a [String]) -> Vec<&'a str> {
        let mut found: Vec<&str> = Vec::new();
        for term in terms {
            if self.contains(term) && !found.contains(&term.as_str()) {
                found.push(term.as_str());
            }
        }
        found
    }
}

/// Terms that occur inside any one of `texts`, never spanning two of them
pub fn matches_each<'a>(texts: &[String], terms: &'a [String]) -> Vec<&'a str> {
    let texts: Vec<TokenText> = texts.iter().map(|t| TokenText::new(t)).collect();
    let mut found: Vec<&str> = Vec::new();
    for term in terms {
        if !found.contains(&term.as_str()) && texts.iter().any(|t| t.contains(term)) {
            found.push(term.as_str());
        }
    }
    found
}

/// Lowercase and split on anything that is not a letter, mark or digit
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || is_combining_mark(c)))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Vowel signs and viramas of the Sinhala and Tamil blocks, plus ZWJ
fn is_combining_mark(c: char) -> bool {
    matches!(c as u32,
        0x0D81..=0x0D83 | 0x0DCA..=0x0DDF | 0x0DF2..=0x0DF3 |
        0x0B82 | 0x0BBE..=0x0BCD | 0x0BD7 |
        0x200D)
}

/// Classify the writing system of `text`
pub fn detect_script(text: &str) -> Script {
    let mut sinhala = false;
    let mut tamil = false;
    let mut latin = false;

    for c in text.chars() {
        match c as u32 {
            0x0D80..=0x0DFF => sinhala = true,
            0x0B80..=0x0BFF => tamil = true,
            _ if c.is_ascii_alphabetic() => latin = true,
            _ => {}
        }
    }

    match (sinhala, tamil, latin) {
        (true, true, _) => Script::Mixed,
        (true, false, _) => Script::Sinhala,
        (false, true, _) => Script::Tamil,
        (false, false, true) => Script::Latin,
        (false, false, false) => Script::Unknown,
    }
}
