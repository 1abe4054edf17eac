//! Normalization and noise filtering for raw GKG field values.
//!
//! Entity columns arrive as semicolon-delimited lists polluted with URLs,
//! bare domains, numeric vectors and other non-semantic tokens; everything
//! downstream (ranking, scoring) assumes these have been stripped.

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::models::Keyword;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "in", "for", "on", "with", "to", "from", "by", "at",
    "is", "was", "are",
];

// Bare domain, optionally with a path tail ("example.com", "google.com/news").
static DOMAIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9.-]+\.[a-z]{2,}(/\S*)?$").unwrap());

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").unwrap());

/// Split a semicolon-delimited field into cleaned, non-noise tokens.
pub fn split_and_clean(field: &str) -> Vec<String> {
    field
        .split(';')
        .filter_map(|part| {
            let token = clean_token(part);
            if token.is_empty() || STOPWORDS.contains(&token.as_str()) || is_noise(&token) {
                None
            } else {
                Some(token)
            }
        })
        .collect()
}

fn clean_token(raw: &str) -> String {
    let lowered = raw.nfc().collect::<String>().to_lowercase();
    let trimmed = lowered.trim_matches(|c: char| !(c.is_alphanumeric() || c == '_'));
    trimmed.split_whitespace().join(" ")
}

/// Classify a (cleaned, lowercased) token as non-semantic.
pub fn is_noise(token: &str) -> bool {
    if token.chars().count() < 3 {
        return true;
    }
    if token.starts_with("http://") || token.starts_with("https://") || token.starts_with("www.") {
        return true;
    }
    if DOMAIN_RE.is_match(token) {
        return true;
    }
    if is_numeric_vector(token) {
        return true;
    }
    digit_ratio(token) > 0.6
}

/// Four or more comma-separated numbers (integer or decimal).
pub fn is_numeric_vector(token: &str) -> bool {
    let parts: Vec<&str> = token.split(',').collect();
    parts.len() >= 4 && parts.iter().all(|p| NUMBER_RE.is_match(p.trim()))
}

fn digit_ratio(token: &str) -> f64 {
    let total = token.chars().count();
    if total == 0 {
        return 0.0;
    }
    let digits = token.chars().filter(|c| c.is_ascii_digit()).count();
    digits as f64 / total as f64
}

/// Drop keywords whose word is noise. Counts and document sets pass through.
pub fn filter_noise(keywords: Vec<Keyword>) -> Vec<Keyword> {
    keywords.into_iter().filter(|k| !is_noise(&k.word)).collect()
}
