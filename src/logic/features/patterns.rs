//! Fixed extraction patterns
//!
//! Compiled once. Every detector sees counts derived from these same
//! expressions, so URL/keyword numbers never disagree between detectors.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static extraction pattern must compile")
}

pub static URL_RE: Lazy<Regex> =
    Lazy::new(|| compile(r#"(?i)\b(?:https?://|www\.)[^\s<>"']+"#));

pub static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)\b[a-z0-9._%+-]+@([a-z0-9.-]+\.[a-z]{2,})\b"));

/// Spam pattern families, counted per submission
pub static PATTERN_FAMILIES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("urgency", compile(r"(?i)\b(urgent|immediate(ly)?|act now|limited time|expires?|hurry)\b")),
        ("free_offers", compile(r"(?i)\b(free|no cost|complimentary|bonus)\b")),
        ("money", compile(r"(?i)(\$\s?\d+|\b\d+\s*dollars?\b|\bmoney\b|\bcash\b)")),
        ("call_to_action", compile(r"(?i)\b(click here|call now|order now|buy now|sign up now|visit now)\b")),
        ("excessive_exclamation", compile(r"!{2,}")),
        ("all_caps_words", compile(r"\b[A-Z]{4,}\b")),
        ("emails", compile(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b")),
        ("phone_numbers", compile(r"\b\d{3}[-.\s]?\d{3}[-.\s]?\d{4}\b")),
        ("adult", compile(r"(?i)\b(viagra|cialis|xxx|porn|adult content)\b")),
        ("lottery", compile(r"(?i)\b(lottery|winner|congratulations|prize|jackpot)\b")),
        ("guarantees", compile(r"(?i)(\bguaranteed?\b|100%|\brisk[- ]?free\b|\bno risk\b)")),
        ("percentages", compile(r"\d+(\.\d+)?%")),
        ("offers", compile(r"(?i)\b(offer|deal|discount|sale|special price)\b")),
    ]
});

/// Words that carry no class signal for the classifier
pub static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of",
        "with", "by", "is", "are", "was", "were", "be", "been", "have", "has", "had",
        "do", "does", "did", "will", "would", "could", "should", "may", "might",
        "can", "this", "that", "these", "those", "it", "its", "you", "your", "we",
        "our", "they", "their", "he", "she", "his", "her", "me", "my", "i", "am",
        "as", "if", "so", "no", "not", "from", "up", "out", "about", "into",
        "http", "https", "www", "com",
    ]
    .into_iter()
    .collect()
});

/// Host part of a URL match, lower-cased, without `www.`
pub fn url_host(url: &str) -> Option<String> {
    let lower = url.to_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .unwrap_or(&lower);
    let rest = rest.strip_prefix("www.").unwrap_or(rest);

    let host: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-')
        .collect();
    let host = host.trim_end_matches('.');

    if host.contains('.') {
        Some(host.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_host() {
        assert_eq!(url_host("https://www.Example.com/path?q=1"), Some("example.com".to_string()));
        assert_eq!(url_host("http://shop.spam.com:8080/"), Some("shop.spam.com".to_string()));
        assert_eq!(url_host("www.site.org."), Some("site.org".to_string()));
        assert_eq!(url_host("https://localhost/"), None);
    }

    #[test]
    fn test_pattern_families_match() {
        let text = "URGENT!!! You are a WINNER, claim $500 cash now. 100% guaranteed.";
        let hits: Vec<&str> = PATTERN_FAMILIES
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(name, _)| *name)
            .collect();

        for expected in ["urgency", "money", "excessive_exclamation", "all_caps_words", "lottery", "guarantees", "percentages"] {
            assert!(hits.contains(&expected), "missing {}", expected);
        }
        assert!(!hits.contains(&"phone_numbers"));
    }
}
