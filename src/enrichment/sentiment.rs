//! Rule-based sentiment scoring: a fixed lexicon, a fixed set of regex
//! category patterns, fixed scoring weights, and fixed label thresholds.
//! None of these constants are configuration — the lexicon, regex
//! patterns, weights, and thresholds are copied verbatim from
//! `original_source/sentiment_pipeline.py`'s `LEXICON`, `REGEX_PATTERNS`,
//! `SCORE_WEIGHTS`, and `LABEL_THRESHOLD_*` constants.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use crate::models::sentiment_event::{Label, SentimentCounts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Bullish,
    Bearish,
    Fear,
    Greed,
}

const SCORE_WEIGHT_BULLISH: f64 = 1.0;
const SCORE_WEIGHT_GREED: f64 = 0.5;
const SCORE_WEIGHT_BEARISH: f64 = -1.2;
const SCORE_WEIGHT_FEAR: f64 = -1.5;

const LABEL_THRESHOLD_POSITIVE: f64 = 0.2;
const LABEL_THRESHOLD_NEGATIVE: f64 = -0.2;

fn weight_for(category: Category) -> f64 {
    match category {
        Category::Bullish => SCORE_WEIGHT_BULLISH,
        Category::Greed => SCORE_WEIGHT_GREED,
        Category::Bearish => SCORE_WEIGHT_BEARISH,
        Category::Fear => SCORE_WEIGHT_FEAR,
    }
}

lazy_static! {
static ref LEXICON: HashMap<&'static str, Category> = {
    use Category::*;
    HashMap::from([
        ("moon", Bullish),
        ("breakout", Bullish),
        ("accumulation", Bullish),
        ("buy wall", Bullish),
        ("whale buying", Bullish),
        ("dump", Bearish),
        ("rug", Bearish),
        ("hack", Bearish),
        ("exploit", Bearish),
        ("sell wall", Bearish),
        ("panic", Fear),
        ("exit", Fear),
        ("collapse", Fear),
        ("bankruptcy", Fear),
        ("100x", Greed),
        ("lambo", Greed),
        ("all in", Greed),
        ("yolo", Greed),
    ])
};

/// The four fixed regex category patterns, copied verbatim from
/// `original_source/sentiment_pipeline.py`'s `REGEX_PATTERNS` +
/// `REGEX_CATEGORY_MAP`: `\b(dump|dumping|dumped)\b` (bearish),
/// `\b(rug|rugpull)\b` (bearish), `\b\d{2,4}x\b` (greed), and `[!]{2,}`
/// which matches but maps to no category — it still counts toward
/// `total_matches` so a purely emphatic post isn't treated as zero-match,
/// but contributes no weight to `raw_score`.
static ref REGEX_PATTERNS: Vec<(Regex, Option<Category>)> = {
    use Category::*;
    vec![
        (Regex::new(r"\b(dump|dumping|dumped)\b").unwrap(), Some(Bearish)),
        (Regex::new(r"\b(rug|rugpull)\b").unwrap(), Some(Bearish)),
        (Regex::new(r"\b\d{2,4}x\b").unwrap(), Some(Greed)),
        (Regex::new(r"[!]{2,}").unwrap(), None),
    ]
};

static ref URL_PATTERN: Regex = Regex::new(r"https?://\S+").unwrap();
}

/// Lowercases, strips URLs and emoji. Runs before lexicon/regex matching so
/// neither has to account for noise in the raw text. The caller keeps the
/// original text alongside this cleaned copy for audit.
pub fn preprocess_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let no_urls = URL_PATTERN.replace_all(&lowered, "");
    no_urls
        .chars()
        .filter(|c| !is_emoji(*c))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_emoji(c: char) -> bool {
    matches!(c as u32,
        0x1F300..=0x1FAFF | 0x2600..=0x27BF | 0x1F000..=0x1F0FF)
}

fn contains_word(text: &str, phrase: &str) -> bool {
    if phrase.contains(' ') {
        return text.contains(phrase);
    }
    text.split(|c: char| !c.is_alphanumeric())
        .any(|token| token == phrase)
}

fn bump(counts: &mut SentimentCounts, category: Category) {
    match category {
        Category::Bullish => counts.bullish += 1,
        Category::Bearish => counts.bearish += 1,
        Category::Fear => counts.fear += 1,
        Category::Greed => counts.greed += 1,
    }
}

/// Counts every lexicon whole-word match and every regex match against
/// already-preprocessed text. Returns the per-category tally plus the
/// number of matches (like `!!+`) that map to no category — both are
/// summed for `total_matches`, but only the former contributes to
/// `raw_score`.
pub fn count_matches(text: &str) -> (SentimentCounts, u32) {
    let mut counts = SentimentCounts::default();
    let mut uncategorized = 0u32;

    for (word, category) in LEXICON.iter() {
        if contains_word(text, word) {
            bump(&mut counts, *category);
        }
    }
    for (pattern, category) in REGEX_PATTERNS.iter() {
        if pattern.is_match(text) {
            match category {
                Some(c) => bump(&mut counts, *c),
                None => uncategorized += 1,
            }
        }
    }
    (counts, uncategorized)
}

pub fn total_matches(counts: &SentimentCounts, uncategorized: u32) -> u32 {
    counts.total() + uncategorized
}

/// `raw_score = 1.0*bullish + 0.5*greed - 1.2*bearish - 1.5*fear`.
pub fn calculate_raw_score(counts: &SentimentCounts) -> f64 {
    weight_for(Category::Bullish) * counts.bullish as f64
        + weight_for(Category::Greed) * counts.greed as f64
        + weight_for(Category::Bearish) * counts.bearish as f64
        + weight_for(Category::Fear) * counts.fear as f64
}

/// `clamp(raw_score / total_matches, -1, 1)` if any match was found, else
/// `0.0` — dividing by a count of matches, not by a fixed denominator, so a
/// single strongly-weighted category match still normalizes to its full
/// signed weight rather than being diluted.
pub fn normalize_score(raw_score: f64, total_matches: u32) -> f64 {
    if total_matches == 0 {
        return 0.0;
    }
    (raw_score / total_matches as f64).clamp(-1.0, 1.0)
}

pub fn assign_label(normalized_score: f64) -> Label {
    if normalized_score >= LABEL_THRESHOLD_POSITIVE {
        1
    } else if normalized_score <= LABEL_THRESHOLD_NEGATIVE {
        -1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bullish_text_scores_positive() {
        let text = preprocess_text("$BTC moon breakout!");
        let (counts, uncategorized) = count_matches(&text);
        let raw = calculate_raw_score(&counts);
        let normalized = normalize_score(raw, total_matches(&counts, uncategorized));
        assert_eq!(counts.bullish, 2);
        assert_eq!(assign_label(normalized), 1);
    }

    #[test]
    fn bearish_and_fear_text_scores_negative() {
        let text = preprocess_text("everyone is in panic, total collapse, rug incoming");
        let (counts, uncategorized) = count_matches(&text);
        let raw = calculate_raw_score(&counts);
        let normalized = normalize_score(raw, total_matches(&counts, uncategorized));
        assert!(raw < 0.0);
        assert_eq!(assign_label(normalized), -1);
    }

    #[test]
    fn zero_matches_normalizes_to_zero_not_divide_by_zero() {
        let text = preprocess_text("the market opened today");
        let (counts, uncategorized) = count_matches(&text);
        assert_eq!(total_matches(&counts, uncategorized), 0);
        let raw = calculate_raw_score(&counts);
        assert_eq!(normalize_score(raw, 0), 0.0);
        assert_eq!(assign_label(0.0), 0);
    }

    #[test]
    fn label_thresholds_are_inclusive_at_the_boundary() {
        assert_eq!(assign_label(0.2), 1);
        assert_eq!(assign_label(-0.2), -1);
        assert_eq!(assign_label(0.1999), 0);
    }

    #[test]
    fn score_clamps_at_bounds() {
        assert_eq!(normalize_score(5.0, 1), 1.0);
        assert_eq!(normalize_score(-5.0, 1), -1.0);
    }

    #[test]
    fn word_boundary_prevents_partial_matches() {
        assert!(!contains_word("mooning around the house", "moon"));
        assert!(contains_word("moon to the moon", "moon"));
    }

    #[test]
    fn regex_patterns_match_dump_variants_and_leverage_multiples() {
        let text = preprocess_text("they're dumping hard, classic rugpull, 100x gains incoming!!!");
        let (counts, uncategorized) = count_matches(&text);
        assert!(counts.bearish >= 1);
        assert!(counts.greed >= 1);
        assert_eq!(uncategorized, 1);
    }

    #[test]
    fn url_and_emoji_are_stripped() {
        let cleaned = preprocess_text("check this out https://example.com/a \u{1F680}\u{1F680} moon");
        assert!(!cleaned.contains("http"));
        assert!(!cleaned.contains('\u{1F680}'));
        assert!(cleaned.contains("moon"));
    }
}
