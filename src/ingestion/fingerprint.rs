use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Normalizes text the way the manipulation detector does: lowercase, strip
/// digits, strip punctuation, collapse whitespace. Two posts that differ
/// only in case, numbers, or punctuation hash identically. Digit-stripping
/// is deliberate here — it exists so numeric variations of the same spam
/// phrase ("buy now 100x" / "buy now 200x") collide. Used only by
/// `text_fingerprint`; Stage-1 dedup needs digits preserved and uses
/// `normalize_keep_digits` instead.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let no_digits: String = lowered.chars().filter(|c| !c.is_ascii_digit()).collect();
    let no_punct: String = no_digits
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    no_punct.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase, strip punctuation, collapse whitespace, but keep digits. Used
/// for Stage-1 dedup's `fingerprint`, where the numeric truncated
/// `event_time` component must still distinguish two otherwise-identical
/// posts.
fn normalize_keep_digits(text: &str) -> String {
    let lowered = text.to_lowercase();
    let no_punct: String = lowered
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    no_punct.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stage-1 raw-event dedup fingerprint, computed from `source`, `text`, and
/// truncated `event_time` as three genuinely distinguishing components —
/// digits are preserved (via `normalize_keep_digits`) so two posts that
/// differ only in timestamp don't collide. A `DefaultHasher` stand-in for
/// the MD5 digest the system this replaces used — only the behavior "same
/// normalized input produces the same fingerprint" is load-bearing, not the
/// specific algorithm. Returned as a hex string since the Raw Event's
/// `fingerprint` field is a string.
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = DefaultHasher::new();
    for part in parts {
        normalize_keep_digits(part).hash(&mut hasher);
        0u8.hash(&mut hasher);
    }
    format!("{:016x}", hasher.finish())
}

/// Content fingerprint used by the manipulation detector, which keys on
/// message text alone across chats rather than on a specific
/// source/asset/time tuple, and deliberately strips digits so numeric
/// variations of the same spam phrase coincide.
pub fn text_fingerprint(text: &str) -> String {
    let mut hasher = DefaultHasher::new();
    normalize(text).hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_after_normalization_hashes_equal() {
        let a = text_fingerprint("BUY ETH NOW!!! 100x gains");
        let b = text_fingerprint("buy eth now 999x gains");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_content_hashes_differ() {
        let a = text_fingerprint("buy eth now");
        let b = text_fingerprint("sell btc now");
        assert_ne!(a, b);
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize("hello    world  "), "hello world");
    }

    #[test]
    fn multi_part_fingerprint_distinguishes_sources() {
        let a = fingerprint(&["twitter", "moon soon", "1700000000"]);
        let b = fingerprint(&["reddit", "moon soon", "1700000000"]);
        assert_ne!(a, b);
    }

    #[test]
    fn multi_part_fingerprint_distinguishes_event_time() {
        let a = fingerprint(&["twitter", "moon soon", "1700000000"]);
        let b = fingerprint(&["twitter", "moon soon", "1700000500"]);
        assert_ne!(a, b);
    }
}
