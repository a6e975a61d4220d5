use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Tracks recent mention/message timestamps per key (asset symbol, or a
/// fixed key for a source-wide stream) and reports a velocity ratio between
/// a short window's count and a long window's count normalized to the short
/// window's unit, per spec.md §4.3's three source-specific formulas:
///
/// - Twitter: `mentions_60s / (mentions_3600s / 60)`
/// - Reddit: `mentions_6h / (mentions_48h / 8)`
/// - Telegram: `messages_10min / (messages_1h / 6)`
///
/// A key with no long-window history reports velocity `1.0` (baseline), not
/// `0.0` or an undefined division, so a single new mention doesn't look like
/// an infinite spike.
pub struct VelocityTracker {
    per_key: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl VelocityTracker {
    pub fn new() -> Self {
        Self {
            per_key: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, key: &str, now: Instant, retention: Duration) {
        let mut map = self.per_key.lock();
        let entry = map.entry(key.to_string()).or_default();
        entry.push_back(now);
        evict(entry, now, retention);
    }

    /// `short_window` and `long_window` must both be ≤ the `retention`
    /// passed to `record` for this key, or older short-window mentions will
    /// already have been evicted.
    pub fn velocity(
        &self,
        key: &str,
        now: Instant,
        short_window: Duration,
        long_window: Duration,
        long_window_divisor: f64,
    ) -> f64 {
        let mut map = self.per_key.lock();
        let Some(entry) = map.get_mut(key) else {
            return 1.0;
        };
        evict(entry, now, long_window);
        if entry.is_empty() {
            return 1.0;
        }
        let long_count = entry.len() as f64;
        let short_count = entry
            .iter()
            .filter(|t| now.duration_since(**t) <= short_window)
            .count() as f64;
        let baseline = long_count / long_window_divisor;
        if baseline <= 0.0 {
            return 1.0;
        }
        short_count / baseline
    }

    pub fn mention_count(&self, key: &str) -> u32 {
        self.per_key.lock().get(key).map(|q| q.len() as u32).unwrap_or(0)
    }
}

fn evict(entry: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = entry.front() {
        if now.duration_since(*front) > window {
            entry.pop_front();
        } else {
            break;
        }
    }
}

impl Default for VelocityTracker {
    fn default() -> Self {
        Self::new()
    }
}

pub mod windows {
    use std::time::Duration;

    pub const TWITTER_SHORT: Duration = Duration::from_secs(60);
    pub const TWITTER_LONG: Duration = Duration::from_secs(3600);
    pub const TWITTER_DIVISOR: f64 = 60.0;

    pub const REDDIT_SHORT: Duration = Duration::from_secs(6 * 3600);
    pub const REDDIT_LONG: Duration = Duration::from_secs(48 * 3600);
    pub const REDDIT_DIVISOR: f64 = 8.0;

    pub const TELEGRAM_SHORT: Duration = Duration::from_secs(10 * 60);
    pub const TELEGRAM_LONG: Duration = Duration::from_secs(3600);
    pub const TELEGRAM_DIVISOR: f64 = 6.0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_key_reports_baseline_velocity() {
        let tracker = VelocityTracker::new();
        let now = Instant::now();
        assert_eq!(
            tracker.velocity("BTC", now, windows::TWITTER_SHORT, windows::TWITTER_LONG, windows::TWITTER_DIVISOR),
            1.0
        );
    }

    #[test]
    fn twitter_velocity_formula() {
        let tracker = VelocityTracker::new();
        let now = Instant::now();
        for _ in 0..60 {
            tracker.record("BTC", now, windows::TWITTER_LONG);
        }
        // 60 mentions in the last 60s out of 60 total in the last hour:
        // baseline = 60/60 = 1.0/min; short count = 60 => velocity = 60.0.
        let v = tracker.velocity("BTC", now, windows::TWITTER_SHORT, windows::TWITTER_LONG, windows::TWITTER_DIVISOR);
        assert_eq!(v, 60.0);
    }

    #[test]
    fn old_mentions_age_out_of_the_long_window() {
        let tracker = VelocityTracker::new();
        let t0 = Instant::now();
        tracker.record("BTC", t0, windows::TWITTER_LONG);
        let t1 = t0 + Duration::from_secs(3700);
        assert_eq!(
            tracker.velocity("BTC", t1, windows::TWITTER_SHORT, windows::TWITTER_LONG, windows::TWITTER_DIVISOR),
            1.0
        );
    }

    #[test]
    fn keys_track_independently() {
        let tracker = VelocityTracker::new();
        let now = Instant::now();
        tracker.record("BTC", now, windows::TWITTER_LONG);
        assert_eq!(tracker.mention_count("BTC"), 1);
        assert_eq!(tracker.mention_count("ETH"), 0);
    }
}
