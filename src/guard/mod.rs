//! Time-Sync Guard: the single chokepoint every raw event passes through
//! before enrichment. It never alters a timestamp, never fills one in, and
//! never decides anything about trading — it only accepts or drops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::errors::DropReason;
use crate::models::source_entry::SourceKind;

fn late_threshold(kind: SourceKind) -> chrono::Duration {
    let secs = match kind {
        SourceKind::Twitter => 15,
        SourceKind::Telegram => 30,
        SourceKind::Reddit => 120,
    };
    chrono::Duration::seconds(secs)
}

fn out_of_order_tolerance(kind: SourceKind) -> chrono::Duration {
    let secs = match kind {
        SourceKind::Twitter => 5,
        SourceKind::Telegram => 10,
        SourceKind::Reddit => 60,
    };
    chrono::Duration::seconds(secs)
}

pub fn dedup_ttl(kind: SourceKind) -> Duration {
    match kind {
        SourceKind::Twitter => Duration::from_secs(5 * 60),
        SourceKind::Telegram => Duration::from_secs(10 * 60),
        SourceKind::Reddit => Duration::from_secs(30 * 60),
    }
}

#[derive(Default)]
struct TrackerEntry {
    last_seen: Option<DateTime<Utc>>,
}

/// Per-`(source, asset)` last-seen timestamp, used only to detect
/// out-of-order arrivals. Holds no other event state.
pub struct EventTracker {
    entries: Mutex<HashMap<(SourceKind, String), TrackerEntry>>,
}

impl EventTracker {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for EventTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Rolling `(source, asset, event_time, text)` dedup keyed by the source's
/// own TTL (Twitter 5 min, Telegram 10 min, Reddit 30 min per spec.md §3).
/// Distinct from `ingestion::dedup_store::DedupStore`, which dedups on raw
/// fingerprint ahead of the database's unique constraint — this one is the
/// guard's own duplicate-arrival check, keyed on the full tuple the guard
/// defines.
pub struct DuplicateTracker {
    seen: Mutex<HashMap<(SourceKind, String, i64, String), std::time::Instant>>,
}

impl DuplicateTracker {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
        }
    }

    fn check_and_record(
        &self,
        kind: SourceKind,
        asset: &str,
        event_time: DateTime<Utc>,
        text: &str,
        now: std::time::Instant,
    ) -> bool {
        let key = (kind, asset.to_string(), event_time.timestamp(), text.to_string());
        let ttl = dedup_ttl(kind);
        let mut seen = self.seen.lock();
        if let Some(seen_at) = seen.get(&key) {
            if now.duration_since(*seen_at) < ttl {
                return false;
            }
        }
        seen.insert(key, now);
        true
    }
}

impl Default for DuplicateTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub struct GuardMetrics {
    pub dropped_future: AtomicU64,
    pub dropped_late: AtomicU64,
    pub dropped_out_of_order: AtomicU64,
    pub dropped_duplicate: AtomicU64,
    pub dropped_malformed: AtomicU64,
    pub passed: AtomicU64,
}

impl GuardMetrics {
    fn record(&self, reason: &Result<DateTime<Utc>, DropReason>) {
        match reason {
            Ok(_) => {
                self.passed.fetch_add(1, Ordering::Relaxed);
            }
            Err(DropReason::Future) => {
                self.dropped_future.fetch_add(1, Ordering::Relaxed);
            }
            Err(DropReason::Late) => {
                self.dropped_late.fetch_add(1, Ordering::Relaxed);
            }
            Err(DropReason::OutOfOrder) => {
                self.dropped_out_of_order.fetch_add(1, Ordering::Relaxed);
            }
            Err(DropReason::Duplicate) => {
                self.dropped_duplicate.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.dropped_malformed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

pub struct TimeSyncGuard<'a> {
    tracker: &'a EventTracker,
    duplicates: &'a DuplicateTracker,
    metrics: &'a GuardMetrics,
}

impl<'a> TimeSyncGuard<'a> {
    pub fn new(tracker: &'a EventTracker, duplicates: &'a DuplicateTracker, metrics: &'a GuardMetrics) -> Self {
        Self {
            tracker,
            duplicates,
            metrics,
        }
    }

    /// Runs parse → future → late → out-of-order → duplicate → accept, in
    /// that order. `event_time` is `None` when parsing already failed
    /// upstream (missing, unparseable, no timezone, coarser than seconds) —
    /// the worker is responsible for that parse step; this only sees the
    /// result.
    pub fn evaluate(
        &self,
        source_kind: SourceKind,
        asset_symbol: &str,
        text: &str,
        event_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, DropReason> {
        let result = self.evaluate_inner(source_kind, asset_symbol, text, event_time, now);
        self.metrics.record(&result);
        result
    }

    fn evaluate_inner(
        &self,
        source_kind: SourceKind,
        asset_symbol: &str,
        text: &str,
        event_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, DropReason> {
        let event_time = event_time.ok_or(DropReason::TimestampMissing)?;

        if event_time > now {
            return Err(DropReason::Future);
        }
        if now.signed_duration_since(event_time) > late_threshold(source_kind) {
            return Err(DropReason::Late);
        }

        let key = (source_kind, asset_symbol.to_string());
        {
            let mut entries = self.tracker.entries.lock();
            let entry = entries.entry(key).or_default();
            if let Some(last) = entry.last_seen {
                if event_time < last - out_of_order_tolerance(source_kind) {
                    return Err(DropReason::OutOfOrder);
                }
            }
        }

        if !self.duplicates.check_and_record(
            source_kind,
            asset_symbol,
            event_time,
            text,
            std::time::Instant::now(),
        ) {
            return Err(DropReason::Duplicate);
        }

        let mut entries = self.tracker.entries.lock();
        let entry = entries.entry((source_kind, asset_symbol.to_string())).or_default();
        entry.last_seen = Some(entry.last_seen.map_or(event_time, |last| last.max(event_time)));

        Ok(event_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn guard_parts() -> (EventTracker, DuplicateTracker, GuardMetrics) {
        (EventTracker::new(), DuplicateTracker::new(), GuardMetrics::default())
    }

    #[test]
    fn missing_timestamp_is_dropped() {
        let (tracker, dup, metrics) = guard_parts();
        let guard = TimeSyncGuard::new(&tracker, &dup, &metrics);
        let result = guard.evaluate(SourceKind::Twitter, "BTC", "text", None, ts(1000));
        assert_eq!(result, Err(DropReason::TimestampMissing));
    }

    #[test]
    fn future_timestamp_is_strictly_rejected() {
        let (tracker, dup, metrics) = guard_parts();
        let guard = TimeSyncGuard::new(&tracker, &dup, &metrics);
        let now = ts(1000);
        assert!(guard
            .evaluate(SourceKind::Twitter, "BTC", "a", Some(now), now)
            .is_ok());
        let (tracker, dup, metrics) = guard_parts();
        let guard = TimeSyncGuard::new(&tracker, &dup, &metrics);
        let result = guard.evaluate(
            SourceKind::Twitter,
            "BTC",
            "b",
            Some(now + chrono::Duration::seconds(1)),
            now,
        );
        assert_eq!(result, Err(DropReason::Future));
    }

    #[test]
    fn late_threshold_is_per_source() {
        let (tracker, dup, metrics) = guard_parts();
        let guard = TimeSyncGuard::new(&tracker, &dup, &metrics);
        let now = ts(1_000_000);
        assert!(guard
            .evaluate(SourceKind::Twitter, "BTC", "a", Some(now - chrono::Duration::seconds(15)), now)
            .is_ok());
        let (tracker, dup, metrics) = guard_parts();
        let guard = TimeSyncGuard::new(&tracker, &dup, &metrics);
        let result = guard.evaluate(
            SourceKind::Twitter,
            "BTC",
            "b",
            Some(now - chrono::Duration::milliseconds(15_001)),
            now,
        );
        assert_eq!(result, Err(DropReason::Late));
    }

    #[test]
    fn out_of_order_respects_per_source_tolerance() {
        let (tracker, dup, metrics) = guard_parts();
        let guard = TimeSyncGuard::new(&tracker, &dup, &metrics);
        let now = ts(10_000);
        assert!(guard
            .evaluate(SourceKind::Reddit, "BTC", "first", Some(ts(9_900)), now)
            .is_ok());
        // 50s earlier than last (9900), within Reddit's 60s tolerance.
        assert!(guard
            .evaluate(SourceKind::Reddit, "BTC", "second", Some(ts(9_850)), now)
            .is_ok());
        // 120s earlier than the max-seen last (9900), outside tolerance.
        let result = guard.evaluate(SourceKind::Reddit, "BTC", "third", Some(ts(9_780)), now);
        assert_eq!(result, Err(DropReason::OutOfOrder));
    }

    #[test]
    fn duplicate_key_includes_text() {
        let (tracker, dup, metrics) = guard_parts();
        let guard = TimeSyncGuard::new(&tracker, &dup, &metrics);
        let now = ts(10_000);
        assert!(guard
            .evaluate(SourceKind::Twitter, "BTC", "same text", Some(ts(9_990)), now)
            .is_ok());
        assert_eq!(
            guard.evaluate(SourceKind::Twitter, "BTC", "same text", Some(ts(9_990)), now),
            Err(DropReason::Duplicate)
        );
        // Different text at the same instant is not a duplicate.
        assert!(guard
            .evaluate(SourceKind::Twitter, "BTC", "different text", Some(ts(9_990)), now)
            .is_ok());
    }

    #[test]
    fn separate_assets_track_independently() {
        let (tracker, dup, metrics) = guard_parts();
        let guard = TimeSyncGuard::new(&tracker, &dup, &metrics);
        let now = ts(10_000);
        assert!(guard.evaluate(SourceKind::Twitter, "BTC", "a", Some(ts(9990)), now).is_ok());
        assert!(guard.evaluate(SourceKind::Twitter, "ETH", "b", Some(ts(9980)), now).is_ok());
    }

    #[test]
    fn metrics_count_each_drop_reason() {
        let (tracker, dup, metrics) = guard_parts();
        let guard = TimeSyncGuard::new(&tracker, &dup, &metrics);
        let now = ts(10_000);
        let _ = guard.evaluate(SourceKind::Twitter, "BTC", "a", None, now);
        let _ = guard.evaluate(SourceKind::Twitter, "BTC", "b", Some(now + chrono::Duration::seconds(1)), now);
        assert_eq!(metrics.dropped_malformed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.dropped_future.load(Ordering::Relaxed), 1);
    }
}
