use std::time::{Duration, Instant};

use dashmap::DashMap;

/// In-memory fingerprint dedup, keyed by `(source_entry_id, fingerprint)`
/// with a per-source TTL (see `guard::dedup_ttl`). A fast-path short-circuit
/// ahead of the database's own unique constraint on `fingerprint` — avoids a
/// round trip for the common case of an upstream API re-returning the same
/// item across overlapping cycles. Modeled on the teacher's `FailureCache`:
/// a `DashMap` with per-entry TTL, swept lazily on access rather than by a
/// background task.
pub struct DedupStore {
    seen: DashMap<(i64, String), Instant>,
    ttl: Duration,
}

impl DedupStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            ttl,
        }
    }

    /// Returns `true` if this is the first time `(source_entry_id,
    /// fingerprint)` has been seen within the TTL window, recording it
    /// either way.
    pub fn check_and_record(&self, source_entry_id: i64, fingerprint: &str) -> bool {
        let key = (source_entry_id, fingerprint.to_string());
        let now = Instant::now();
        if let Some(seen_at) = self.seen.get(&key) {
            if now.duration_since(*seen_at) < self.ttl {
                return false;
            }
        }
        self.seen.insert(key, now);
        true
    }

    pub fn cleanup_expired(&self) {
        let ttl = self.ttl;
        self.seen.retain(|_, seen_at| seen_at.elapsed() < ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sighting_is_new_second_is_not() {
        let store = DedupStore::new(Duration::from_secs(300));
        assert!(store.check_and_record(1, "fp"));
        assert!(!store.check_and_record(1, "fp"));
    }

    #[test]
    fn different_sources_track_independently() {
        let store = DedupStore::new(Duration::from_secs(300));
        assert!(store.check_and_record(1, "fp"));
        assert!(store.check_and_record(2, "fp"));
    }
}
