//! Tracks upstream fetch failures per whitelisted handle so a worker stops
//! hammering a source it already knows is erroring. Mirrors the shape of
//! `guard::DuplicateTracker`: one `DashMap`, TTL read at lookup time rather
//! than on a background sweep.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Connection refused, timeout, DNS failure — anything below the HTTP
    /// layer or a 5xx.
    Network,
    RateLimited,
    /// A 4xx the client couldn't otherwise classify, or a malformed body.
    InvalidResponse,
}

impl FailureType {
    fn ttl(self) -> Duration {
        match self {
            FailureType::Network => Duration::minutes(5),
            FailureType::RateLimited => Duration::minutes(15),
            FailureType::InvalidResponse => Duration::hours(1),
        }
    }
}

#[derive(Debug, Clone)]
struct FailureInfo {
    failed_at: DateTime<Utc>,
    error_type: FailureType,
}

/// Keyed by platform handle (account, subreddit, chat id as a string).
/// Shared by a single worker across its own cycles; not shared across
/// workers, since a Twitter outage says nothing about Reddit.
#[derive(Clone, Default)]
pub struct FailureCache {
    cache: DashMap<String, FailureInfo>,
}

impl FailureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if `handle` failed recently enough that its TTL hasn't
    /// elapsed. Expired entries are removed as a side effect.
    pub fn is_failed(&self, handle: &str) -> bool {
        let Some(entry) = self.cache.get(handle) else {
            return false;
        };
        let info = entry.value().clone();
        drop(entry);
        if Utc::now() < info.failed_at + info.error_type.ttl() {
            true
        } else {
            self.cache.remove(handle);
            false
        }
    }

    pub fn record_failure(&self, handle: &str, error_type: FailureType) {
        self.cache.insert(
            handle.to_string(),
            FailureInfo {
                failed_at: Utc::now(),
                error_type,
            },
        );
    }

    pub fn clear(&self, handle: &str) {
        self.cache.remove(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_reports_failure() {
        let cache = FailureCache::new();
        assert!(!cache.is_failed("whale_alert"));
        cache.record_failure("whale_alert", FailureType::Network);
        assert!(cache.is_failed("whale_alert"));
    }

    #[test]
    fn clear_resets_state() {
        let cache = FailureCache::new();
        cache.record_failure("whale_alert", FailureType::RateLimited);
        cache.clear("whale_alert");
        assert!(!cache.is_failed("whale_alert"));
    }
}
