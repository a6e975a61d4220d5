pub mod dedup_store;
pub mod failure_cache;
pub mod fingerprint;
pub mod manipulation;
pub mod reddit_worker;
pub mod telegram_worker;
pub mod twitter_worker;
pub mod velocity;

use std::collections::HashMap;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Utc};

use crate::errors::DropReason;

/// Sleeps a randomized 70%-130% of `base` before the next per-entry fetch,
/// so a worker iterating many whitelisted entries doesn't hit the upstream
/// API in a tight, perfectly periodic burst.
pub async fn jittered_pace(base: StdDuration) {
    use rand::Rng;
    let factor = rand::rng().random_range(0.7..=1.3);
    let millis = (base.as_millis() as f64 * factor) as u64;
    tokio::time::sleep(StdDuration::from_millis(millis)).await;
}

/// Converts an event-time timestamp into an `Instant` anchored to
/// `now_mono`, so the (wall-clock-keyed) event stream can feed the
/// `Instant`-keyed velocity trackers consistently. Clamped to `now_mono` for
/// a timestamp that claims to be in the future; the Time-Sync Guard is the
/// actual authority on future timestamps and runs downstream of the workers.
pub fn wall_to_mono(now_wall: DateTime<Utc>, now_mono: Instant, event_time: DateTime<Utc>) -> Instant {
    if event_time >= now_wall {
        return now_mono;
    }
    match (now_wall - event_time).to_std() {
        Ok(delta) => now_mono.checked_sub(delta).unwrap_or(now_mono),
        Err(_) => now_mono,
    }
}

/// Per-cycle counters for a single ingestion worker: how many items the
/// upstream client returned, how many were accepted into the enrichment
/// pipeline, and a breakdown of every drop reason the worker's own filter
/// chain produced (the Time-Sync Guard keeps its own separate `GuardMetrics`
/// for its own drop reasons).
#[derive(Debug, Default, Clone)]
pub struct CycleMetrics {
    pub fetched: u64,
    pub accepted: u64,
    pub dropped: u64,
    pub drop_reasons: HashMap<DropReason, u64>,
}

impl CycleMetrics {
    pub fn record_drop(&mut self, reason: DropReason) {
        self.fetched += 1;
        self.dropped += 1;
        *self.drop_reasons.entry(reason).or_insert(0) += 1;
    }

    pub fn record_accept(&mut self) {
        self.fetched += 1;
        self.accepted += 1;
    }
}
