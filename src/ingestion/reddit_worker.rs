use std::time::Instant;

use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

use crate::errors::DropReason;
use crate::external::reddit_client::{RedditClient, RedditItem};
use crate::ingestion::failure_cache::{FailureCache, FailureType};
use crate::ingestion::fingerprint::fingerprint;
use crate::ingestion::velocity::{windows, VelocityTracker};
use crate::ingestion::{dedup_store::DedupStore, jittered_pace, wall_to_mono, CycleMetrics};
use crate::models::raw_event::{source_reliability, PlatformDetails, RawEvent};
use crate::models::source_entry::{SourceEntry, SourceKind};
use crate::ratelimit::RateLimiter;
use crate::registries::asset_registry::AssetRegistry;
use crate::registries::source_registry::SourceRegistry;

const DEFAULT_PER_SUBREDDIT_CAP: u32 = 25;
const GLOBAL_CAP: u32 = 200;
const DEDUP_TTL: std::time::Duration = std::time::Duration::from_secs(30 * 60);
const FETCH_PACE: std::time::Duration = std::time::Duration::from_millis(500);

const DELETED_MARKERS: [&str; 2] = ["[deleted]", "[removed]"];

/// Runs the Reddit ingestion cycle: fetch the newest submissions from every
/// whitelisted subreddit, apply the filter chain, compute metrics, and hand
/// back accepted events in ascending event-time order.
pub struct RedditWorker {
    source_registry: std::sync::Arc<SourceRegistry>,
    asset_registry: std::sync::Arc<AssetRegistry>,
    client: std::sync::Arc<dyn RedditClient>,
    rate_limiter: RateLimiter,
    velocity: VelocityTracker,
    dedup: DedupStore,
    failures: FailureCache,
}

impl RedditWorker {
    pub fn new(
        source_registry: std::sync::Arc<SourceRegistry>,
        asset_registry: std::sync::Arc<AssetRegistry>,
        client: std::sync::Arc<dyn RedditClient>,
    ) -> Self {
        Self {
            source_registry,
            asset_registry,
            client,
            rate_limiter: RateLimiter::new(GLOBAL_CAP, DEFAULT_PER_SUBREDDIT_CAP),
            velocity: VelocityTracker::new(),
            dedup: DedupStore::new(DEDUP_TTL),
            failures: FailureCache::new(),
        }
    }

    pub async fn run_cycle(&self, now_wall: DateTime<Utc>, now_mono: Instant) -> (Vec<RawEvent>, CycleMetrics) {
        let mut metrics = CycleMetrics::default();
        let mut accepted = Vec::new();

        let mut sources = self.source_registry.enabled_sources(SourceKind::Reddit).into_iter().peekable();
        while let Some(entry) = sources.next() {
            if self.failures.is_failed(&entry.handle) {
                continue;
            }
            let cap = if entry.per_run_cap > 0 {
                entry.per_run_cap as u32
            } else {
                DEFAULT_PER_SUBREDDIT_CAP
            };
            let items = match self.client.fetch_new(&entry.handle, cap).await {
                Ok(items) => {
                    self.failures.clear(&entry.handle);
                    items
                }
                Err(_) => {
                    self.failures.record_failure(&entry.handle, FailureType::Network);
                    continue;
                }
            };
            if sources.peek().is_some() {
                jittered_pace(FETCH_PACE).await;
            }

            for item in items {
                if !self.rate_limiter.try_admit(entry.id, now_mono) {
                    metrics.record_drop(DropReason::SourceRateExceeded);
                    continue;
                }
                let detect = |text: &str| self.asset_registry.detect_asset(text);
                match filter_and_build(&entry, &detect, &item, now_wall, now_mono, &self.velocity, &self.dedup) {
                    Ok(event) => {
                        metrics.record_accept();
                        accepted.push(event);
                    }
                    Err(reason) => metrics.record_drop(reason),
                }
            }
        }

        accepted.sort_by_key(|e| e.event_time);
        (accepted, metrics)
    }
}

fn is_removed_marker(s: &str) -> bool {
    DELETED_MARKERS.contains(&s.trim())
}

#[allow(clippy::too_many_arguments)]
fn filter_and_build(
    entry: &SourceEntry,
    detect_asset: &impl Fn(&str) -> Option<String>,
    item: &RedditItem,
    now_wall: DateTime<Utc>,
    now_mono: Instant,
    velocity: &VelocityTracker,
    dedup: &DedupStore,
) -> Result<RawEvent, DropReason> {
    if item.post_id.is_empty() {
        return Err(DropReason::EmptyText);
    }
    if is_removed_marker(&item.author) {
        return Err(DropReason::DeletedAuthor);
    }
    if item.score <= 0 {
        return Err(DropReason::NonPositiveScore);
    }
    let combined_text = format!("{} {}", item.title, item.body);
    if combined_text.trim().is_empty() {
        return Err(DropReason::EmptyText);
    }
    let Some(asset_symbol) = detect_asset(&combined_text) else {
        return Err(DropReason::NoAssetKeyword);
    };
    if is_removed_marker(&item.body) {
        return Err(DropReason::DeletedBody);
    }

    let Some(event_time) = DateTime::<Utc>::from_timestamp(item.created_utc as i64, 0) else {
        return Err(DropReason::TimestampMalformed);
    };
    let event_time = event_time.trunc_subsecs(0);

    let fp = fingerprint(&["reddit", &item.post_id, &event_time.timestamp().to_string()]);
    if !dedup.check_and_record(entry.id, &fp) {
        return Err(DropReason::Duplicate);
    }

    let event_instant = wall_to_mono(now_wall, now_mono, event_time);
    velocity.record(&asset_symbol, event_instant, windows::REDDIT_LONG);
    let velocity_ratio = velocity.velocity(
        &asset_symbol,
        event_instant,
        windows::REDDIT_SHORT,
        windows::REDDIT_LONG,
        windows::REDDIT_DIVISOR,
    );

    let engagement_weight = ((1.0 + item.score as f64 + item.num_comments as f64).ln()).max(0.0);
    let author_weight = ((1.0 + item.author_karma as f64).ln()).max(0.0);

    Ok(RawEvent {
        id: Uuid::new_v4(),
        source_entry_id: entry.id,
        source: SourceKind::Reddit,
        source_reliability: source_reliability(SourceKind::Reddit),
        asset_symbol,
        event_time: Some(event_time),
        ingest_time: now_wall,
        text: combined_text.trim().to_string(),
        engagement_weight: Some(engagement_weight),
        author_weight: Some(author_weight),
        velocity: velocity_ratio,
        manipulation_flag: false,
        fingerprint: fp,
        details: PlatformDetails::Reddit {
            author_deleted: false,
            score: item.score,
            num_comments: item.num_comments,
            author_karma: item.author_karma,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::source_entry::{EntryKind, SourceRole};

    fn entry() -> SourceEntry {
        SourceEntry {
            id: 2,
            kind: EntryKind::Subreddit,
            handle: "CryptoCurrency".to_string(),
            asset_symbol: "BTC".to_string(),
            role: SourceRole::Community,
            enabled: true,
            per_run_cap: 25,
            priority: 1,
        }
    }

    fn item() -> RedditItem {
        RedditItem {
            post_id: "abc123".to_string(),
            subreddit: "CryptoCurrency".to_string(),
            title: "BTC looking strong today".to_string(),
            body: "accumulation phase continues".to_string(),
            author: "some_trader".to_string(),
            author_karma: 5000,
            score: 42,
            num_comments: 10,
            created_utc: Utc::now().timestamp() as f64,
        }
    }

    fn detect_btc(text: &str) -> Option<String> {
        if text.to_lowercase().split(|c: char| !c.is_alphanumeric()).any(|w| w == "btc") {
            Some("BTC".to_string())
        } else {
            None
        }
    }

    fn harness() -> (VelocityTracker, DedupStore) {
        (VelocityTracker::new(), DedupStore::new(DEDUP_TTL))
    }

    #[test]
    fn deleted_author_is_dropped() {
        let (velocity, dedup) = harness();
        let mut i = item();
        i.author = "[deleted]".to_string();
        let now = Utc::now();
        let result = filter_and_build(&entry(), &detect_btc, &i, now, Instant::now(), &velocity, &dedup);
        assert!(matches!(result, Err(DropReason::DeletedAuthor)));
    }

    #[test]
    fn non_positive_score_is_dropped() {
        let (velocity, dedup) = harness();
        let mut i = item();
        i.score = 0;
        let now = Utc::now();
        let result = filter_and_build(&entry(), &detect_btc, &i, now, Instant::now(), &velocity, &dedup);
        assert!(matches!(result, Err(DropReason::NonPositiveScore)));
    }

    #[test]
    fn removed_body_is_dropped() {
        let (velocity, dedup) = harness();
        let mut i = item();
        i.body = "[removed]".to_string();
        i.title = "BTC to the moon".to_string();
        let now = Utc::now();
        let result = filter_and_build(&entry(), &detect_btc, &i, now, Instant::now(), &velocity, &dedup);
        assert!(matches!(result, Err(DropReason::DeletedBody)));
    }

    #[test]
    fn missing_asset_keyword_is_dropped() {
        let (velocity, dedup) = harness();
        let mut i = item();
        i.title = "market update".to_string();
        i.body = "general discussion thread".to_string();
        let now = Utc::now();
        let result = filter_and_build(&entry(), &detect_btc, &i, now, Instant::now(), &velocity, &dedup);
        assert!(matches!(result, Err(DropReason::NoAssetKeyword)));
    }

    #[test]
    fn accepted_event_carries_computed_metrics() {
        let (velocity, dedup) = harness();
        let i = item();
        let now = Utc::now();
        let event = filter_and_build(&entry(), &detect_btc, &i, now, Instant::now(), &velocity, &dedup).unwrap();
        assert_eq!(event.source, SourceKind::Reddit);
        assert_eq!(event.source_reliability, 0.7);
        assert!(event.engagement_weight.unwrap() > 0.0);
        assert!(event.author_weight.unwrap() > 0.0);
    }

    #[test]
    fn empty_combined_text_is_dropped_before_asset_check() {
        let (velocity, dedup) = harness();
        let mut i = item();
        i.title = String::new();
        i.body = String::new();
        let now = Utc::now();
        let result = filter_and_build(&entry(), &detect_btc, &i, now, Instant::now(), &velocity, &dedup);
        assert!(matches!(result, Err(DropReason::EmptyText)));
    }
}
