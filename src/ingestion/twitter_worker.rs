use std::time::Instant;

use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

use crate::errors::DropReason;
use crate::external::twitter_client::{TwitterClient, TwitterItem};
use crate::ingestion::failure_cache::{FailureCache, FailureType};
use crate::ingestion::fingerprint::fingerprint;
use crate::ingestion::velocity::{windows, VelocityTracker};
use crate::ingestion::{dedup_store::DedupStore, jittered_pace, wall_to_mono, CycleMetrics};
use crate::models::raw_event::{source_reliability, PlatformDetails, RawEvent};
use crate::models::source_entry::{SourceEntry, SourceKind};
use crate::ratelimit::RateLimiter;
use crate::registries::asset_registry::AssetRegistry;
use crate::registries::source_registry::SourceRegistry;

const DEFAULT_PER_SOURCE_CAP: u32 = 30;
const GLOBAL_CAP: u32 = 500;
const DEDUP_TTL: std::time::Duration = std::time::Duration::from_secs(5 * 60);
const FETCH_PACE: std::time::Duration = std::time::Duration::from_millis(200);

/// Runs the Twitter ingestion cycle: fetch from every whitelisted account,
/// list, or query entry, apply the filter chain in spec order, compute
/// metrics, and hand back accepted events in ascending event-time order.
pub struct TwitterWorker {
    source_registry: std::sync::Arc<SourceRegistry>,
    asset_registry: std::sync::Arc<AssetRegistry>,
    client: std::sync::Arc<dyn TwitterClient>,
    rate_limiter: RateLimiter,
    velocity: VelocityTracker,
    dedup: DedupStore,
    failures: FailureCache,
}

impl TwitterWorker {
    pub fn new(
        source_registry: std::sync::Arc<SourceRegistry>,
        asset_registry: std::sync::Arc<AssetRegistry>,
        client: std::sync::Arc<dyn TwitterClient>,
    ) -> Self {
        Self {
            source_registry,
            asset_registry,
            client,
            rate_limiter: RateLimiter::new(GLOBAL_CAP, DEFAULT_PER_SOURCE_CAP),
            velocity: VelocityTracker::new(),
            dedup: DedupStore::new(DEDUP_TTL),
            failures: FailureCache::new(),
        }
    }

    pub async fn run_cycle(&self, now_wall: DateTime<Utc>, now_mono: Instant) -> (Vec<RawEvent>, CycleMetrics) {
        let mut metrics = CycleMetrics::default();
        let mut accepted = Vec::new();

        let mut sources = self.source_registry.enabled_sources(SourceKind::Twitter).into_iter().peekable();
        while let Some(entry) = sources.next() {
            if self.failures.is_failed(&entry.handle) {
                continue;
            }
            let cap = if entry.per_run_cap > 0 {
                entry.per_run_cap as u32
            } else {
                DEFAULT_PER_SOURCE_CAP
            };
            let items = match self.client.fetch_recent(&entry.handle, cap).await {
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
                    // Distinguish source-level vs. global exhaustion isn't
                    // observable from the outside of RateLimiter; attribute
                    // to the source cap, the more common case in practice.
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

#[allow(clippy::too_many_arguments)]
fn filter_and_build(
    entry: &SourceEntry,
    detect_asset: &impl Fn(&str) -> Option<String>,
    item: &TwitterItem,
    now_wall: DateTime<Utc>,
    now_mono: Instant,
    velocity: &VelocityTracker,
    dedup: &DedupStore,
) -> Result<RawEvent, DropReason> {
    if item.text.trim().is_empty() {
        return Err(DropReason::EmptyText);
    }
    let Some(asset_symbol) = detect_asset(&item.text) else {
        return Err(DropReason::NoAssetKeyword);
    };
    let Some(event_time) = item.created_at else {
        return Err(DropReason::TimestampMissing);
    };
    let event_time = event_time.trunc_subsecs(0);

    let is_quote = item.is_retweet && item.quoted_text.as_deref().is_some_and(|t| !t.trim().is_empty());
    if item.is_retweet && !is_quote {
        return Err(DropReason::RetweetWithoutQuote);
    }
    if item.author_private {
        return Err(DropReason::PrivateAccount);
    }
    if item.is_promoted {
        return Err(DropReason::Promoted);
    }
    let total_engagement = item.like_count + item.retweet_count + item.reply_count;
    if total_engagement == 0 || item.reply_count == 0 {
        return Err(DropReason::NoEngagement);
    }

    let fp = fingerprint(&["twitter", &item.text, &event_time.timestamp().to_string()]);
    if !dedup.check_and_record(entry.id, &fp) {
        return Err(DropReason::Duplicate);
    }

    let event_instant = wall_to_mono(now_wall, now_mono, event_time);
    velocity.record(&asset_symbol, event_instant, windows::TWITTER_LONG);
    let velocity_ratio = velocity.velocity(
        &asset_symbol,
        event_instant,
        windows::TWITTER_SHORT,
        windows::TWITTER_LONG,
        windows::TWITTER_DIVISOR,
    );

    let engagement_weight = ((1.0 + item.like_count as f64 + 2.0 * item.retweet_count as f64 + item.reply_count as f64).ln()).max(0.0);
    let author_weight = ((1.0 + item.follower_count as f64).ln()).max(0.0);

    Ok(RawEvent {
        id: Uuid::new_v4(),
        source_entry_id: entry.id,
        source: SourceKind::Twitter,
        source_reliability: source_reliability(SourceKind::Twitter),
        asset_symbol,
        event_time: Some(event_time),
        ingest_time: now_wall,
        text: item.text.clone(),
        engagement_weight: Some(engagement_weight),
        author_weight: Some(author_weight),
        velocity: velocity_ratio,
        manipulation_flag: false,
        fingerprint: fp,
        details: PlatformDetails::Twitter {
            is_retweet: item.is_retweet,
            is_quote,
            author_private: item.author_private,
            is_promoted: item.is_promoted,
            like_count: item.like_count,
            retweet_count: item.retweet_count,
            reply_count: item.reply_count,
            follower_count: item.follower_count,
        },
    })
}
