use std::time::Instant;

use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

use crate::errors::DropReason;
use crate::external::telegram_client::{TelegramClient, TelegramItem};
use crate::ingestion::failure_cache::{FailureCache, FailureType};
use crate::ingestion::fingerprint::fingerprint;
use crate::ingestion::manipulation::ManipulationDetector;
use crate::ingestion::velocity::{windows, VelocityTracker};
use crate::ingestion::{dedup_store::DedupStore, jittered_pace, wall_to_mono, CycleMetrics};
use crate::models::raw_event::{source_reliability, PlatformDetails, RawEvent};
use crate::models::source_entry::{SourceEntry, SourceKind};
use crate::ratelimit::RateLimiter;
use crate::registries::asset_registry::AssetRegistry;
use crate::registries::source_registry::SourceRegistry;

const DEFAULT_PER_CHAT_CAP: u32 = 30;
const GLOBAL_CAP: u32 = 100;
const DEDUP_TTL: std::time::Duration = std::time::Duration::from_secs(10 * 60);
const FETCH_PACE: std::time::Duration = std::time::Duration::from_millis(300);

/// Runs the Telegram ingestion cycle: poll every whitelisted channel or
/// group, apply the filter chain, run manipulation detection, compute
/// metrics, and hand back accepted events in ascending event-time order.
pub struct TelegramWorker {
    source_registry: std::sync::Arc<SourceRegistry>,
    asset_registry: std::sync::Arc<AssetRegistry>,
    client: std::sync::Arc<dyn TelegramClient>,
    rate_limiter: RateLimiter,
    velocity: VelocityTracker,
    dedup: DedupStore,
    manipulation: ManipulationDetector,
    failures: FailureCache,
}

impl TelegramWorker {
    pub fn new(
        source_registry: std::sync::Arc<SourceRegistry>,
        asset_registry: std::sync::Arc<AssetRegistry>,
        client: std::sync::Arc<dyn TelegramClient>,
    ) -> Self {
        Self {
            source_registry,
            asset_registry,
            client,
            rate_limiter: RateLimiter::new(GLOBAL_CAP, DEFAULT_PER_CHAT_CAP),
            velocity: VelocityTracker::new(),
            dedup: DedupStore::new(DEDUP_TTL),
            manipulation: ManipulationDetector::new(),
            failures: FailureCache::new(),
        }
    }

    pub async fn run_cycle(&self, now_wall: DateTime<Utc>, now_mono: Instant) -> (Vec<RawEvent>, CycleMetrics) {
        let mut metrics = CycleMetrics::default();
        let mut accepted = Vec::new();

        let mut sources = self.source_registry.enabled_sources(SourceKind::Telegram).into_iter().peekable();
        while let Some(entry) = sources.next() {
            let chat_id: i64 = match entry.handle.parse() {
                Ok(id) => id,
                Err(_) => continue,
            };
            if self.failures.is_failed(&entry.handle) {
                continue;
            }
            let cap = if entry.per_run_cap > 0 {
                entry.per_run_cap as u32
            } else {
                DEFAULT_PER_CHAT_CAP
            };
            let items = match self.client.fetch_recent(chat_id, cap).await {
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
                match filter_and_build(
                    &entry,
                    &detect,
                    &item,
                    now_wall,
                    now_mono,
                    &self.velocity,
                    &self.dedup,
                    &self.manipulation,
                ) {
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
    item: &TelegramItem,
    now_wall: DateTime<Utc>,
    now_mono: Instant,
    velocity: &VelocityTracker,
    dedup: &DedupStore,
    manipulation: &ManipulationDetector,
) -> Result<RawEvent, DropReason> {
    if item.text.trim().is_empty() {
        return Err(DropReason::EmptyText);
    }
    let Some(asset_symbol) = detect_asset(&item.text) else {
        return Err(DropReason::NoAssetKeyword);
    };
    let Some(event_time) = item.date else {
        return Err(DropReason::TimestampMissing);
    };
    let event_time = event_time.trunc_subsecs(0);

    if item.forwarded && !item.forward_source_known {
        return Err(DropReason::ForwardedUnknownSource);
    }
    if item.bot_authored {
        return Err(DropReason::BotAuthored);
    }

    let fp = fingerprint(&["telegram", &item.text, &event_time.timestamp().to_string()]);
    if !dedup.check_and_record(entry.id, &fp) {
        return Err(DropReason::Duplicate);
    }

    let distinct_chats = manipulation.record_and_check(&item.text, item.chat_id, now_mono);
    let manipulation_flag = manipulation.is_manipulation(distinct_chats);

    let event_instant = wall_to_mono(now_wall, now_mono, event_time);
    velocity.record(&asset_symbol, event_instant, windows::TELEGRAM_LONG);
    let velocity_ratio = velocity.velocity(
        &asset_symbol,
        event_instant,
        windows::TELEGRAM_SHORT,
        windows::TELEGRAM_LONG,
        windows::TELEGRAM_DIVISOR,
    );

    Ok(RawEvent {
        id: Uuid::new_v4(),
        source_entry_id: entry.id,
        source: SourceKind::Telegram,
        source_reliability: source_reliability(SourceKind::Telegram),
        asset_symbol,
        event_time: Some(event_time),
        ingest_time: now_wall,
        text: item.text.clone(),
        engagement_weight: None,
        author_weight: None,
        velocity: velocity_ratio,
        manipulation_flag,
        fingerprint: fp,
        details: PlatformDetails::Telegram {
            body_deleted: false,
            forwarded_from_known_source: item.forward_source_known,
            forwarded: item.forwarded,
            bot_authored: item.bot_authored,
            chat_id: item.chat_id,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::source_entry::{EntryKind, SourceRole};

    fn entry() -> SourceEntry {
        SourceEntry {
            id: 3,
            kind: EntryKind::Group,
            handle: "-1001234567890".to_string(),
            asset_symbol: "BTC".to_string(),
            role: SourceRole::Discussion,
            enabled: true,
            per_run_cap: 30,
            priority: 1,
        }
    }

    fn item() -> TelegramItem {
        TelegramItem {
            message_id: 1,
            chat_id: -1001234567890,
            text: "BTC holding support nicely".to_string(),
            date: Some(Utc::now()),
            forwarded: false,
            forward_source_known: false,
            bot_authored: false,
        }
    }

    fn detect_btc(text: &str) -> Option<String> {
        if text.to_lowercase().split(|c: char| !c.is_alphanumeric()).any(|w| w == "btc") {
            Some("BTC".to_string())
        } else {
            None
        }
    }

    fn harness() -> (VelocityTracker, DedupStore, ManipulationDetector) {
        (VelocityTracker::new(), DedupStore::new(DEDUP_TTL), ManipulationDetector::new())
    }

    #[test]
    fn whitespace_only_text_is_dropped() {
        let (velocity, dedup, manip) = harness();
        let mut i = item();
        i.text = "   \t  ".to_string();
        let now = Utc::now();
        let result = filter_and_build(&entry(), &detect_btc, &i, now, Instant::now(), &velocity, &dedup, &manip);
        assert!(matches!(result, Err(DropReason::EmptyText)));
    }

    #[test]
    fn forwarded_without_known_source_is_dropped() {
        let (velocity, dedup, manip) = harness();
        let mut i = item();
        i.forwarded = true;
        i.forward_source_known = false;
        let now = Utc::now();
        let result = filter_and_build(&entry(), &detect_btc, &i, now, Instant::now(), &velocity, &dedup, &manip);
        assert!(matches!(result, Err(DropReason::ForwardedUnknownSource)));
    }

    #[test]
    fn forwarded_with_known_source_is_accepted() {
        let (velocity, dedup, manip) = harness();
        let mut i = item();
        i.forwarded = true;
        i.forward_source_known = true;
        let now = Utc::now();
        let result = filter_and_build(&entry(), &detect_btc, &i, now, Instant::now(), &velocity, &dedup, &manip);
        assert!(result.is_ok());
    }

    #[test]
    fn bot_authored_is_dropped() {
        let (velocity, dedup, manip) = harness();
        let mut i = item();
        i.bot_authored = true;
        let now = Utc::now();
        let result = filter_and_build(&entry(), &detect_btc, &i, now, Instant::now(), &velocity, &dedup, &manip);
        assert!(matches!(result, Err(DropReason::BotAuthored)));
    }

    #[test]
    fn accepted_event_has_no_engagement_or_author_weight() {
        let (velocity, dedup, manip) = harness();
        let i = item();
        let now = Utc::now();
        let event = filter_and_build(&entry(), &detect_btc, &i, now, Instant::now(), &velocity, &dedup, &manip).unwrap();
        assert_eq!(event.source, SourceKind::Telegram);
        assert_eq!(event.source_reliability, 0.3);
        assert!(event.engagement_weight.is_none());
        assert!(event.author_weight.is_none());
    }

    #[test]
    fn same_content_across_three_chats_flags_manipulation() {
        // Each whitelisted chat is its own source entry in practice, so
        // fingerprint dedup (keyed per entry) never hides the cross-chat
        // repetition manipulation detection is meant to catch.
        let (velocity, dedup, manip) = harness();
        let now_mono = Instant::now();
        let now = Utc::now();

        let mut e1 = entry();
        e1.id = 10;
        let mut i1 = item();
        i1.chat_id = 1;
        filter_and_build(&e1, &detect_btc, &i1, now, now_mono, &velocity, &dedup, &manip).unwrap();

        let mut e2 = entry();
        e2.id = 11;
        let mut i2 = item();
        i2.chat_id = 2;
        filter_and_build(&e2, &detect_btc, &i2, now, now_mono, &velocity, &dedup, &manip).unwrap();

        let mut e3 = entry();
        e3.id = 12;
        let mut i3 = item();
        i3.chat_id = 3;
        let event = filter_and_build(&e3, &detect_btc, &i3, now, now_mono, &velocity, &dedup, &manip).unwrap();
        assert!(event.manipulation_flag);
    }
}
