use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::source_entry::SourceKind;

/// Platform-specific fields needed by a worker's own drop-reason checks
/// before the event ever reaches the Time-Sync Guard. Each worker only
/// populates its own variant; none of this is persisted on the Raw Event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PlatformDetails {
    Twitter {
        is_retweet: bool,
        is_quote: bool,
        author_private: bool,
        is_promoted: bool,
        like_count: u64,
        retweet_count: u64,
        reply_count: u64,
        follower_count: u64,
    },
    Reddit {
        author_deleted: bool,
        score: i64,
        num_comments: u64,
        author_karma: u64,
    },
    Telegram {
        body_deleted: bool,
        forwarded_from_known_source: bool,
        forwarded: bool,
        bot_authored: bool,
        chat_id: i64,
    },
}

pub fn source_reliability(kind: SourceKind) -> f64 {
    match kind {
        SourceKind::Twitter => 0.5,
        SourceKind::Reddit => 0.7,
        SourceKind::Telegram => 0.3,
    }
}

/// A single unit of upstream content after platform-specific normalization,
/// field validation, and metric computation, but before the Time-Sync Guard
/// runs. Produced by the ingestion workers; never mutated once constructed.
/// Field shape mirrors the Raw Event of spec.md §3 exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: Uuid,
    pub source_entry_id: i64,
    pub source: SourceKind,
    pub source_reliability: f64,
    pub asset_symbol: String,
    /// Timestamp claimed by the upstream platform, truncated to second
    /// precision. The Time-Sync Guard reasons about this value; nothing
    /// upstream of the guard alters it once parsed.
    pub event_time: Option<DateTime<Utc>>,
    pub ingest_time: DateTime<Utc>,
    pub text: String,
    /// Null for Telegram, per spec.md §3's invariant.
    pub engagement_weight: Option<f64>,
    pub author_weight: Option<f64>,
    pub velocity: f64,
    pub manipulation_flag: bool,
    /// Computed from source + text + truncated event_time; unique across all
    /// raw events within its source's dedup TTL.
    pub fingerprint: String,
    pub details: PlatformDetails,
}

impl RawEvent {
    pub fn source_kind(&self) -> SourceKind {
        self.source
    }
}
