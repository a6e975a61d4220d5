//! Read-side queries (spec.md §6). Pure reads: nothing here writes. These
//! are the in-process equivalent of the excluded external serving layer —
//! the HTTP surface that would call them is an explicit Non-goal, but the
//! query shape and aggregation rules are implemented in full so a serving
//! layer could be bolted on without touching this module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::dqm::monitor::OverallQuality;
use crate::errors::AppError;
use crate::models::quality_event::{AnomalyStatus, AvailabilityStatus, SourceBalanceStatus, TimeIntegrityStatus, VolumeStatus};
use crate::models::raw_event::{PlatformDetails, RawEvent};
use crate::models::risk_event::FearGreedZone;
use crate::models::sentiment_event::Label;
use crate::models::source_entry::SourceKind;

const MIN_WINDOW_SECS: i64 = 30;
const MAX_WINDOW_SECS: i64 = 300;

/// Ascending-event-time raw events for one asset, optionally scoped to a
/// single source, with dropped (guard-rejected) rows included only on
/// request. `dropped` rows never carry sentiment/risk rows, so callers that
/// include them are responsible for treating them as context, not signal.
pub async fn query_raw(
    pool: &PgPool,
    asset_symbol: &str,
    t_from: DateTime<Utc>,
    t_to: DateTime<Utc>,
    source: Option<SourceKind>,
    include_dropped: bool,
) -> Result<Vec<RawEvent>, AppError> {
    let source_filter = source.map(|s| s.to_string());
    let rows = sqlx::query!(
        r#"
        SELECT id, source_entry_id, source, source_reliability, asset_symbol,
               event_time, ingest_time, text, engagement_weight, author_weight,
               velocity, manipulation_flag, fingerprint, dropped
        FROM raw_events
        WHERE asset_symbol = $1
          AND event_time >= $2 AND event_time <= $3
          AND ($4::text IS NULL OR source = $4)
          AND (dropped = false OR $5 = true)
        ORDER BY event_time ASC NULLS LAST
        "#,
        asset_symbol,
        t_from,
        t_to,
        source_filter,
        include_dropped,
    )
    .fetch_all(pool)
    .await?;

    let mut events = Vec::with_capacity(rows.len());
    for r in rows {
        let source = parse_source_kind(&r.source)?;
        events.push(RawEvent {
            id: r.id,
            source_entry_id: r.source_entry_id,
            source,
            source_reliability: r.source_reliability,
            asset_symbol: r.asset_symbol,
            event_time: r.event_time,
            ingest_time: r.ingest_time,
            text: r.text,
            engagement_weight: r.engagement_weight,
            author_weight: r.author_weight,
            velocity: r.velocity,
            manipulation_flag: r.manipulation_flag,
            fingerprint: r.fingerprint,
            // Platform-specific detail fields are not persisted past the
            // worker's own filter chain; the read interface only needs the
            // normalized fields above.
            details: placeholder_details(source),
        });
    }
    Ok(events)
}

fn placeholder_details(source: SourceKind) -> PlatformDetails {
    match source {
        SourceKind::Twitter => PlatformDetails::Twitter {
            is_retweet: false,
            is_quote: false,
            author_private: false,
            is_promoted: false,
            like_count: 0,
            retweet_count: 0,
            reply_count: 0,
            follower_count: 0,
        },
        SourceKind::Reddit => PlatformDetails::Reddit {
            author_deleted: false,
            score: 0,
            num_comments: 0,
            author_karma: 0,
        },
        SourceKind::Telegram => PlatformDetails::Telegram {
            body_deleted: false,
            forwarded_from_known_source: false,
            forwarded: false,
            bot_authored: false,
            chat_id: 0,
        },
    }
}

fn parse_source_kind(s: &str) -> Result<SourceKind, AppError> {
    match s {
        "twitter" => Ok(SourceKind::Twitter),
        "reddit" => Ok(SourceKind::Reddit),
        "telegram" => Ok(SourceKind::Telegram),
        other => Err(AppError::Db(sqlx::Error::Decode(format!("unknown source in raw_events: {other}").into()))),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedSentiment {
    pub label: Label,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedRiskIndicators {
    pub social_overheat: bool,
    pub panic_risk: bool,
    pub fomo_risk: bool,
    pub fear_greed_index: Option<i32>,
    pub fear_greed_zone: FearGreedZone,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedDataQuality {
    pub availability: AvailabilityStatus,
    pub time_integrity: TimeIntegrityStatus,
    pub volume: VolumeStatus,
    pub source_balance: SourceBalanceStatus,
    pub anomaly_frequency: AnomalyStatus,
    pub overall: OverallQuality,
}

/// The aggregated object spec.md §6 hands to the (excluded) external
/// serving layer: `{sentiment, risk_indicators, data_quality, record_count,
/// window}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetContext {
    pub asset_symbol: String,
    pub sentiment: AggregatedSentiment,
    pub risk_indicators: AggregatedRiskIndicators,
    pub data_quality: AggregatedDataQuality,
    pub record_count: i64,
    pub window: (DateTime<Utc>, DateTime<Utc>),
}

pub fn validate_context_query(sources: &[SourceKind], t_since: DateTime<Utc>, t_until: DateTime<Utc>) -> Result<(), AppError> {
    if t_since >= t_until {
        return Err(AppError::Validation("t_since must be before t_until".to_string()));
    }
    let window_secs = (t_until - t_since).num_seconds();
    if !(MIN_WINDOW_SECS..=MAX_WINDOW_SECS).contains(&window_secs) {
        return Err(AppError::Validation(format!(
            "window must be between {MIN_WINDOW_SECS}s and {MAX_WINDOW_SECS}s, got {window_secs}s"
        )));
    }
    if sources.is_empty() {
        return Err(AppError::Validation("sources must be non-empty".to_string()));
    }
    Ok(())
}

pub async fn query_context(
    pool: &PgPool,
    asset_symbol: &str,
    sources: &[SourceKind],
    t_since: DateTime<Utc>,
    t_until: DateTime<Utc>,
) -> Result<AssetContext, AppError> {
    validate_context_query(sources, t_since, t_until)?;
    let source_strings: Vec<String> = sources.iter().map(|s| s.to_string()).collect();

    let rows = sqlx::query!(
        r#"
        SELECT r.source_reliability, s.final_label AS "final_label!", s.final_confidence AS "final_confidence!",
               k.social_overheat AS "social_overheat!", k.panic_risk AS "panic_risk!", k.fomo_risk AS "fomo_risk!",
               k.fear_greed_index, k.fear_greed_zone AS "fear_greed_zone!", r.event_time
        FROM raw_events r
        JOIN sentiment_events s ON s.raw_event_id = r.id
        JOIN risk_events k ON k.raw_event_id = r.id
        WHERE r.asset_symbol = $1
          AND r.source = ANY($2)
          AND r.event_time >= $3 AND r.event_time <= $4
          AND r.dropped = false
        ORDER BY r.event_time ASC
        "#,
        asset_symbol,
        &source_strings,
        t_since,
        t_until,
    )
    .fetch_all(pool)
    .await?;

    let record_count = rows.len() as i64;

    let sentiment = aggregate_sentiment(&rows.iter().map(|r| (r.final_label, r.final_confidence, r.source_reliability)).collect::<Vec<_>>());

    let social_overheat = rows.iter().any(|r| r.social_overheat);
    let panic_risk = rows.iter().any(|r| r.panic_risk);
    let fomo_risk = rows.iter().any(|r| r.fomo_risk);
    let (fear_greed_index, fear_greed_zone) = rows
        .last()
        .map(|r| (r.fear_greed_index, parse_zone(&r.fear_greed_zone)))
        .unwrap_or((None, FearGreedZone::Unknown));

    let quality_rows = sqlx::query!(
        r#"
        SELECT per_source, time_integrity, source_balance, anomaly_frequency, overall
        FROM quality_events
        WHERE computed_at >= $1 AND computed_at <= $2
        ORDER BY computed_at ASC
        "#,
        t_since,
        t_until,
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|r| QualityRow {
        per_source: r.per_source,
        time_integrity: r.time_integrity,
        source_balance: r.source_balance,
        anomaly_frequency: r.anomaly_frequency,
        overall: r.overall,
    })
    .collect::<Vec<_>>();

    let data_quality = aggregate_data_quality(&quality_rows);

    Ok(AssetContext {
        asset_symbol: asset_symbol.to_string(),
        sentiment,
        risk_indicators: AggregatedRiskIndicators {
            social_overheat,
            panic_risk,
            fomo_risk,
            fear_greed_index,
            fear_greed_zone,
        },
        data_quality,
        record_count,
        window: (t_since, t_until),
    })
}

/// Source-reliability-weighted majority label: each record's label votes
/// with weight equal to its source's reliability score; ties favor the
/// neutral label `0` as the conservative default.
fn aggregate_sentiment(records: &[(Label, f64, f64)]) -> AggregatedSentiment {
    if records.is_empty() {
        return AggregatedSentiment { label: 0, confidence: 0.0 };
    }
    let mut weight_by_label: std::collections::HashMap<Label, f64> = std::collections::HashMap::new();
    let mut confidence_sum = 0.0;
    for (label, confidence, reliability) in records {
        *weight_by_label.entry(*label).or_insert(0.0) += reliability;
        confidence_sum += confidence;
    }
    let weight_of = |l: &Label| *weight_by_label.get(l).unwrap_or(&0.0);
    let max_weight = [1, 0, -1].into_iter().map(|l| weight_of(&l)).fold(f64::MIN, f64::max);
    let leaders: Vec<Label> = [1, 0, -1].into_iter().filter(|l| weight_of(l) == max_weight).collect();
    let label = if leaders.len() > 1 { 0 } else { leaders[0] };
    AggregatedSentiment {
        label,
        confidence: confidence_sum / records.len() as f64,
    }
}

fn parse_zone(s: &str) -> FearGreedZone {
    match s {
        "extreme_fear" => FearGreedZone::ExtremeFear,
        "extreme_greed" => FearGreedZone::ExtremeGreed,
        "normal" => FearGreedZone::Normal,
        _ => FearGreedZone::Unknown,
    }
}

struct QualityRow {
    per_source: serde_json::Value,
    time_integrity: String,
    source_balance: String,
    anomaly_frequency: String,
    overall: String,
}

fn aggregate_data_quality(rows: &[QualityRow]) -> AggregatedDataQuality {
    if rows.is_empty() {
        return AggregatedDataQuality {
            availability: AvailabilityStatus::Down,
            time_integrity: TimeIntegrityStatus::Critical,
            volume: VolumeStatus::Low,
            source_balance: SourceBalanceStatus::Imbalanced,
            anomaly_frequency: AnomalyStatus::Persistent,
            overall: OverallQuality::Critical,
        };
    }

    let mut worst_availability = AvailabilityStatus::Up;
    let mut worst_volume = VolumeStatus::Normal;
    let mut worst_time_integrity = TimeIntegrityStatus::Stable;
    let mut worst_source_balance = SourceBalanceStatus::Balanced;
    let mut worst_anomaly = AnomalyStatus::Normal;
    let mut worst_overall = OverallQuality::Healthy;

    for row in rows {
        worst_time_integrity = worst_time_integrity.max(parse_time_integrity(&row.time_integrity));
        worst_source_balance = worst_source_balance.max(parse_source_balance(&row.source_balance));
        worst_anomaly = worst_anomaly.max(parse_anomaly(&row.anomaly_frequency));
        worst_overall = worst_overall.max(parse_overall(&row.overall));

        if let Ok(entries) = serde_json::from_value::<Vec<crate::models::quality_event::SourceQuality>>(row.per_source.clone()) {
            for entry in entries {
                worst_availability = worst_availability.max(entry.availability);
                worst_volume = worst_volume.max(entry.volume);
            }
        }
    }

    AggregatedDataQuality {
        availability: worst_availability,
        time_integrity: worst_time_integrity,
        volume: worst_volume,
        source_balance: worst_source_balance,
        anomaly_frequency: worst_anomaly,
        overall: worst_overall,
    }
}

fn parse_time_integrity(s: &str) -> TimeIntegrityStatus {
    match s {
        "unstable" => TimeIntegrityStatus::Unstable,
        "critical" => TimeIntegrityStatus::Critical,
        _ => TimeIntegrityStatus::Stable,
    }
}

fn parse_source_balance(s: &str) -> SourceBalanceStatus {
    match s {
        "imbalanced" => SourceBalanceStatus::Imbalanced,
        _ => SourceBalanceStatus::Balanced,
    }
}

fn parse_anomaly(s: &str) -> AnomalyStatus {
    match s {
        "persistent" => AnomalyStatus::Persistent,
        _ => AnomalyStatus::Normal,
    }
}

fn parse_overall(s: &str) -> OverallQuality {
    match s {
        "degraded" => OverallQuality::Degraded,
        "critical" => OverallQuality::Critical,
        _ => OverallQuality::Healthy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_inverted_window() {
        let now = Utc::now();
        let result = validate_context_query(&[SourceKind::Twitter], now, now - chrono::Duration::seconds(60));
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_window_outside_bounds() {
        let now = Utc::now();
        assert!(validate_context_query(&[SourceKind::Twitter], now, now + chrono::Duration::seconds(10)).is_err());
        assert!(validate_context_query(&[SourceKind::Twitter], now, now + chrono::Duration::seconds(301)).is_err());
        assert!(validate_context_query(&[SourceKind::Twitter], now, now + chrono::Duration::seconds(60)).is_ok());
    }

    #[test]
    fn validate_rejects_empty_sources() {
        let now = Utc::now();
        assert!(validate_context_query(&[], now, now + chrono::Duration::seconds(60)).is_err());
    }

    #[test]
    fn reliability_weighted_majority_favors_higher_weight_label() {
        let records = vec![(1, 0.8, 0.7), (1, 0.6, 0.7), (-1, 0.9, 0.3)];
        let result = aggregate_sentiment(&records);
        assert_eq!(result.label, 1);
    }

    #[test]
    fn empty_record_set_defaults_to_neutral() {
        let result = aggregate_sentiment(&[]);
        assert_eq!(result.label, 0);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn tied_bullish_and_bearish_weight_falls_back_to_neutral() {
        let records = vec![(1, 0.8, 0.5), (-1, 0.6, 0.5)];
        let result = aggregate_sentiment(&records);
        assert_eq!(result.label, 0);
    }
}
