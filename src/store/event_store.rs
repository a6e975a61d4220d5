use sqlx::PgPool;

use crate::dqm::monitor::OverallQuality;
use crate::errors::AppError;
use crate::models::quality_event::{AnomalyStatus, QualityEvent, SourceBalanceStatus, TimeIntegrityStatus};
use crate::models::raw_event::RawEvent;
use crate::models::risk_event::{FearGreedZone, ReliabilityStatus, RiskEvent};
use crate::models::sentiment_event::{SentimentEvent, SentimentMethod};

/// Owns the three append-only tables a single accepted event's enrichment
/// writes to, plus the quality-event table the DQM appends to
/// independently. Raw/sentiment/risk rows for one event are written in a
/// single transaction per spec.md §4.6/§7's atomicity requirement: a
/// fingerprint collision, or any downstream failure, rolls the whole write
/// back rather than leaving a partial raw row with no sentiment/risk
/// counterpart.
pub struct EventStore {
    pool: PgPool,
}

impl EventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Writes raw, sentiment, and risk rows for one accepted event
    /// atomically. Returns `Ok(false)` without writing sentiment/risk when
    /// the fingerprint already exists — a silent drop, not an error.
    pub async fn insert_event(
        &self,
        raw: &RawEvent,
        sentiment: &SentimentEvent,
        risk: &RiskEvent,
    ) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let raw_result = sqlx::query!(
            r#"
            INSERT INTO raw_events
                (id, source_entry_id, source, source_reliability, asset_symbol,
                 event_time, ingest_time, text, engagement_weight, author_weight,
                 velocity, manipulation_flag, fingerprint, dropped)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, false)
            ON CONFLICT (fingerprint) DO NOTHING
            "#,
            raw.id,
            raw.source_entry_id,
            raw.source.to_string(),
            raw.source_reliability,
            raw.asset_symbol,
            raw.event_time,
            raw.ingest_time,
            raw.text,
            raw.engagement_weight,
            raw.author_weight,
            raw.velocity,
            raw.manipulation_flag,
            raw.fingerprint,
        )
        .execute(&mut *tx)
        .await?;

        if raw_result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query!(
            r#"
            INSERT INTO sentiment_events
                (id, raw_event_id, asset_symbol, source_kind, event_time,
                 bullish_count, bearish_count, fear_count, greed_count,
                 raw_score, normalized_score, rule_label, llm_used, llm_label,
                 llm_confidence, final_label, final_confidence, method)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
            sentiment.id,
            sentiment.raw_event_id,
            sentiment.asset_symbol,
            sentiment.source_kind.to_string(),
            sentiment.event_time,
            sentiment.counts.bullish as i32,
            sentiment.counts.bearish as i32,
            sentiment.counts.fear as i32,
            sentiment.counts.greed as i32,
            sentiment.raw_score,
            sentiment.normalized_score,
            sentiment.rule_label,
            sentiment.llm_used,
            sentiment.llm_label,
            sentiment.llm_confidence,
            sentiment.final_label,
            sentiment.final_confidence,
            method_str(sentiment.method),
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query!(
            r#"
            INSERT INTO risk_events
                (id, raw_event_id, asset_symbol, event_time, sentiment_label,
                 sentiment_confidence, sentiment_reliability, social_overheat,
                 panic_risk, fomo_risk, fear_greed_index, fear_greed_zone)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
            risk.id,
            risk.raw_event_id,
            risk.asset_symbol,
            risk.event_time,
            risk.sentiment_label,
            risk.sentiment_confidence,
            reliability_str(risk.sentiment_reliability),
            risk.social_overheat,
            risk.panic_risk,
            risk.fomo_risk,
            risk.fear_greed_index,
            zone_str(risk.fear_greed_zone),
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Appends one Data Quality Monitor snapshot. Independent of the
    /// per-event transaction above: the DQM runs on its own cadence and
    /// writes unconditionally, never rolled back by an enrichment failure.
    pub async fn insert_quality(&self, event: &QualityEvent) -> Result<(), AppError> {
        let per_source = serde_json::to_value(&event.per_source)
            .map_err(|e| AppError::Validation(format!("failed to serialize per-source quality: {e}")))?;

        sqlx::query!(
            r#"
            INSERT INTO quality_events
                (id, per_source, time_integrity, source_balance, anomaly_frequency, overall, computed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
            uuid::Uuid::new_v4(),
            per_source,
            time_integrity_str(event.time_integrity),
            source_balance_str(event.source_balance),
            anomaly_str(event.anomaly_frequency),
            overall_str(event.overall),
            event.computed_at,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persists an event the Time-Sync Guard rejected, `dropped = true` from
    /// the start. Never joined by a sentiment/risk row — `query_raw`'s
    /// `include_dropped` flag is the only way these rows are ever read back.
    pub async fn insert_dropped_raw(&self, raw: &RawEvent) -> Result<(), AppError> {
        sqlx::query!(
            r#"
            INSERT INTO raw_events
                (id, source_entry_id, source, source_reliability, asset_symbol,
                 event_time, ingest_time, text, engagement_weight, author_weight,
                 velocity, manipulation_flag, fingerprint, dropped)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, true)
            ON CONFLICT (fingerprint) DO NOTHING
            "#,
            raw.id,
            raw.source_entry_id,
            raw.source.to_string(),
            raw.source_reliability,
            raw.asset_symbol,
            raw.event_time,
            raw.ingest_time,
            raw.text,
            raw.engagement_weight,
            raw.author_weight,
            raw.velocity,
            raw.manipulation_flag,
            raw.fingerprint,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Marks a raw event `dropped = true` in place, per spec.md §7's
    /// handling of an internal invariant violation that cannot be rolled
    /// back cleanly (used only when a caller observes a partial write it
    /// cannot undo through the normal transaction path).
    pub async fn mark_dropped(&self, raw_event_id: uuid::Uuid) -> Result<(), AppError> {
        sqlx::query!(
            r#"UPDATE raw_events SET dropped = true WHERE id = $1"#,
            raw_event_id,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn method_str(method: SentimentMethod) -> &'static str {
    match method {
        SentimentMethod::Rule => "rule",
        SentimentMethod::LlmFallback => "llm_fallback",
    }
}

fn reliability_str(status: ReliabilityStatus) -> &'static str {
    match status {
        ReliabilityStatus::Low => "low",
        ReliabilityStatus::Normal => "normal",
    }
}

fn zone_str(zone: FearGreedZone) -> &'static str {
    match zone {
        FearGreedZone::ExtremeFear => "extreme_fear",
        FearGreedZone::Normal => "normal",
        FearGreedZone::ExtremeGreed => "extreme_greed",
        FearGreedZone::Unknown => "unknown",
    }
}

fn time_integrity_str(status: TimeIntegrityStatus) -> &'static str {
    match status {
        TimeIntegrityStatus::Stable => "stable",
        TimeIntegrityStatus::Unstable => "unstable",
        TimeIntegrityStatus::Critical => "critical",
    }
}

fn source_balance_str(status: SourceBalanceStatus) -> &'static str {
    match status {
        SourceBalanceStatus::Balanced => "balanced",
        SourceBalanceStatus::Imbalanced => "imbalanced",
    }
}

fn anomaly_str(status: AnomalyStatus) -> &'static str {
    match status {
        AnomalyStatus::Normal => "normal",
        AnomalyStatus::Persistent => "persistent",
    }
}

fn overall_str(overall: OverallQuality) -> &'static str {
    match overall {
        OverallQuality::Healthy => "healthy",
        OverallQuality::Degraded => "degraded",
        OverallQuality::Critical => "critical",
    }
}
