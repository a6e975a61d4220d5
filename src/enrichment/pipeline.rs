//! Fixed-order stage orchestration for a single accepted raw event: raw
//! insert → sentiment → risk, written atomically by `EventStore::insert_event`
//! per spec.md §4.6's "all three rows or none" requirement. Runs after the
//! Time-Sync Guard has already accepted the event; this stage never reasons
//! about timestamps.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use uuid::Uuid;

use crate::enrichment::llm::SentimentClassifier;
use crate::enrichment::risk::{compute_risk_indicators, RiskInput};
use crate::enrichment::sentiment::{assign_label, calculate_raw_score, count_matches, normalize_score, preprocess_text, total_matches};
use crate::models::raw_event::RawEvent;
use crate::models::risk_event::RiskEvent;
use crate::models::sentiment_event::{SentimentEvent, SentimentMethod};
use crate::store::event_store::EventStore;

#[derive(Default)]
pub struct StageCounters {
    pub inserted: AtomicU64,
    pub duplicate: AtomicU64,
    pub write_errors: AtomicU64,
}

pub struct EnrichmentPipeline<'a> {
    store: &'a EventStore,
    classifier: &'a dyn SentimentClassifier,
    counters: &'a StageCounters,
}

impl<'a> EnrichmentPipeline<'a> {
    pub fn new(store: &'a EventStore, classifier: &'a dyn SentimentClassifier, counters: &'a StageCounters) -> Self {
        Self {
            store,
            classifier,
            counters,
        }
    }

    /// Runs the full per-event pipeline for one Time-Sync Guard-approved
    /// event. `fear_greed_index` is the externally-supplied reading for this
    /// cycle (`None` if the feed is unavailable); everything else needed by
    /// the risk stage already lives on `event` (`velocity`,
    /// `manipulation_flag`) courtesy of the worker that produced it.
    ///
    /// Returns the computed risk event regardless of write outcome — the
    /// Data-Quality Monitor's anomaly tracking and the Alerter's trigger
    /// evaluation both need it even on a fingerprint-collision drop, since
    /// the event still "reached the risk stage" per spec.md §4.7.
    pub async fn process(&self, event: &RawEvent, fear_greed_index: Option<i32>) -> RiskEvent {
        let sentiment = run_sentiment_stage(event, self.classifier).await;
        let risk = run_risk_stage(event, &sentiment, fear_greed_index);

        match self.store.insert_event(event, &sentiment, &risk).await {
            Ok(true) => {
                self.counters.inserted.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => {
                self.counters.duplicate.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(event_id = %event.id, "fingerprint collision, silently dropped");
            }
            Err(e) => {
                self.counters.write_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %e, event_id = %event.id, "enrichment write failed");
            }
        }
        risk
    }
}

/// Scores the rule lexicon/regex first; only consults the LLM fallback when
/// the rule produced zero matches (spec.md §4.5's contract: the pipeline
/// behaves identically with or without the fallback except for the
/// zero-match case). The rule label is authoritative whenever it has any
/// match at all, even a weak one. Free function so it's testable without
/// wiring up a store.
async fn run_sentiment_stage(event: &RawEvent, classifier: &dyn SentimentClassifier) -> SentimentEvent {
    let cleaned = preprocess_text(&event.text);
    let (counts, uncategorized) = count_matches(&cleaned);
    let matches = total_matches(&counts, uncategorized);
    let raw_score = calculate_raw_score(&counts);
    let normalized_score = normalize_score(raw_score, matches);
    let rule_label = assign_label(normalized_score);

    let (method, llm_used, llm_label, llm_confidence, final_label, final_confidence) = if matches > 0 {
        (SentimentMethod::Rule, false, None, None, rule_label, normalized_score.abs())
    } else {
        match classifier.classify(&cleaned).await {
            Ok(verdict) => (
                SentimentMethod::LlmFallback,
                true,
                Some(verdict.label),
                Some(verdict.confidence),
                verdict.label,
                verdict.confidence,
            ),
            Err(_) => (SentimentMethod::Rule, false, None, None, rule_label, 0.0),
        }
    };

    SentimentEvent {
        id: Uuid::new_v4(),
        raw_event_id: event.id,
        asset_symbol: event.asset_symbol.clone(),
        source_kind: event.source,
        event_time: event.event_time.unwrap_or(event.ingest_time),
        counts,
        raw_score,
        normalized_score,
        rule_label,
        llm_used,
        llm_label,
        llm_confidence,
        final_label,
        final_confidence,
        method,
    }
}

fn run_risk_stage(event: &RawEvent, sentiment: &SentimentEvent, fear_greed_index: Option<i32>) -> RiskEvent {
    let input = RiskInput {
        sentiment_label: sentiment.final_label,
        sentiment_confidence: sentiment.final_confidence,
        mention_velocity: event.velocity,
        manipulation_flag: event.manipulation_flag,
        fear_greed_index,
    };
    let output = compute_risk_indicators(&input);

    RiskEvent {
        id: Uuid::new_v4(),
        raw_event_id: event.id,
        asset_symbol: event.asset_symbol.clone(),
        event_time: event.event_time.unwrap_or(Utc::now()),
        sentiment_label: sentiment.final_label,
        sentiment_confidence: sentiment.final_confidence,
        sentiment_reliability: output.sentiment_reliability,
        social_overheat: output.social_overheat,
        panic_risk: output.panic_risk,
        fomo_risk: output.fomo_risk,
        fear_greed_index,
        fear_greed_zone: output.fear_greed_zone,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::llm::NullClassifier;
    use crate::models::raw_event::PlatformDetails;
    use crate::models::source_entry::SourceKind;

    fn sample_event(text: &str) -> RawEvent {
        RawEvent {
            id: Uuid::new_v4(),
            source_entry_id: 1,
            source: SourceKind::Twitter,
            source_reliability: 0.5,
            asset_symbol: "BTC".to_string(),
            event_time: Some(Utc::now()),
            ingest_time: Utc::now(),
            text: text.to_string(),
            engagement_weight: Some(1.0),
            author_weight: Some(1.0),
            velocity: 1.0,
            manipulation_flag: false,
            fingerprint: "fp".to_string(),
            details: PlatformDetails::Twitter {
                is_retweet: false,
                is_quote: false,
                author_private: false,
                is_promoted: false,
                like_count: 1,
                retweet_count: 0,
                reply_count: 1,
                follower_count: 10,
            },
        }
    }

    #[tokio::test]
    async fn rule_match_is_authoritative_even_without_llm() {
        let classifier = NullClassifier;
        let event = sample_event("$BTC moon breakout incoming");
        let sentiment = run_sentiment_stage(&event, &classifier).await;
        assert_eq!(sentiment.method, SentimentMethod::Rule);
        assert!(!sentiment.llm_used);
        assert_eq!(sentiment.final_label, sentiment.rule_label);
    }

    #[tokio::test]
    async fn zero_match_text_falls_back_to_llm_and_reports_disabled_as_zero_confidence() {
        let classifier = NullClassifier;
        let event = sample_event("the market opened today");
        let sentiment = run_sentiment_stage(&event, &classifier).await;
        assert_eq!(sentiment.method, SentimentMethod::Rule);
        assert!(!sentiment.llm_used);
        assert_eq!(sentiment.final_confidence, 0.0);
    }

    #[tokio::test]
    async fn risk_stage_reads_velocity_and_manipulation_flag_off_the_raw_event() {
        let mut event = sample_event("panic everywhere, total collapse");
        event.velocity = 3.0;
        event.manipulation_flag = true;
        let classifier = NullClassifier;
        let sentiment = run_sentiment_stage(&event, &classifier).await;
        let risk = run_risk_stage(&event, &sentiment, None);
        assert!(risk.social_overheat);
    }
}
