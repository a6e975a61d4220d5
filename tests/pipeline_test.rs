//! Full per-event pipeline, exercised end to end with no live database or
//! network: Time-Sync Guard -> sentiment stage -> risk stage -> Data Quality
//! Monitor -> Alerter, using the same pure/free-function APIs the unit tests
//! in each module already cover individually. What this file adds is the
//! chaining across module boundaries that a unit test can't see.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};

use social_context_pipeline::alerter::Alerter;
use social_context_pipeline::dqm::monitor::{DataQualityMonitor, OverallQuality};
use social_context_pipeline::enrichment::risk::{compute_risk_indicators, RiskInput};
use social_context_pipeline::enrichment::sentiment::{
    assign_label, calculate_raw_score, count_matches, normalize_score, preprocess_text, total_matches,
};
use social_context_pipeline::errors::DropReason;
use social_context_pipeline::external::alert_transport::{AlertTransport, TransportError};
use social_context_pipeline::guard::{DuplicateTracker, EventTracker, GuardMetrics, TimeSyncGuard};
use social_context_pipeline::models::risk_event::ReliabilityStatus;
use social_context_pipeline::models::source_entry::SourceKind;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};

/// Collects every message it was asked to send rather than talking to any
/// real endpoint, so a test can assert on exactly what the Alerter decided
/// to dispatch.
struct RecordingTransport {
    sent: parking_lot::Mutex<Vec<String>>,
    calls: AtomicU32,
}

impl RecordingTransport {
    fn new() -> Self {
        Self {
            sent: parking_lot::Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl AlertTransport for RecordingTransport {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().push(text.to_string());
        Ok(())
    }
}

fn sentiment_label_for(text: &str) -> (i32, f64) {
    let cleaned = preprocess_text(text);
    let (counts, uncategorized) = count_matches(&cleaned);
    let matches = total_matches(&counts, uncategorized);
    let raw = calculate_raw_score(&counts);
    let normalized = normalize_score(raw, matches);
    (assign_label(normalized), normalized.abs())
}

/// Mirrors spec.md's scenario of a panic-selling Twitter burst: bearish text,
/// elevated mention velocity, an accepted timestamp. The event should clear
/// the guard, score bearish, trip `panic_risk`, and produce exactly one
/// dispatched alert under `PANIC_RISK:BTC`.
#[tokio::test]
async fn panic_selling_burst_clears_guard_and_raises_one_alert() {
    let tracker = EventTracker::new();
    let duplicates = DuplicateTracker::new();
    let metrics = GuardMetrics::default();
    let guard = TimeSyncGuard::new(&tracker, &duplicates, &metrics);

    let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let event_time = now - chrono::Duration::seconds(5);
    let text = "panic everywhere, exit now, total collapse";

    let accepted = guard
        .evaluate(SourceKind::Twitter, "BTC", text, Some(event_time), now)
        .expect("a recent, first-seen event should clear the guard");
    assert_eq!(accepted, event_time);

    let (label, confidence) = sentiment_label_for(text);
    assert_eq!(label, -1);

    let risk_input = RiskInput {
        sentiment_label: label,
        sentiment_confidence: confidence,
        mention_velocity: 2.5,
        manipulation_flag: false,
        fear_greed_index: None,
    };
    let risk = compute_risk_indicators(&risk_input);
    assert!(risk.panic_risk);
    assert!(!risk.social_overheat);
    assert_eq!(risk.sentiment_reliability, ReliabilityStatus::Normal);

    let transport = Arc::new(RecordingTransport::new());
    let alerter = Alerter::new(transport.clone());
    let risk_event = social_context_pipeline::models::risk_event::RiskEvent {
        id: uuid::Uuid::new_v4(),
        raw_event_id: uuid::Uuid::new_v4(),
        asset_symbol: "BTC".to_string(),
        event_time: accepted,
        sentiment_label: risk_input.sentiment_label,
        sentiment_confidence: risk_input.sentiment_confidence,
        sentiment_reliability: risk.sentiment_reliability,
        social_overheat: risk.social_overheat,
        panic_risk: risk.panic_risk,
        fomo_risk: risk.fomo_risk,
        fear_greed_index: None,
        fear_greed_zone: risk.fear_greed_zone,
    };
    alerter.evaluate_risk(&risk_event, Instant::now()).await;

    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    let sent = transport.sent.lock();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("PANIC_RISK"));
}

/// A second firing of the same alert kind for the same asset within the
/// rate-limit window must not reach the transport a second time.
#[tokio::test]
async fn repeated_alert_within_window_does_not_double_send() {
    let transport = Arc::new(RecordingTransport::new());
    let alerter = Alerter::new(transport.clone());

    let risk_event = social_context_pipeline::models::risk_event::RiskEvent {
        id: uuid::Uuid::new_v4(),
        raw_event_id: uuid::Uuid::new_v4(),
        asset_symbol: "ETH".to_string(),
        event_time: Utc::now(),
        sentiment_label: -1,
        sentiment_confidence: 0.9,
        sentiment_reliability: ReliabilityStatus::Normal,
        social_overheat: false,
        panic_risk: true,
        fomo_risk: false,
        fear_greed_index: None,
        fear_greed_zone: social_context_pipeline::models::risk_event::FearGreedZone::Unknown,
    };

    let now = Instant::now();
    alerter.evaluate_risk(&risk_event, now).await;
    alerter.evaluate_risk(&risk_event, now + Duration::from_secs(30)).await;

    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
}

/// A late-arriving event is dropped by the guard before it ever reaches
/// sentiment/risk scoring, and the Data Quality Monitor records the drop
/// reason regardless, per spec.md's "every guard outcome feeds the DQM"
/// invariant.
#[tokio::test]
async fn late_event_is_dropped_before_enrichment_and_recorded_by_dqm() {
    let tracker = EventTracker::new();
    let duplicates = DuplicateTracker::new();
    let metrics = GuardMetrics::default();
    let guard = TimeSyncGuard::new(&tracker, &duplicates, &metrics);
    let dqm = DataQualityMonitor::new();

    let now = Utc.timestamp_opt(2_000_000, 0).unwrap();
    let stale_event_time = now - chrono::Duration::seconds(16);

    let result = guard.evaluate(SourceKind::Twitter, "BTC", "old news", Some(stale_event_time), now);
    assert_eq!(result, Err(DropReason::Late));

    let wall_now = Utc::now();
    let mono_now = Instant::now();
    dqm.record_guard_outcome(SourceKind::Twitter, result, mono_now);
    let snapshot = dqm.snapshot(mono_now, wall_now);

    // A single late outcome out of one observed event is a 100% late rate,
    // which is always >= the unstable threshold regardless of sample size.
    assert_ne!(snapshot.overall, OverallQuality::Healthy);
}

/// An accepted event whose text carries no lexicon/regex match at all falls
/// back to a neutral, zero-confidence verdict rather than panicking on a
/// division by zero, and that neutral verdict never trips any risk flag.
#[tokio::test]
async fn neutral_text_produces_no_risk_flags() {
    let (label, confidence) = sentiment_label_for("the market opened today");
    assert_eq!(label, 0);
    assert_eq!(confidence, 0.0);

    let risk = compute_risk_indicators(&RiskInput {
        sentiment_label: label,
        sentiment_confidence: confidence,
        mention_velocity: 1.0,
        manipulation_flag: false,
        fear_greed_index: Some(50),
    });
    assert!(!risk.social_overheat);
    assert!(!risk.panic_risk);
    assert!(!risk.fomo_risk);
    assert_eq!(risk.sentiment_reliability, ReliabilityStatus::Low);
}
