//! Evaluates risk and data-quality signals against the eight fixed alert
//! kinds (spec.md §4.8), collapses repeated firings onto a rate-limited
//! dedup key, and dispatches through the outbound transport with retry.
//! Advisory only: every outbound message is built by `formatter`, which
//! itself refuses to emit a trading verb.

pub mod formatter;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::dqm::monitor::OverallQuality;
use crate::external::alert_transport::AlertTransport;
use crate::models::alert::{Alert, AlertKind};
use crate::models::quality_event::{AvailabilityStatus, QualityEvent};
use crate::models::risk_event::{FearGreedZone, RiskEvent};
use crate::models::source_entry::SourceKind;

const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(600);
const MAX_SEND_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// One counter pair per dedup key: total trigger evaluations and how many
/// were suppressed by the rate limit. Exposed only through logs — the
/// pipeline has no external metrics surface.
#[derive(Default, Clone, Copy)]
struct DedupCounters {
    triggered: u64,
    suppressed: u64,
}

pub struct Alerter {
    transport: Arc<dyn AlertTransport>,
    last_sent: Mutex<HashMap<String, Instant>>,
    counters: Mutex<HashMap<String, DedupCounters>>,
}

impl Alerter {
    pub fn new(transport: Arc<dyn AlertTransport>) -> Self {
        Self {
            transport,
            last_sent: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluates one risk event's flags and dispatches whichever of
    /// `SOCIAL_OVERHEAT`/`PANIC_RISK`/`FOMO_RISK`/`EXTREME_MARKET_EMOTION`
    /// apply, in that order. Multiple can fire for the same event — each
    /// has its own dedup key.
    pub async fn evaluate_risk(&self, risk: &RiskEvent, now: Instant) {
        for kind in risk_alert_kinds(risk) {
            let details = risk_alert_details(&kind, risk);
            self.raise(kind, details, now).await;
        }
    }

    /// Evaluates one Data-Quality Monitor snapshot and dispatches the
    /// overall-degraded/critical alerts plus a per-source delay/down alert
    /// for any source whose availability warrants it.
    pub async fn evaluate_quality(&self, quality: &QualityEvent, now: Instant) {
        for kind in quality_alert_kinds(quality) {
            let details = quality_alert_details(&kind, quality);
            self.raise(kind, details, now).await;
        }
    }

    async fn raise(&self, kind: AlertKind, details: String, now: Instant) {
        let dedup_key = kind.dedup_key();
        {
            let mut counters = self.counters.lock();
            counters.entry(dedup_key.clone()).or_default().triggered += 1;
        }

        let suppressed = {
            let last_sent = self.last_sent.lock();
            last_sent
                .get(&dedup_key)
                .is_some_and(|last| now.duration_since(*last) < RATE_LIMIT_WINDOW)
        };
        if suppressed {
            self.counters.lock().entry(dedup_key.clone()).or_default().suppressed += 1;
            tracing::debug!(alert = kind.name(), key = %dedup_key, "alert suppressed within rate-limit window");
            return;
        }

        let raised_at = chrono::Utc::now();
        let Some(message) = formatter::format_alert(&kind, &details, raised_at) else {
            tracing::error!(alert = kind.name(), "formatter refused message, dropping alert");
            return;
        };
        let alert = Alert { kind, message, raised_at };

        if self.dispatch(&alert).await {
            self.last_sent.lock().insert(dedup_key, Instant::now());
        }
    }

    /// Up to `MAX_SEND_ATTEMPTS` sends with exponential backoff
    /// (1s → 2s → 4s). Returns whether any attempt succeeded; rate-limit
    /// bookkeeping only advances on `true`.
    async fn dispatch(&self, alert: &Alert) -> bool {
        let mut backoff = BACKOFF_BASE;
        for attempt in 1..=MAX_SEND_ATTEMPTS {
            match self.transport.send(&alert.message).await {
                Ok(()) => return true,
                Err(e) => {
                    tracing::warn!(alert = alert.kind.name(), attempt, error = %e, "alert send failed");
                    if attempt < MAX_SEND_ATTEMPTS {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }
        tracing::error!(alert = alert.kind.name(), "alert exhausted retries, not sent");
        false
    }
}

fn risk_alert_kinds(risk: &RiskEvent) -> Vec<AlertKind> {
    let mut kinds = Vec::new();
    let asset_symbol = risk.asset_symbol.clone();
    if risk.social_overheat {
        kinds.push(AlertKind::SocialOverheat { asset_symbol: asset_symbol.clone() });
    }
    if risk.panic_risk {
        kinds.push(AlertKind::PanicRisk { asset_symbol: asset_symbol.clone() });
    }
    if risk.fomo_risk {
        kinds.push(AlertKind::FomoRisk { asset_symbol: asset_symbol.clone() });
    }
    if extreme_market_emotion(risk) {
        kinds.push(AlertKind::ExtremeMarketEmotion { asset_symbol });
    }
    kinds
}

/// An extreme fear/greed reading is only alert-worthy when sentiment
/// agrees with its direction (extreme fear + bearish label, extreme greed +
/// bullish label) — an extreme index with contradicting social sentiment is
/// a data point, not yet an emotion spike worth paging on.
fn extreme_market_emotion(risk: &RiskEvent) -> bool {
    match risk.fear_greed_zone {
        FearGreedZone::ExtremeFear => risk.sentiment_label == -1,
        FearGreedZone::ExtremeGreed => risk.sentiment_label == 1,
        FearGreedZone::Normal | FearGreedZone::Unknown => false,
    }
}

fn risk_alert_details(kind: &AlertKind, risk: &RiskEvent) -> String {
    match kind {
        AlertKind::SocialOverheat { .. } => {
            format!("elevated mention velocity with manipulation signal present, sentiment_label={}", risk.sentiment_label)
        }
        AlertKind::PanicRisk { .. } => {
            format!("bearish sentiment with elevated mention velocity, confidence={:.2}", risk.sentiment_confidence)
        }
        AlertKind::FomoRisk { .. } => {
            format!(
                "bullish sentiment alongside fear/greed index {}",
                risk.fear_greed_index.map(|v| v.to_string()).unwrap_or_else(|| "unknown".to_string())
            )
        }
        AlertKind::ExtremeMarketEmotion { .. } => {
            format!("fear/greed zone {:?} aligned with sentiment_label={}", risk.fear_greed_zone, risk.sentiment_label)
        }
        _ => String::new(),
    }
}

fn quality_alert_kinds(quality: &QualityEvent) -> Vec<AlertKind> {
    let mut kinds = Vec::new();
    match quality.overall {
        OverallQuality::Critical => kinds.push(AlertKind::DataQualityCritical { source_kind: None }),
        OverallQuality::Degraded => kinds.push(AlertKind::DataQualityDegraded { source_kind: None }),
        OverallQuality::Healthy => {}
    }
    for source in &quality.per_source {
        match source.availability {
            AvailabilityStatus::Down => kinds.push(AlertKind::SourceDown { source_kind: source.source_kind }),
            AvailabilityStatus::Degraded => kinds.push(AlertKind::SourceDelay { source_kind: source.source_kind }),
            AvailabilityStatus::Up => {}
        }
    }
    kinds
}

fn quality_alert_details(kind: &AlertKind, quality: &QualityEvent) -> String {
    match kind {
        AlertKind::DataQualityDegraded { .. } | AlertKind::DataQualityCritical { .. } => format!(
            "time_integrity={:?}, source_balance={:?}, anomaly_frequency={:?}",
            quality.time_integrity, quality.source_balance, quality.anomaly_frequency
        ),
        AlertKind::SourceDelay { source_kind } | AlertKind::SourceDown { source_kind } => {
            source_detail(quality, *source_kind)
        }
        _ => String::new(),
    }
}

fn source_detail(quality: &QualityEvent, source_kind: SourceKind) -> String {
    quality
        .per_source
        .iter()
        .find(|s| s.source_kind == source_kind)
        .map(|s| format!("availability={:?}, volume={:?}", s.availability, s.volume))
        .unwrap_or_else(|| "no recent activity observed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::alert_transport::{NullTransport, TransportError};
    use crate::models::risk_event::ReliabilityStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingTransport {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl AlertTransport for CountingTransport {
        async fn send(&self, _text: &str) -> Result<(), TransportError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_first {
                Err(TransportError::Network("timeout".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn sample_risk(panic: bool) -> RiskEvent {
        RiskEvent {
            id: uuid::Uuid::new_v4(),
            raw_event_id: uuid::Uuid::new_v4(),
            asset_symbol: "BTC".to_string(),
            event_time: chrono::Utc::now(),
            sentiment_label: -1,
            sentiment_confidence: 0.8,
            sentiment_reliability: ReliabilityStatus::Normal,
            social_overheat: false,
            panic_risk: panic,
            fomo_risk: false,
            fear_greed_index: None,
            fear_greed_zone: FearGreedZone::Unknown,
        }
    }

    #[tokio::test]
    async fn null_transport_never_advances_dedup_bookkeeping() {
        let alerter = Alerter::new(Arc::new(NullTransport));
        let risk = sample_risk(true);
        alerter.evaluate_risk(&risk, Instant::now()).await;
        let counters = alerter.counters.lock();
        let c = counters.get("PANIC_RISK:BTC").unwrap();
        assert_eq!(c.triggered, 1);
        assert_eq!(c.suppressed, 0);
        assert!(alerter.last_sent.lock().is_empty());
    }

    #[tokio::test]
    async fn repeated_trigger_within_window_is_suppressed() {
        let transport = Arc::new(CountingTransport { calls: AtomicU32::new(0), fail_first: 0 });
        let alerter = Alerter::new(transport);
        let risk = sample_risk(true);
        let now = Instant::now();
        alerter.evaluate_risk(&risk, now).await;
        alerter.evaluate_risk(&risk, now + Duration::from_secs(10)).await;
        let counters = alerter.counters.lock();
        let c = counters.get("PANIC_RISK:BTC").unwrap();
        assert_eq!(c.triggered, 2);
        assert_eq!(c.suppressed, 1);
    }

    #[tokio::test]
    async fn successful_send_updates_dedup_bookkeeping() {
        let transport = Arc::new(CountingTransport { calls: AtomicU32::new(0), fail_first: 0 });
        let alerter = Alerter::new(transport);
        let risk = sample_risk(true);
        alerter.evaluate_risk(&risk, Instant::now()).await;
        assert!(alerter.last_sent.lock().contains_key("PANIC_RISK:BTC"));
    }
}
