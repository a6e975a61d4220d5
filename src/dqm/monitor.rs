//! Data-Quality Monitor (spec.md §4.7): a rolling-window observer fed by
//! every event that clears, or is dropped by, the Time-Sync Guard. It never
//! modifies an event and never blocks the pipeline — it only accumulates
//! counters and, on its own cadence, renders a `QualityEvent` snapshot.
//!
//! Ownership mirrors `guard::EventTracker`/`ingestion::velocity`: a single
//! struct owns its own rolling state, mutated under short-held locks, read
//! via a point-in-time snapshot rather than shared mutation.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::errors::DropReason;
use crate::models::quality_event::{
    AnomalyStatus, AvailabilityStatus, QualityEvent, SourceBalanceStatus, SourceQuality, TimeIntegrityStatus,
    VolumeStatus,
};
use crate::models::source_entry::SourceKind;

const DEFAULT_WINDOW: Duration = Duration::from_secs(5 * 60);
const BASELINE_LOOKBACK: Duration = Duration::from_secs(60 * 60);

const TIME_INTEGRITY_UNSTABLE_MIN: f64 = 0.05;
const TIME_INTEGRITY_CRITICAL_MIN: f64 = 0.15;
const VOLUME_LOW_MAX: f64 = 0.3;
const VOLUME_HIGH_MIN: f64 = 3.0;
const BALANCE_IMBALANCED_MIN: f64 = 0.70;
const ANOMALY_PERSISTENT_MIN: f64 = 0.5;

fn availability_thresholds(kind: SourceKind) -> (Duration, Duration) {
    match kind {
        SourceKind::Twitter => (Duration::from_secs(60), Duration::from_secs(300)),
        SourceKind::Telegram => (Duration::from_secs(120), Duration::from_secs(600)),
        SourceKind::Reddit => (Duration::from_secs(900), Duration::from_secs(3600)),
    }
}

const ALL_SOURCES: [SourceKind; 3] = [SourceKind::Twitter, SourceKind::Reddit, SourceKind::Telegram];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum OverallQuality {
    Healthy = 0,
    Degraded = 1,
    Critical = 2,
}

impl OverallQuality {
    fn from_u8(v: u8) -> Self {
        match v {
            2 => OverallQuality::Critical,
            1 => OverallQuality::Degraded,
            _ => OverallQuality::Healthy,
        }
    }
}

#[derive(Default)]
struct SourceWindow {
    last_seen: Option<Instant>,
    /// Accepted-event timestamps, retained for `BASELINE_LOOKBACK` so both
    /// the current window's count and the prior-hour baseline can be read
    /// from the same ring without a second structure.
    accepted: VecDeque<Instant>,
}

/// Rolling-window data-quality observer. One instance per scheduler, shared
/// read/write by every ingestion worker and guard via short critical
/// sections, and read by the scheduler's periodic DQM loop and the
/// `/readyz` route.
pub struct DataQualityMonitor {
    window: Duration,
    per_source: Mutex<HashMap<SourceKind, SourceWindow>>,
    /// `(observed_at, was_dropped_late)` for every event the guard
    /// evaluated, accepted or not.
    guard_outcomes: Mutex<VecDeque<(Instant, bool)>>,
    /// `(observed_at, any_risk_flag_set)` for every event that reached the
    /// risk stage.
    anomaly_flags: Mutex<VecDeque<(Instant, bool)>>,
    last_overall: AtomicU8,
    /// Full per-dimension snapshot from the most recent `snapshot()` call,
    /// for `detailed_status()` readers (logs, the read interface) that want
    /// more than the single cached `overall` byte without re-running the
    /// rolling-window scan.
    last_snapshot: Mutex<Option<QualityEvent>>,
}

impl DataQualityMonitor {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            per_source: Mutex::new(HashMap::new()),
            guard_outcomes: Mutex::new(VecDeque::new()),
            anomaly_flags: Mutex::new(VecDeque::new()),
            last_overall: AtomicU8::new(OverallQuality::Healthy as u8),
            last_snapshot: Mutex::new(None),
        }
    }

    /// Records that the guard evaluated an event from `source`, whether or
    /// not it passed. Feeds both availability/volume (accepted only) and
    /// time integrity (all outcomes).
    pub fn record_guard_outcome(&self, source: SourceKind, outcome: Result<(), DropReason>, now: Instant) {
        let was_late = matches!(outcome, Err(DropReason::Late));
        self.guard_outcomes.lock().push_back((now, was_late));

        if outcome.is_ok() {
            let mut per_source = self.per_source.lock();
            let window = per_source.entry(source).or_default();
            window.last_seen = Some(now);
            window.accepted.push_back(now);
            evict(&mut window.accepted, now, BASELINE_LOOKBACK);
        }
    }

    /// Records whether an event that reached the risk stage carries any
    /// anomaly-bearing flag (`social_overheat`, `panic_risk`, or the raw
    /// event's own `manipulation_flag`).
    pub fn record_risk_flags(&self, any_flag_set: bool, now: Instant) {
        self.anomaly_flags.lock().push_back((now, any_flag_set));
    }

    fn per_source_snapshot(&self, kind: SourceKind, now: Instant) -> SourceQuality {
        let mut per_source = self.per_source.lock();
        let window = per_source.entry(kind).or_default();
        evict(&mut window.accepted, now, BASELINE_LOOKBACK);

        let (degraded_after, down_after) = availability_thresholds(kind);
        let availability = match window.last_seen {
            None => AvailabilityStatus::Down,
            Some(last) => {
                let since = now.duration_since(last);
                if since <= degraded_after {
                    AvailabilityStatus::Up
                } else if since <= down_after {
                    AvailabilityStatus::Degraded
                } else {
                    AvailabilityStatus::Down
                }
            }
        };

        let current_count = window
            .accepted
            .iter()
            .filter(|t| now.duration_since(**t) <= self.window)
            .count() as f64;
        let baseline_count = window.accepted.len() as f64;
        let scaled_baseline = baseline_count * (self.window.as_secs_f64() / BASELINE_LOOKBACK.as_secs_f64());
        let volume = if scaled_baseline <= 0.0 {
            VolumeStatus::Normal
        } else {
            let ratio = current_count / scaled_baseline;
            if ratio < VOLUME_LOW_MAX {
                VolumeStatus::Low
            } else if ratio > VOLUME_HIGH_MIN {
                VolumeStatus::High
            } else {
                VolumeStatus::Normal
            }
        };

        SourceQuality {
            source_kind: kind,
            availability,
            volume,
        }
    }

    fn time_integrity(&self, now: Instant) -> TimeIntegrityStatus {
        let mut outcomes = self.guard_outcomes.lock();
        evict_pairs(&mut outcomes, now, self.window);
        if outcomes.is_empty() {
            return TimeIntegrityStatus::Stable;
        }
        let total = outcomes.len() as f64;
        let late = outcomes.iter().filter(|(_, late)| *late).count() as f64;
        let rate = late / total;
        if rate > TIME_INTEGRITY_CRITICAL_MIN {
            TimeIntegrityStatus::Critical
        } else if rate >= TIME_INTEGRITY_UNSTABLE_MIN {
            TimeIntegrityStatus::Unstable
        } else {
            TimeIntegrityStatus::Stable
        }
    }

    fn source_balance(&self, now: Instant) -> SourceBalanceStatus {
        let mut per_source = self.per_source.lock();
        let mut counts = HashMap::new();
        let mut total = 0.0f64;
        for kind in ALL_SOURCES {
            let window = per_source.entry(kind).or_default();
            evict(&mut window.accepted, now, BASELINE_LOOKBACK);
            let count = window
                .accepted
                .iter()
                .filter(|t| now.duration_since(**t) <= self.window)
                .count() as f64;
            counts.insert(kind, count);
            total += count;
        }
        if total <= 0.0 {
            return SourceBalanceStatus::Balanced;
        }
        let max_fraction = counts.values().cloned().fold(0.0, f64::max) / total;
        if max_fraction > BALANCE_IMBALANCED_MIN {
            SourceBalanceStatus::Imbalanced
        } else {
            SourceBalanceStatus::Balanced
        }
    }

    fn anomaly_frequency(&self, now: Instant) -> AnomalyStatus {
        let mut flags = self.anomaly_flags.lock();
        evict_pairs(&mut flags, now, self.window);
        if flags.is_empty() {
            return AnomalyStatus::Normal;
        }
        let total = flags.len() as f64;
        let anomalous = flags.iter().filter(|(_, flagged)| *flagged).count() as f64;
        if anomalous / total >= ANOMALY_PERSISTENT_MIN {
            AnomalyStatus::Persistent
        } else {
            AnomalyStatus::Normal
        }
    }

    /// Renders a point-in-time `QualityEvent` and updates the cached
    /// `overall()` verdict. `now` is the monotonic clock paired with
    /// `wall_now` for the event's timestamp — spec.md §9's single
    /// clock-source-per-instance convention.
    pub fn snapshot(&self, now: Instant, wall_now: DateTime<Utc>) -> QualityEvent {
        let per_source: Vec<SourceQuality> =
            ALL_SOURCES.iter().map(|kind| self.per_source_snapshot(*kind, now)).collect();
        let time_integrity = self.time_integrity(now);
        let source_balance = self.source_balance(now);
        let anomaly_frequency = self.anomaly_frequency(now);

        let any_down = per_source.iter().any(|s| s.availability == AvailabilityStatus::Down);
        let any_degraded = per_source.iter().any(|s| s.availability == AvailabilityStatus::Degraded);
        let any_volume_abnormal = per_source.iter().any(|s| s.volume != VolumeStatus::Normal);

        let overall = if any_down || time_integrity == TimeIntegrityStatus::Critical {
            OverallQuality::Critical
        } else if any_degraded
            || any_volume_abnormal
            || time_integrity == TimeIntegrityStatus::Unstable
            || source_balance == SourceBalanceStatus::Imbalanced
            || anomaly_frequency == AnomalyStatus::Persistent
        {
            OverallQuality::Degraded
        } else {
            OverallQuality::Healthy
        };
        self.last_overall.store(overall as u8, Ordering::Relaxed);

        let event = QualityEvent {
            per_source,
            time_integrity,
            source_balance,
            anomaly_frequency,
            overall,
            computed_at: wall_now,
        };
        *self.last_snapshot.lock() = Some(event.clone());
        event
    }

    /// The cached verdict from the most recent `snapshot()` call — used by
    /// the `/readyz` route without re-running the rolling-window scan on
    /// every HTTP request.
    pub fn overall(&self) -> OverallQuality {
        OverallQuality::from_u8(self.last_overall.load(Ordering::Relaxed))
    }

    /// The full per-dimension detail behind the last `snapshot()`, for logs
    /// and the read interface — `None` until the DQM loop has run once.
    pub fn detailed_status(&self) -> Option<QualityEvent> {
        self.last_snapshot.lock().clone()
    }
}

impl Default for DataQualityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn evict(entry: &mut VecDeque<Instant>, now: Instant, retention: Duration) {
    while let Some(front) = entry.front() {
        if now.duration_since(*front) > retention {
            entry.pop_front();
        } else {
            break;
        }
    }
}

fn evict_pairs<T>(entry: &mut VecDeque<(Instant, T)>, now: Instant, retention: Duration) {
    while let Some((front, _)) = entry.front() {
        if now.duration_since(*front) > retention {
            entry.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_source_reports_down() {
        let dqm = DataQualityMonitor::new();
        let now = Instant::now();
        let snapshot = dqm.per_source_snapshot(SourceKind::Twitter, now);
        assert_eq!(snapshot.availability, AvailabilityStatus::Down);
    }

    #[test]
    fn recently_seen_source_is_up_then_degrades_then_downs() {
        let dqm = DataQualityMonitor::new();
        let t0 = Instant::now();
        dqm.record_guard_outcome(SourceKind::Twitter, Ok(()), t0);
        assert_eq!(dqm.per_source_snapshot(SourceKind::Twitter, t0).availability, AvailabilityStatus::Up);

        let t1 = t0 + Duration::from_secs(65);
        assert_eq!(
            dqm.per_source_snapshot(SourceKind::Twitter, t1).availability,
            AvailabilityStatus::Degraded
        );

        let t2 = t0 + Duration::from_secs(310);
        assert_eq!(dqm.per_source_snapshot(SourceKind::Twitter, t2).availability, AvailabilityStatus::Down);
    }

    #[test]
    fn time_integrity_rate_boundaries() {
        let dqm = DataQualityMonitor::new();
        let now = Instant::now();
        for _ in 0..19 {
            dqm.record_guard_outcome(SourceKind::Twitter, Ok(()), now);
        }
        dqm.record_guard_outcome(SourceKind::Twitter, Err(DropReason::Late), now);
        // 1/20 = 5% exactly => unstable, not stable.
        assert_eq!(dqm.time_integrity(now), TimeIntegrityStatus::Unstable);
    }

    #[test]
    fn source_balance_flags_single_source_dominance() {
        let dqm = DataQualityMonitor::new();
        let now = Instant::now();
        for _ in 0..8 {
            dqm.record_guard_outcome(SourceKind::Twitter, Ok(()), now);
        }
        dqm.record_guard_outcome(SourceKind::Reddit, Ok(()), now);
        dqm.record_guard_outcome(SourceKind::Telegram, Ok(()), now);
        assert_eq!(dqm.source_balance(now), SourceBalanceStatus::Imbalanced);
    }

    #[test]
    fn anomaly_frequency_threshold() {
        let dqm = DataQualityMonitor::new();
        let now = Instant::now();
        dqm.record_risk_flags(true, now);
        dqm.record_risk_flags(false, now);
        // exactly 0.5 => persistent (>= threshold).
        assert_eq!(dqm.anomaly_frequency(now), AnomalyStatus::Persistent);
    }

    #[test]
    fn overall_is_critical_when_any_source_down() {
        let dqm = DataQualityMonitor::new();
        let now = Instant::now();
        dqm.record_guard_outcome(SourceKind::Reddit, Ok(()), now);
        dqm.record_guard_outcome(SourceKind::Telegram, Ok(()), now);
        // Twitter never observed => Down.
        let event = dqm.snapshot(now, Utc::now());
        assert_eq!(event.overall, OverallQuality::Critical);
        assert_eq!(dqm.overall(), OverallQuality::Critical);
    }
}
