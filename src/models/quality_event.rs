use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::source_entry::SourceKind;

/// Ordered `Up < Degraded < Down` so aggregation across records can take
/// the worst (`max`) status directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityStatus {
    Up,
    Degraded,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeIntegrityStatus {
    Stable,
    Unstable,
    Critical,
}

/// `Low` and `High` are both deviations from `Normal` rather than a single
/// bad direction; ordered `Normal < Low < High` purely so aggregation has a
/// deterministic "worst across records" rule, not because `High` is judged
/// worse than `Low` in any domain sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeStatus {
    Normal,
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceBalanceStatus {
    Balanced,
    Imbalanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyStatus {
    Normal,
    Persistent,
}

/// One dimension report per ingestion source, bundled under the overall
/// `QualityEvent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceQuality {
    pub source_kind: SourceKind,
    pub availability: AvailabilityStatus,
    pub volume: VolumeStatus,
}

/// Snapshot emitted by the Data Quality Monitor on its own cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityEvent {
    pub per_source: Vec<SourceQuality>,
    pub time_integrity: TimeIntegrityStatus,
    pub source_balance: SourceBalanceStatus,
    pub anomaly_frequency: AnomalyStatus,
    pub overall: crate::dqm::monitor::OverallQuality,
    pub computed_at: DateTime<Utc>,
}
