use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::sentiment_event::Label;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FearGreedZone {
    ExtremeFear,
    Normal,
    ExtremeGreed,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReliabilityStatus {
    Low,
    Normal,
}

/// Output of the risk stage, one per accepted raw event. All booleans are
/// advisory classifications over already-computed sentiment/mentions data;
/// none of them constitute a trading signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEvent {
    pub id: Uuid,
    pub raw_event_id: Uuid,
    pub asset_symbol: String,
    pub event_time: DateTime<Utc>,
    pub sentiment_label: Label,
    pub sentiment_confidence: f64,
    pub sentiment_reliability: ReliabilityStatus,
    pub social_overheat: bool,
    pub panic_risk: bool,
    pub fomo_risk: bool,
    pub fear_greed_index: Option<i32>,
    pub fear_greed_zone: FearGreedZone,
}
