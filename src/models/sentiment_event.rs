use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::source_entry::SourceKind;

/// `-1` bearish, `0` neutral, `+1` bullish — kept as the signed integer the
/// spec defines rather than a named enum, since the risk stage and the
/// aggregated read interface both compare against the raw value directly.
pub type Label = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentMethod {
    /// Rule (lexicon + regex) score decided the label outright.
    Rule,
    /// Rule produced zero matches; the LLM fallback supplied the label.
    LlmFallback,
}

/// Per-category lexicon + regex match counts feeding the raw score.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SentimentCounts {
    pub bullish: u32,
    pub bearish: u32,
    pub fear: u32,
    pub greed: u32,
}

impl SentimentCounts {
    pub fn total(&self) -> u32 {
        self.bullish + self.bearish + self.fear + self.greed
    }
}

/// Output of the sentiment stage for a single accepted raw event. The rule
/// path is authoritative whenever `counts.total() > 0`; the LLM fallback is
/// only ever consulted, and only ever allowed to set the final label, when
/// the rule produced zero matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentEvent {
    pub id: Uuid,
    pub raw_event_id: Uuid,
    pub asset_symbol: String,
    pub source_kind: SourceKind,
    pub event_time: DateTime<Utc>,
    pub counts: SentimentCounts,
    pub raw_score: f64,
    pub normalized_score: f64,
    pub rule_label: Label,
    pub llm_used: bool,
    pub llm_label: Option<Label>,
    pub llm_confidence: Option<f64>,
    pub final_label: Label,
    pub final_confidence: f64,
    pub method: SentimentMethod,
}
