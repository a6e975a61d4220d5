use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::source_entry::SourceKind;

/// The eight alert kinds spec.md §4.8 names, one-to-one with a risk or
/// data-quality trigger. All are advisory notices; none name a trading
/// action, and the formatter refuses to emit one that does.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum AlertKind {
    SocialOverheat { asset_symbol: String },
    PanicRisk { asset_symbol: String },
    FomoRisk { asset_symbol: String },
    /// Raised when sentiment swings to an extreme alongside an extreme
    /// fear/greed reading — distinct from the three risk-flag alerts above,
    /// which each gate on one boolean; this one gates on the zone.
    ExtremeMarketEmotion { asset_symbol: String },
    DataQualityDegraded { source_kind: Option<SourceKind> },
    DataQualityCritical { source_kind: Option<SourceKind> },
    SourceDelay { source_kind: SourceKind },
    SourceDown { source_kind: SourceKind },
}

impl AlertKind {
    /// Stable discriminant name used in the dedup key and in the outbound
    /// message's `<ALERT_KIND>` line — independent of the enum's `Debug`
    /// representation so renaming a variant doesn't silently change a
    /// dedup key that's meant to stay stable across deploys.
    pub fn name(&self) -> &'static str {
        match self {
            AlertKind::SocialOverheat { .. } => "SOCIAL_OVERHEAT",
            AlertKind::PanicRisk { .. } => "PANIC_RISK",
            AlertKind::FomoRisk { .. } => "FOMO_RISK",
            AlertKind::ExtremeMarketEmotion { .. } => "EXTREME_MARKET_EMOTION",
            AlertKind::DataQualityDegraded { .. } => "DATA_QUALITY_DEGRADED",
            AlertKind::DataQualityCritical { .. } => "DATA_QUALITY_CRITICAL",
            AlertKind::SourceDelay { .. } => "SOURCE_DELAY",
            AlertKind::SourceDown { .. } => "SOURCE_DOWN",
        }
    }

    pub fn asset_symbol(&self) -> Option<&str> {
        match self {
            AlertKind::SocialOverheat { asset_symbol }
            | AlertKind::PanicRisk { asset_symbol }
            | AlertKind::FomoRisk { asset_symbol }
            | AlertKind::ExtremeMarketEmotion { asset_symbol } => Some(asset_symbol),
            _ => None,
        }
    }

    pub fn source_kind(&self) -> Option<SourceKind> {
        match self {
            AlertKind::DataQualityDegraded { source_kind } | AlertKind::DataQualityCritical { source_kind } => {
                *source_kind
            }
            AlertKind::SourceDelay { source_kind } | AlertKind::SourceDown { source_kind } => Some(*source_kind),
            _ => None,
        }
    }

    /// `(alert_kind, asset, source?)`, deliberately excluding timestamp per
    /// spec.md §4.8/§9 so repeated firings within the rate-limit window
    /// collapse onto the same key.
    pub fn dedup_key(&self) -> String {
        match (self.asset_symbol(), self.source_kind()) {
            (Some(asset), _) => format!("{}:{}", self.name(), asset),
            (None, Some(source)) => format!("{}:{}", self.name(), source),
            (None, None) => self.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_key_is_time_independent_and_asset_scoped() {
        let a = AlertKind::PanicRisk { asset_symbol: "BTC".into() };
        let b = AlertKind::PanicRisk { asset_symbol: "BTC".into() };
        assert_eq!(a.dedup_key(), b.dedup_key());
        let c = AlertKind::PanicRisk { asset_symbol: "ETH".into() };
        assert_ne!(a.dedup_key(), c.dedup_key());
    }

    #[test]
    fn source_alerts_scope_by_source_not_asset() {
        let a = AlertKind::SourceDown { source_kind: SourceKind::Twitter };
        let b = AlertKind::SourceDown { source_kind: SourceKind::Reddit };
        assert_ne!(a.dedup_key(), b.dedup_key());
    }
}
