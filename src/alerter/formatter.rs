//! Plain-text advisory formatting, per spec.md §6. No markdown tables, no
//! embedded JSON, and never a trading verb — the formatter is the last line
//! of defense for the "no trading decisions" invariant, so it checks its
//! own output rather than trusting callers to have kept details clean.

use chrono::{DateTime, Utc};

use crate::models::alert::AlertKind;

const FORBIDDEN_WORDS: [&str; 3] = ["buy", "sell", "trade"];

/// Renders the fixed `[ALERT] <KIND>\nAsset: ...\nTime: ...\nDetails: ...`
/// shape. Returns `None` if `details` contains a forbidden trading verb —
/// callers must treat that as a formatter bug, not send a mangled message.
pub fn format_alert(kind: &AlertKind, details: &str, raised_at: DateTime<Utc>) -> Option<String> {
    if contains_trading_verb(details) {
        return None;
    }

    let asset_line = kind
        .asset_symbol()
        .map(|a| a.to_string())
        .unwrap_or_else(|| "N/A".to_string());

    let message = format!(
        "[ALERT] {}\nAsset: {}\nTime: {}\nDetails: {}",
        kind.name(),
        asset_line,
        raised_at.format("%Y-%m-%dT%H:%M:%SZ"),
        details,
    );
    Some(message)
}

fn contains_trading_verb(text: &str) -> bool {
    let lowered = text.to_lowercase();
    FORBIDDEN_WORDS.iter().any(|word| {
        lowered
            .split(|c: char| !c.is_alphanumeric())
            .any(|token| token == *word)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::source_entry::SourceKind;

    #[test]
    fn renders_fixed_shape() {
        let kind = AlertKind::PanicRisk { asset_symbol: "BTC".into() };
        let now = Utc::now();
        let text = format_alert(&kind, "velocity 3.2x, sentiment bearish", now).unwrap();
        assert!(text.starts_with("[ALERT] PANIC_RISK\nAsset: BTC\nTime: "));
        assert!(text.contains("Details: velocity 3.2x, sentiment bearish"));
    }

    #[test]
    fn refuses_trading_verbs() {
        let kind = AlertKind::SourceDown { source_kind: SourceKind::Twitter };
        let now = Utc::now();
        assert!(format_alert(&kind, "you should sell now", now).is_none());
        assert!(format_alert(&kind, "outage detected", now).is_some());
    }

    #[test]
    fn source_scoped_alert_has_no_asset() {
        let kind = AlertKind::SourceDown { source_kind: SourceKind::Reddit };
        let text = format_alert(&kind, "no events in 62 minutes", Utc::now()).unwrap();
        assert!(text.contains("Asset: N/A"));
    }
}
