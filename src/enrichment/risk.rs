//! Risk indicator stage (spec.md §4.5 Stage 3). Every function here is a
//! pure classification over already-computed sentiment/velocity/mentions
//! inputs — none of it infers intent or recommends an action, grounded in
//! `original_source/risk_indicators.py`'s fixed-logic functions of the same
//! names.

use crate::models::risk_event::{FearGreedZone, ReliabilityStatus};
use crate::models::sentiment_event::Label;

const SOCIAL_OVERHEAT_VELOCITY: f64 = 3.0;
const PANIC_RISK_VELOCITY: f64 = 2.0;
const FOMO_RISK_FGI_MIN: i32 = 70;
const EXTREME_FEAR_MAX: i32 = 20;
const EXTREME_GREED_MIN: i32 = 80;
const RELIABILITY_LOW_MAX: f64 = 0.6;

#[derive(Debug, Clone, Copy)]
pub struct RiskInput {
    pub sentiment_label: Label,
    pub sentiment_confidence: f64,
    pub mention_velocity: f64,
    pub manipulation_flag: bool,
    pub fear_greed_index: Option<i32>,
}

/// High message velocity co-occurring with a flagged anomaly.
pub fn compute_social_overheat(input: &RiskInput) -> bool {
    input.mention_velocity >= SOCIAL_OVERHEAT_VELOCITY && input.manipulation_flag
}

/// Negative sentiment combined with elevated mention velocity.
pub fn compute_panic_risk(input: &RiskInput) -> bool {
    input.sentiment_label == -1 && input.mention_velocity >= PANIC_RISK_VELOCITY
}

/// Positive sentiment combined with a high externally-supplied fear/greed
/// index reading. Requires the index to be present; absent it, FOMO risk
/// cannot be assessed and is reported `false`.
pub fn compute_fomo_risk(input: &RiskInput) -> bool {
    input.sentiment_label == 1
        && input
            .fear_greed_index
            .is_some_and(|fgi| fgi >= FOMO_RISK_FGI_MIN)
}

pub fn compute_fear_greed_zone(fgi: Option<i32>) -> FearGreedZone {
    match fgi {
        None => FearGreedZone::Unknown,
        Some(v) if v <= EXTREME_FEAR_MAX => FearGreedZone::ExtremeFear,
        Some(v) if v >= EXTREME_GREED_MIN => FearGreedZone::ExtremeGreed,
        Some(_) => FearGreedZone::Normal,
    }
}

pub fn compute_sentiment_reliability(sentiment_confidence: f64) -> ReliabilityStatus {
    if sentiment_confidence < RELIABILITY_LOW_MAX {
        ReliabilityStatus::Low
    } else {
        ReliabilityStatus::Normal
    }
}

pub struct RiskOutput {
    pub social_overheat: bool,
    pub panic_risk: bool,
    pub fomo_risk: bool,
    pub fear_greed_zone: FearGreedZone,
    pub sentiment_reliability: ReliabilityStatus,
}

/// Orchestrates the five indicator computations, executed in the fixed
/// order spec.md §4.5 lists them.
pub fn compute_risk_indicators(input: &RiskInput) -> RiskOutput {
    RiskOutput {
        social_overheat: compute_social_overheat(input),
        panic_risk: compute_panic_risk(input),
        fomo_risk: compute_fomo_risk(input),
        fear_greed_zone: compute_fear_greed_zone(input.fear_greed_index),
        sentiment_reliability: compute_sentiment_reliability(input.sentiment_confidence),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> RiskInput {
        RiskInput {
            sentiment_label: 0,
            sentiment_confidence: 0.9,
            mention_velocity: 0.0,
            manipulation_flag: false,
            fear_greed_index: None,
        }
    }

    #[test]
    fn social_overheat_requires_both_velocity_and_anomaly() {
        let mut input = base_input();
        input.mention_velocity = 3.5;
        assert!(!compute_social_overheat(&input));
        input.manipulation_flag = true;
        assert!(compute_social_overheat(&input));
    }

    #[test]
    fn panic_risk_requires_bearish_label() {
        let mut input = base_input();
        input.mention_velocity = 2.5;
        input.sentiment_label = 1;
        assert!(!compute_panic_risk(&input));
        input.sentiment_label = -1;
        assert!(compute_panic_risk(&input));
    }

    #[test]
    fn fomo_risk_requires_fgi_present_and_high() {
        let mut input = base_input();
        input.sentiment_label = 1;
        assert!(!compute_fomo_risk(&input));
        input.fear_greed_index = Some(50);
        assert!(!compute_fomo_risk(&input));
        input.fear_greed_index = Some(75);
        assert!(compute_fomo_risk(&input));
    }

    #[test]
    fn fear_greed_zone_boundaries() {
        assert_eq!(compute_fear_greed_zone(None), FearGreedZone::Unknown);
        assert_eq!(compute_fear_greed_zone(Some(20)), FearGreedZone::ExtremeFear);
        assert_eq!(compute_fear_greed_zone(Some(21)), FearGreedZone::Normal);
        assert_eq!(compute_fear_greed_zone(Some(79)), FearGreedZone::Normal);
        assert_eq!(compute_fear_greed_zone(Some(80)), FearGreedZone::ExtremeGreed);
    }

    #[test]
    fn reliability_threshold_boundary() {
        assert_eq!(compute_sentiment_reliability(0.59), ReliabilityStatus::Low);
        assert_eq!(compute_sentiment_reliability(0.6), ReliabilityStatus::Normal);
    }
}
