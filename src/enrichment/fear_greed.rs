//! The fear/greed index the risk stage reads is external market data, not
//! anything this pipeline derives from social content. Wrapping it behind
//! a trait keeps `EnrichmentPipeline` ignorant of where the number comes
//! from, mirroring `SentimentClassifier`'s null-object default.

use async_trait::async_trait;

#[async_trait]
pub trait FearGreedSource: Send + Sync {
    /// Latest reading, `0..=100`, or `None` if no reading is available yet
    /// (startup, or the feed is down). Never blocks on a live fetch inside
    /// the per-event hot path — a scheduler reads this once per cycle and
    /// threads the same value through every event in that cycle.
    async fn current(&self) -> Option<i32>;
}

/// Used when no feed is configured. The risk stage already treats `None`
/// as "unknown zone" rather than an error, so this is a complete, valid
/// deployment mode, not a degraded one.
pub struct NullFearGreedSource;

#[async_trait]
impl FearGreedSource for NullFearGreedSource {
    async fn current(&self) -> Option<i32> {
        None
    }
}
