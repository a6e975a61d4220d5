use std::time::{Duration, Instant};

use parking_lot::RwLock;
use regex::Regex;
use sqlx::PgPool;

use crate::errors::AppError;
use crate::models::asset::Asset;

const CACHE_TTL: Duration = Duration::from_secs(300);

struct Inner {
    assets: Vec<Asset>,
    /// One compiled word-boundary pattern per active asset, same index as
    /// `assets`. Built only from active assets, keywords sorted by length
    /// descending so the longest keyword wins when one is a substring of
    /// another.
    patterns: Vec<Regex>,
    loaded_at: Instant,
}

/// Caches the tracked-asset list and answers "does this text mention a
/// tracked asset" without round-tripping to the database per event. Reloads
/// from the database at most once per `CACHE_TTL`.
pub struct AssetRegistry {
    pool: PgPool,
    inner: RwLock<Inner>,
}

impl AssetRegistry {
    pub async fn load(pool: PgPool) -> Result<Self, AppError> {
        let assets = fetch_assets(&pool).await?;
        let patterns = compile_patterns(&assets);
        Ok(Self {
            pool,
            inner: RwLock::new(Inner {
                assets,
                patterns,
                loaded_at: Instant::now(),
            }),
        })
    }

    /// Reloads from the database if the cache has gone stale. Call before
    /// each ingestion cycle; a no-op most of the time.
    pub async fn refresh_if_stale(&self) -> Result<(), AppError> {
        let stale = {
            let inner = self.inner.read();
            inner.loaded_at.elapsed() >= CACHE_TTL
        };
        if !stale {
            return Ok(());
        }
        let assets = fetch_assets(&self.pool).await?;
        let patterns = compile_patterns(&assets);
        let mut inner = self.inner.write();
        inner.assets = assets;
        inner.patterns = patterns;
        inner.loaded_at = Instant::now();
        Ok(())
    }

    /// Returns the tracked asset whose keyword matches `text` at a word
    /// boundary, preferring the one with the higher `priority` value on
    /// ties, then the one that was loaded first (spec.md §4.1: "Ties broken
    /// by priority then first-seen").
    pub fn detect_asset(&self, text: &str) -> Option<String> {
        let inner = self.inner.read();
        let lower = text.to_lowercase();
        best_match(&inner.assets, &inner.patterns, &lower).map(|asset| asset.symbol.clone())
    }

    pub fn detect_all_assets(&self, text: &str) -> Vec<String> {
        let inner = self.inner.read();
        let lower = text.to_lowercase();
        inner
            .assets
            .iter()
            .zip(inner.patterns.iter())
            .filter(|(asset, _)| asset.active)
            .filter(|(_, pattern)| pattern.is_match(&lower))
            .map(|(asset, _)| asset.symbol.clone())
            .collect()
    }

    pub fn contains_tracked_asset(&self, text: &str) -> bool {
        self.detect_asset(text).is_some()
    }
}

/// Scans `assets`/`patterns` (parallel, same index) for the highest-priority
/// active asset whose pattern matches `lower_text`, breaking ties by
/// whichever came first in `assets` (i.e. load order). Free function so it
/// can be unit-tested without a live `PgPool`.
fn best_match<'a>(assets: &'a [Asset], patterns: &[Regex], lower_text: &str) -> Option<&'a Asset> {
    let mut best: Option<&Asset> = None;
    for (asset, pattern) in assets.iter().zip(patterns.iter()) {
        if !asset.active || !pattern.is_match(lower_text) {
            continue;
        }
        let is_better = match best {
            None => true,
            Some(current) => asset.priority > current.priority,
        };
        if is_better {
            best = Some(asset);
        }
    }
    best
}

fn compile_patterns(assets: &[Asset]) -> Vec<Regex> {
    assets
        .iter()
        .map(|asset| {
            let mut keywords: Vec<&str> = asset.keywords.iter().map(String::as_str).collect();
            keywords.sort_by_key(|k| std::cmp::Reverse(k.len()));
            let escaped: Vec<String> = keywords.iter().map(|k| regex::escape(k)).collect();
            let joined = escaped.join("|");
            let pattern = format!(r"(?:^|[\s$#]){}(?:$|[\s.,!?])", joined);
            Regex::new(&pattern.to_lowercase()).unwrap_or_else(|_| Regex::new(r"$^").unwrap())
        })
        .collect()
}

async fn fetch_assets(pool: &PgPool) -> Result<Vec<Asset>, AppError> {
    let rows = sqlx::query!(
        r#"SELECT symbol, display_name, keywords, active, priority FROM assets"#
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| Asset {
            symbol: r.symbol,
            display_name: r.display_name,
            keywords: r.keywords,
            active: r.active,
            priority: r.priority,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(symbol: &str, keywords: &[&str], priority: i32) -> Asset {
        Asset {
            symbol: symbol.to_string(),
            display_name: symbol.to_string(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            active: true,
            priority,
        }
    }

    #[test]
    fn word_boundary_avoids_substring_false_positive() {
        let assets = vec![asset("ETH", &["eth"], 0)];
        let patterns = compile_patterns(&assets);
        assert!(!patterns[0].is_match("ethernet cables are cheap"));
        assert!(patterns[0].is_match("buying more $eth today"));
    }

    #[test]
    fn priority_breaks_ties() {
        let assets = vec![asset("BTC", &["coin"], 1), asset("ETH", &["coin"], 0)];
        let patterns = compile_patterns(&assets);
        assert!(patterns[0].is_match("this coin is pumping"));
        assert!(patterns[1].is_match("this coin is pumping"));
        let winner = best_match(&assets, &patterns, "this coin is pumping").unwrap();
        assert_eq!(winner.symbol, "BTC");
    }

    #[test]
    fn first_seen_breaks_equal_priority_ties() {
        let assets = vec![asset("BTC", &["coin"], 5), asset("ETH", &["coin"], 5)];
        let patterns = compile_patterns(&assets);
        let winner = best_match(&assets, &patterns, "this coin is pumping").unwrap();
        assert_eq!(winner.symbol, "BTC");
    }

    #[test]
    fn inactive_assets_are_never_matched() {
        let mut eth = asset("ETH", &["eth"], 10);
        eth.active = false;
        let assets = vec![eth];
        let patterns = compile_patterns(&assets);
        assert!(best_match(&assets, &patterns, "buying more $eth today").is_none());
    }
}
