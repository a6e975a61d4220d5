use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use sqlx::PgPool;

use crate::errors::AppError;
use crate::models::source_entry::{EntryKind, SourceEntry, SourceKind, SourceRole};

const CACHE_TTL: Duration = Duration::from_secs(300);

struct Inner {
    by_id: HashMap<i64, SourceEntry>,
    loaded_at: Instant,
}

/// The ingestion whitelist. Nothing is ever fetched from, nor written
/// about, a source that isn't in this registry and enabled — this is the
/// enforcement point for the "no non-whitelisted ingestion" invariant. A
/// disabled entry is treated identically to an absent one by every public
/// accessor.
pub struct SourceRegistry {
    pool: PgPool,
    inner: RwLock<Inner>,
}

impl SourceRegistry {
    pub async fn load(pool: PgPool) -> Result<Self, AppError> {
        let by_id = fetch_sources(&pool).await?;
        Ok(Self {
            pool,
            inner: RwLock::new(Inner {
                by_id,
                loaded_at: Instant::now(),
            }),
        })
    }

    pub async fn refresh_if_stale(&self) -> Result<(), AppError> {
        let stale = self.inner.read().loaded_at.elapsed() >= CACHE_TTL;
        if !stale {
            return Ok(());
        }
        let by_id = fetch_sources(&self.pool).await?;
        let mut inner = self.inner.write();
        inner.by_id = by_id;
        inner.loaded_at = Instant::now();
        Ok(())
    }

    /// Whitelist membership by id, requiring `enabled = true`.
    pub fn is_whitelisted(&self, id: i64) -> bool {
        self.inner
            .read()
            .by_id
            .get(&id)
            .is_some_and(|entry| entry.enabled)
    }

    /// Whitelist membership by platform-native handle, requiring
    /// `enabled = true`. Workers that identify incoming items by handle
    /// (rather than an internal id) use this directly.
    pub fn is_handle_whitelisted(&self, kind: SourceKind, handle: &str) -> bool {
        self.inner
            .read()
            .by_id
            .values()
            .any(|e| e.enabled && e.source_kind() == kind && e.handle == handle)
    }

    pub fn get(&self, id: i64) -> Option<SourceEntry> {
        self.inner.read().by_id.get(&id).cloned()
    }

    pub fn get_by_handle(&self, kind: SourceKind, handle: &str) -> Option<SourceEntry> {
        self.inner
            .read()
            .by_id
            .values()
            .find(|e| e.source_kind() == kind && e.handle == handle)
            .cloned()
    }

    /// Enabled entries for a platform, ordered by descending priority (a
    /// higher `priority` value is consulted first).
    pub fn enabled_sources(&self, kind: SourceKind) -> Vec<SourceEntry> {
        let mut entries: Vec<SourceEntry> = self
            .inner
            .read()
            .by_id
            .values()
            .filter(|s| s.source_kind() == kind && s.enabled)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.priority.cmp(&a.priority));
        entries
    }
}

async fn fetch_sources(pool: &PgPool) -> Result<HashMap<i64, SourceEntry>, AppError> {
    let rows = sqlx::query!(
        r#"SELECT id, kind, handle, asset_symbol, role, enabled, per_run_cap, priority FROM source_entries"#
    )
    .fetch_all(pool)
    .await?;

    let mut map = HashMap::new();
    for r in rows {
        let kind = match r.kind.as_str() {
            "account" => EntryKind::Account,
            "list" => EntryKind::List,
            "query" => EntryKind::Query,
            "subreddit" => EntryKind::Subreddit,
            "channel" => EntryKind::Channel,
            "group" => EntryKind::Group,
            other => {
                return Err(AppError::Config(format!("unknown source entry kind: {other}")));
            }
        };
        let role = match r.role.as_str() {
            "news" => SourceRole::News,
            "market" => SourceRole::Market,
            "analyst" => SourceRole::Analyst,
            "community" => SourceRole::Community,
            "panic" => SourceRole::Panic,
            "discussion" => SourceRole::Discussion,
            other => {
                return Err(AppError::Config(format!("unknown source role: {other}")));
            }
        };
        map.insert(
            r.id,
            SourceEntry {
                id: r.id,
                kind,
                handle: r.handle,
                asset_symbol: r.asset_symbol,
                role,
                enabled: r.enabled,
                per_run_cap: r.per_run_cap,
                priority: r.priority,
            },
        );
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64, kind: EntryKind, handle: &str, enabled: bool, priority: i32) -> SourceEntry {
        SourceEntry {
            id,
            kind,
            handle: handle.to_string(),
            asset_symbol: "BTC".to_string(),
            role: SourceRole::Market,
            enabled,
            per_run_cap: 30,
            priority,
        }
    }

    #[test]
    fn enabled_sources_orders_by_descending_priority() {
        let mut map = HashMap::new();
        map.insert(1, entry(1, EntryKind::Account, "a", true, 1));
        map.insert(2, entry(2, EntryKind::Account, "b", true, 5));
        map.insert(3, entry(3, EntryKind::Account, "c", false, 9));
        let inner = Inner {
            by_id: map,
            loaded_at: Instant::now(),
        };
        let ordered: Vec<i64> = inner
            .by_id
            .values()
            .filter(|s| s.source_kind() == SourceKind::Twitter && s.enabled)
            .map(|s| s.id)
            .collect();
        assert_eq!(ordered.len(), 2);
        assert!(!ordered.contains(&3));
    }
}
