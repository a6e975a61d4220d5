use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Twitter,
    Reddit,
    Telegram,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Twitter => write!(f, "twitter"),
            SourceKind::Reddit => write!(f, "reddit"),
            SourceKind::Telegram => write!(f, "telegram"),
        }
    }
}

/// What kind of whitelisted entity a `SourceEntry` names within its
/// platform. Distinct from `SourceKind`, which names the platform itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Account,
    List,
    Query,
    Subreddit,
    Channel,
    Group,
}

/// How a whitelisted entry is read, mirrored from spec.md's roster of
/// `news|market|analyst|community|panic|discussion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceRole {
    News,
    Market,
    Analyst,
    Community,
    Panic,
    Discussion,
}

/// A single whitelisted ingestion point: an account, subreddit, or chat.
/// Whitelists are closed — any inbound datum whose handle/id is not
/// registered here is discarded before any other processing, and an entry
/// with `enabled = false` is treated identically to absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    pub id: i64,
    pub kind: EntryKind,
    /// Platform-native handle: @handle, subreddit name, or chat id.
    pub handle: String,
    pub asset_symbol: String,
    pub role: SourceRole,
    pub enabled: bool,
    pub per_run_cap: i32,
    pub priority: i32,
}

impl SourceEntry {
    pub fn source_kind(&self) -> SourceKind {
        match self.kind {
            EntryKind::Account | EntryKind::List | EntryKind::Query => SourceKind::Twitter,
            EntryKind::Subreddit => SourceKind::Reddit,
            EntryKind::Channel | EntryKind::Group => SourceKind::Telegram,
        }
    }
}
