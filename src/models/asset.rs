use serde::{Deserialize, Serialize};

/// A tracked asset and the keywords that identify mentions of it in raw
/// text. Loaded from the database and cached by `AssetRegistry`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub display_name: String,
    pub keywords: Vec<String>,
    pub active: bool,
    /// Higher priority wins ties when two assets share a keyword.
    pub priority: i32,
}
