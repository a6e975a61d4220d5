use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::ingestion::fingerprint::text_fingerprint;

const WINDOW: Duration = Duration::from_secs(5 * 60);
const DISTINCT_CHAT_THRESHOLD: usize = 3;

/// Flags coordinated posting: the same (near-)identical message appearing
/// across several distinct Telegram chats within a short window. Identity
/// is the content fingerprint, not exact text, so trivial
/// digit/punctuation variations don't evade detection.
pub struct ManipulationDetector {
    // fingerprint -> (chat_id -> last seen)
    history: Mutex<HashMap<String, HashMap<i64, Instant>>>,
}

impl ManipulationDetector {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Records a sighting of `text` in `chat_id` and returns the number of
    /// distinct chats that have shown matching content within the window.
    pub fn record_and_check(&self, text: &str, chat_id: i64, now: Instant) -> usize {
        let fp = text_fingerprint(text);
        let mut history = self.history.lock();
        let chats = history.entry(fp).or_default();
        chats.retain(|_, seen_at| now.duration_since(*seen_at) < WINDOW);
        chats.insert(chat_id, now);
        chats.len()
    }

    pub fn is_manipulation(&self, distinct_chats: usize) -> bool {
        distinct_chats >= DISTINCT_CHAT_THRESHOLD
    }
}

impl Default for ManipulationDetector {
    fn default() -> Self {
        Self::new()
    }
}
