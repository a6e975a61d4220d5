use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

/// One upstream message, before whitelist/filter/metric processing. Field
/// names mirror `original_source/telegram_crawler.py`'s message record.
#[derive(Debug, Clone)]
pub struct TelegramItem {
    pub message_id: i64,
    pub chat_id: i64,
    pub text: String,
    pub date: Option<DateTime<Utc>>,
    pub forwarded: bool,
    pub forward_source_known: bool,
    pub bot_authored: bool,
}

#[derive(Debug, Error)]
pub enum TelegramClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("rate limited by upstream")]
    RateLimited,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Fetches recent messages from a whitelisted channel or group. Telegram's
/// ingestion surface is MTProto (a persistent user session authenticated
/// via `TELEGRAM_API_ID`/`API_HASH`/`PHONE`), which this trait abstracts so
/// the worker never depends on the concrete client library.
#[async_trait]
pub trait TelegramClient: Send + Sync {
    async fn fetch_recent(&self, chat_id: i64, cap: u32) -> Result<Vec<TelegramItem>, TelegramClientError>;
}

#[derive(Deserialize)]
struct BotApiResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<UpdateEnvelope>,
}

#[derive(Deserialize)]
struct UpdateEnvelope {
    #[serde(default)]
    message: Option<BotApiMessage>,
    #[serde(default)]
    channel_post: Option<BotApiMessage>,
}

#[derive(Deserialize)]
struct BotApiMessage {
    message_id: i64,
    #[serde(default)]
    text: String,
    date: i64,
    #[serde(default)]
    forward_from: Option<serde_json::Value>,
    #[serde(default)]
    forward_from_chat: Option<serde_json::Value>,
    #[serde(default)]
    forward_sender_name: Option<String>,
    #[serde(default)]
    from: Option<BotApiUser>,
}

#[derive(Deserialize)]
struct BotApiUser {
    #[serde(default)]
    is_bot: bool,
}

/// Long-poll-style read using the Bot API's `getUpdates`, used here as a
/// read-only ingestion transport distinct from the outbound alert bot
/// (`external::alert_transport::TelegramBotTransport`). A production
/// deployment that needs to read from channels the bot isn't a member of
/// would instead authenticate the MTProto session described by
/// `TELEGRAM_API_ID`/`API_HASH`/`PHONE`; this implementation covers the
/// bot-joined-chat case without pulling in a separate MTProto crate.
pub struct HttpTelegramClient {
    client: reqwest::Client,
    bot_token: String,
}

impl HttpTelegramClient {
    pub fn new(client: reqwest::Client, bot_token: String) -> Self {
        Self { client, bot_token }
    }
}

#[async_trait]
impl TelegramClient for HttpTelegramClient {
    async fn fetch_recent(&self, chat_id: i64, cap: u32) -> Result<Vec<TelegramItem>, TelegramClientError> {
        let url = format!("https://api.telegram.org/bot{}/getUpdates", self.bot_token);

        let response = self
            .client
            .get(&url)
            .query(&[("limit", cap.clamp(1, 100).to_string())])
            .send()
            .await
            .map_err(|e| TelegramClientError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(TelegramClientError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(TelegramClientError::InvalidResponse(format!("status {}", response.status())));
        }

        let parsed: BotApiResponse = response
            .json()
            .await
            .map_err(|e| TelegramClientError::InvalidResponse(e.to_string()))?;

        if !parsed.ok {
            return Err(TelegramClientError::InvalidResponse("upstream returned ok=false".to_string()));
        }

        Ok(parsed
            .result
            .into_iter()
            .filter_map(|update| update.message.or(update.channel_post))
            .map(|msg| TelegramItem {
                message_id: msg.message_id,
                chat_id,
                text: msg.text,
                date: DateTime::from_timestamp(msg.date, 0),
                forwarded: msg.forward_from.is_some() || msg.forward_from_chat.is_some() || msg.forward_sender_name.is_some(),
                forward_source_known: msg.forward_from.is_some() || msg.forward_from_chat.is_some(),
                bot_authored: msg.from.as_ref().is_some_and(|u| u.is_bot),
            })
            .collect())
    }
}
