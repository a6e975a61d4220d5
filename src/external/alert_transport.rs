use async_trait::async_trait;
use thiserror::Error;

/// Outbound transport for the Alerter's advisory notifications. Distinct
/// from any ingestion credentials — spec.md §6 calls out `TELEGRAM_BOT_TOKEN`
/// / `TELEGRAM_CHANNEL_ID` as a separate outbound channel from the MTProto
/// ingestion session. This is send-only: the matching webhook receiver is
/// an explicit Non-goal.
#[async_trait]
pub trait AlertTransport: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), TransportError>;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("alert transport not configured")]
    Disabled,
    #[error("network error: {0}")]
    Network(String),
    #[error("transport rejected message: {0}")]
    Rejected(String),
}

/// Used when `TELEGRAM_BOT_TOKEN`/`TELEGRAM_CHANNEL_ID` are unset. Every
/// send fails with `Disabled`; the dispatcher's retry loop treats this like
/// any other transport failure (no rate-limit bookkeeping advances), so an
/// unconfigured deployment simply never succeeds at sending, rather than
/// silently pretending to.
pub struct NullTransport;

#[async_trait]
impl AlertTransport for NullTransport {
    async fn send(&self, _text: &str) -> Result<(), TransportError> {
        Err(TransportError::Disabled)
    }
}

pub struct TelegramBotTransport {
    client: reqwest::Client,
    bot_token: String,
    channel_id: String,
}

impl TelegramBotTransport {
    pub fn new(client: reqwest::Client, bot_token: String, channel_id: String) -> Self {
        Self {
            client,
            bot_token,
            channel_id,
        }
    }

    fn send_url(&self) -> String {
        format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token)
    }
}

#[async_trait]
impl AlertTransport for TelegramBotTransport {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        let body = serde_json::json!({
            "chat_id": self.channel_id,
            "text": text,
        });

        let response = self
            .client
            .post(self.send_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(TransportError::Rejected(format!("{status}: {body}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_transport_always_fails() {
        let transport = NullTransport;
        assert!(matches!(transport.send("hi").await, Err(TransportError::Disabled)));
    }
}
