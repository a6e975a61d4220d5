use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::{sleep, Duration};

use crate::errors::LlmError;

const SYSTEM_PROMPT: &str = "You are a sentiment classifier for crypto-asset social media posts. \
Respond only with a compact JSON object of the form {\"label\": -1|0|1, \"confidence\": 0.0-1.0}, \
where -1 is bearish, 0 is neutral, and 1 is bullish. Do not include any other text.";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LlmVerdict {
    pub label: crate::models::sentiment_event::Label,
    pub confidence: f64,
}

/// Pluggable sentiment classifier, mirrored on the teacher's
/// `PriceProvider`/`LlmProvider` trait shape: swappable, async, and
/// fallible in a way that degrades rather than aborts the pipeline.
#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<LlmVerdict, LlmError>;
}

/// Used whenever `LLM_API_KEY` is unset. Always returns `Disabled` so
/// callers fall back to the rule score's own label with no confidence
/// adjustment.
pub struct NullClassifier;

#[async_trait]
impl SentimentClassifier for NullClassifier {
    async fn classify(&self, _text: &str) -> Result<LlmVerdict, LlmError> {
        Err(LlmError::Disabled)
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct VerdictJson {
    label: i32,
    confidence: f64,
}

pub struct HttpLlmClassifier {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl HttpLlmClassifier {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
        }
    }

    async fn call_once(&self, text: &str) -> Result<LlmVerdict, LlmError> {
        let body = serde_json::json!({
            "model": "gpt-4o-mini",
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": text},
            ],
            "temperature": 0.0,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(LlmError::Network(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::InvalidResponse("empty choices".to_string()))?;

        let verdict: VerdictJson = serde_json::from_str(content.trim())
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        if !(-1..=1).contains(&verdict.label) {
            return Err(LlmError::InvalidResponse(format!(
                "unrecognized label: {}",
                verdict.label
            )));
        }

        Ok(LlmVerdict {
            label: verdict.label,
            confidence: verdict.confidence.clamp(0.0, 1.0),
        })
    }
}

#[async_trait]
impl SentimentClassifier for HttpLlmClassifier {
    /// Retries with exponential backoff (1s, 2s, 4s) on network/rate-limit
    /// failures, the same schedule the teacher's OpenAI provider uses.
    async fn classify(&self, text: &str) -> Result<LlmVerdict, LlmError> {
        let mut delay = Duration::from_secs(1);
        let mut last_err = LlmError::Network("unreachable".to_string());

        for attempt in 0..3 {
            match self.call_once(text).await {
                Ok(verdict) => return Ok(verdict),
                Err(LlmError::InvalidResponse(msg)) => {
                    return Err(LlmError::InvalidResponse(msg));
                }
                Err(e) => {
                    last_err = e;
                    if attempt < 2 {
                        sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }
        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_classifier_always_disabled() {
        let classifier = NullClassifier;
        let result = classifier.classify("to the moon").await;
        assert!(matches!(result, Err(LlmError::Disabled)));
    }
}
