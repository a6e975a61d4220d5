use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

/// One upstream item as returned by the platform, before any whitelist,
/// filter, or metric computation runs — the `twitter_worker` owns all of
/// that. Field names mirror `original_source/twitter_crawler.py`'s `Tweet`
/// dataclass.
#[derive(Debug, Clone)]
pub struct TwitterItem {
    pub tweet_id: String,
    pub author_handle: String,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
    pub like_count: u64,
    pub retweet_count: u64,
    pub reply_count: u64,
    pub follower_count: u64,
    pub is_retweet: bool,
    /// Present on a retweet-with-quote; `None` on a bare retweet.
    pub quoted_text: Option<String>,
    pub author_private: bool,
    pub is_promoted: bool,
}

#[derive(Debug, Error)]
pub enum TwitterClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("rate limited by upstream")]
    RateLimited,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Fetches recent public content for one whitelisted account, list, or
/// search query. Implementations own their own upstream auth; the worker
/// only ever sees normalized `TwitterItem`s.
#[async_trait]
pub trait TwitterClient: Send + Sync {
    async fn fetch_recent(&self, handle: &str, cap: u32) -> Result<Vec<TwitterItem>, TwitterClientError>;
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<ApiTweet>,
    #[serde(default)]
    includes: Option<ApiIncludes>,
}

#[derive(Deserialize)]
struct ApiIncludes {
    #[serde(default)]
    users: Vec<ApiUser>,
}

#[derive(Deserialize)]
struct ApiUser {
    id: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    protected: bool,
    #[serde(default)]
    public_metrics: ApiUserMetrics,
}

#[derive(Deserialize, Default)]
struct ApiUserMetrics {
    #[serde(default)]
    followers_count: u64,
}

#[derive(Deserialize)]
struct ApiTweet {
    id: String,
    text: String,
    author_id: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    public_metrics: ApiTweetMetrics,
    #[serde(default)]
    promoted_metrics: Option<serde_json::Value>,
}

#[derive(Deserialize, Default)]
struct ApiTweetMetrics {
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    retweet_count: u64,
    #[serde(default)]
    reply_count: u64,
}

/// Speaks the v2 recent-search API shape used by `original_source/
/// twitter_crawler.py`'s production fetch path. Requires a bearer token;
/// `handle` is interpreted as a search query (`from:handle` for an
/// account, the raw query text for a `query` entry).
pub struct HttpTwitterClient {
    client: reqwest::Client,
    bearer_token: String,
    endpoint: String,
}

impl HttpTwitterClient {
    pub fn new(client: reqwest::Client, bearer_token: String) -> Self {
        Self {
            client,
            bearer_token,
            endpoint: "https://api.twitter.com/2/tweets/search/recent".to_string(),
        }
    }
}

#[async_trait]
impl TwitterClient for HttpTwitterClient {
    async fn fetch_recent(&self, handle: &str, cap: u32) -> Result<Vec<TwitterItem>, TwitterClientError> {
        let response = self
            .client
            .get(&self.endpoint)
            .bearer_auth(&self.bearer_token)
            .query(&[
                ("query", handle.to_string()),
                ("max_results", cap.clamp(10, 100).to_string()),
                (
                    "tweet.fields",
                    "created_at,public_metrics,promoted_metrics,referenced_tweets".to_string(),
                ),
                ("expansions", "author_id".to_string()),
                ("user.fields", "public_metrics,protected".to_string()),
            ])
            .send()
            .await
            .map_err(|e| TwitterClientError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(TwitterClientError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(TwitterClientError::InvalidResponse(format!("status {}", response.status())));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| TwitterClientError::InvalidResponse(e.to_string()))?;

        let users: std::collections::HashMap<String, ApiUser> = parsed
            .includes
            .map(|inc| inc.users.into_iter().map(|u| (u.id.clone(), u)).collect())
            .unwrap_or_default();

        Ok(parsed
            .data
            .into_iter()
            .map(|tweet| {
                let author = users.get(&tweet.author_id);
                TwitterItem {
                    tweet_id: tweet.id,
                    author_handle: author.map(|u| u.username.clone()).unwrap_or_default(),
                    text: tweet.text,
                    created_at: tweet.created_at,
                    like_count: tweet.public_metrics.like_count,
                    retweet_count: tweet.public_metrics.retweet_count,
                    reply_count: tweet.public_metrics.reply_count,
                    follower_count: author.map(|u| u.public_metrics.followers_count).unwrap_or(0),
                    is_retweet: false,
                    quoted_text: None,
                    author_private: author.is_some_and(|u| u.protected),
                    is_promoted: tweet.promoted_metrics.is_some(),
                }
            })
            .collect())
    }
}
