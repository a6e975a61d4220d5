use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// One upstream submission, before whitelist/filter/metric processing.
/// Field names mirror `original_source/reddit_crawler.py`'s `RedditPost`
/// dataclass.
#[derive(Debug, Clone)]
pub struct RedditItem {
    pub post_id: String,
    pub subreddit: String,
    pub title: String,
    pub body: String,
    pub author: String,
    pub author_karma: u64,
    pub score: i64,
    pub num_comments: u64,
    pub created_utc: f64,
}

#[derive(Debug, Error)]
pub enum RedditClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("rate limited by upstream")]
    RateLimited,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait RedditClient: Send + Sync {
    async fn fetch_new(&self, subreddit: &str, cap: u32) -> Result<Vec<RedditItem>, RedditClientError>;
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    children: Vec<Child>,
}

#[derive(Deserialize)]
struct Child {
    data: PostData,
}

#[derive(Deserialize)]
struct PostData {
    id: String,
    subreddit: String,
    #[serde(default)]
    title: String,
    #[serde(default, rename = "selftext")]
    body: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    author_karma: Option<u64>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: u64,
    #[serde(default)]
    created_utc: f64,
}

const USER_AGENT: &str = "social-context-pipeline/0.1 (read-only ingestion)";

/// Reddit's public, unauthenticated `.json` listing endpoint — no OAuth
/// credentials needed for a read-only `new` listing, the same surface
/// `original_source/reddit_crawler.py` used (`urllib.request` + a fixed
/// User-Agent).
pub struct HttpRedditClient {
    client: reqwest::Client,
}

impl HttpRedditClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RedditClient for HttpRedditClient {
    async fn fetch_new(&self, subreddit: &str, cap: u32) -> Result<Vec<RedditItem>, RedditClientError> {
        let url = format!("https://www.reddit.com/r/{subreddit}/new.json?limit={}", cap.clamp(1, 100));

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| RedditClientError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(RedditClientError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(RedditClientError::InvalidResponse(format!("status {}", response.status())));
        }

        let listing: Listing = response
            .json()
            .await
            .map_err(|e| RedditClientError::InvalidResponse(e.to_string()))?;

        Ok(listing
            .data
            .children
            .into_iter()
            .map(|child| RedditItem {
                post_id: child.data.id,
                subreddit: child.data.subreddit,
                title: child.data.title,
                body: child.data.body,
                author: child.data.author,
                author_karma: child.data.author_karma.unwrap_or(0),
                score: child.data.score,
                num_comments: child.data.num_comments,
                created_utc: child.data.created_utc,
            })
            .collect())
    }
}
