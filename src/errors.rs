use axum::http::{HeaderMap, HeaderValue};
use axum::response::IntoResponse;
use reqwest::StatusCode;
use thiserror::Error;

/// Per-event drop reasons shared by every ingestion worker and the
/// Time-Sync Guard. Counted by the caller; never surfaced to external
/// consumers beyond aggregated metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    NotWhitelisted,
    SourceDisabled,
    GlobalRateExceeded,
    SourceRateExceeded,
    EmptyText,
    NoAssetKeyword,
    TimestampMissing,
    TimestampMalformed,
    RetweetWithoutQuote,
    PrivateAccount,
    Promoted,
    NoEngagement,
    DeletedAuthor,
    NonPositiveScore,
    DeletedBody,
    ForwardedUnknownSource,
    BotAuthored,
    Future,
    Late,
    OutOfOrder,
    Duplicate,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Db(sqlx::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found")]
    NotFound,
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("External error: {0}")]
    External(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("event dropped: {0}")]
    Dropped(DropReason),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::RateLimited(msg) => {
                let mut headers = HeaderMap::new();
                headers.insert("Retry-After", HeaderValue::from_static("60"));
                (StatusCode::TOO_MANY_REQUESTS, headers, msg).into_response()
            }
            AppError::External(msg) => (StatusCode::BAD_GATEWAY, msg).into_response(),
            AppError::Transport(msg) => (StatusCode::BAD_GATEWAY, msg).into_response(),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
            AppError::Dropped(reason) => {
                (StatusCode::UNPROCESSABLE_ENTITY, reason.to_string()).into_response()
            }
            AppError::Db(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response(),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(value: sqlx::Error) -> Self {
        AppError::Db(value)
    }
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        AppError::Validation(value)
    }
}

/// Errors from the optional LLM sentiment fallback. Kept distinct from
/// `AppError` because a classifier failure degrades sentiment output rather
/// than aborting the enrichment pipeline.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM fallback disabled")]
    Disabled,
    #[error("network error: {0}")]
    Network(String),
    #[error("LLM rate limited")]
    RateLimited,
    #[error("invalid LLM response: {0}")]
    InvalidResponse(String),
}
