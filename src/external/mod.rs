pub mod alert_transport;
pub mod reddit_client;
pub mod telegram_client;
pub mod twitter_client;
