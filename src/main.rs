use std::net::SocketAddr;
use std::sync::Arc;

use social_context_pipeline::alerter::Alerter;
use social_context_pipeline::app;
use social_context_pipeline::config::{
    self, AlertTransportConfig, DbConfig, LlmConfig, ProxyConfig, SchedulerConfig,
};
use social_context_pipeline::dqm::monitor::DataQualityMonitor;
use social_context_pipeline::enrichment::fear_greed::{FearGreedSource, NullFearGreedSource};
use social_context_pipeline::enrichment::llm::{HttpLlmClassifier, NullClassifier, SentimentClassifier};
use social_context_pipeline::external::alert_transport::{AlertTransport, NullTransport, TelegramBotTransport};
use social_context_pipeline::external::reddit_client::HttpRedditClient;
use social_context_pipeline::external::telegram_client::HttpTelegramClient;
use social_context_pipeline::external::twitter_client::HttpTwitterClient;
use social_context_pipeline::ingestion::reddit_worker::RedditWorker;
use social_context_pipeline::ingestion::telegram_worker::TelegramWorker;
use social_context_pipeline::ingestion::twitter_worker::TwitterWorker;
use social_context_pipeline::logging::{self, LoggingConfig};
use social_context_pipeline::registries::asset_registry::AssetRegistry;
use social_context_pipeline::registries::source_registry::SourceRegistry;
use social_context_pipeline::scheduler::Scheduler;
use social_context_pipeline::state::AppState;
use social_context_pipeline::store::event_store::EventStore;

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

/// Wires every collaborator named in spec.md §2 and starts both the
/// scheduler's four background loops and the thin liveness/readiness
/// router. Mirrors the teacher's `main.rs` shape (load env, build pool,
/// init logging, build the axum app, serve) but the "app" here is a
/// supervised pipeline with an HTTP surface bolted on for ops, not the
/// other way around.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    logging::init_logging(LoggingConfig::from_env())?;

    let db_config = DbConfig::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&db_config.connection_string())
        .await?;

    let asset_registry = Arc::new(AssetRegistry::load(pool.clone()).await?);
    let source_registry = Arc::new(SourceRegistry::load(pool.clone()).await?);
    let store = Arc::new(EventStore::new(pool.clone()));

    let proxy_config = ProxyConfig::from_env();
    let http_client = proxy_config.build_client()?;

    let twitter_client = Arc::new(HttpTwitterClient::new(http_client.clone(), config::twitter_bearer_token()?));
    let reddit_client = Arc::new(HttpRedditClient::new(http_client.clone()));
    let telegram_client = Arc::new(HttpTelegramClient::new(http_client.clone(), config::telegram_bot_token()?));

    let twitter_worker = TwitterWorker::new(source_registry.clone(), asset_registry.clone(), twitter_client);
    let reddit_worker = RedditWorker::new(source_registry.clone(), asset_registry.clone(), reddit_client);
    let telegram_worker = TelegramWorker::new(source_registry.clone(), asset_registry.clone(), telegram_client);

    let llm_config = LlmConfig::from_env();
    let classifier: Arc<dyn SentimentClassifier> = if llm_config.is_enabled() {
        Arc::new(HttpLlmClassifier::new(http_client.clone(), llm_config.api_key.clone().unwrap()))
    } else {
        Arc::new(NullClassifier)
    };

    let fear_greed: Arc<dyn FearGreedSource> = Arc::new(NullFearGreedSource);

    let dqm = Arc::new(DataQualityMonitor::new());

    let alert_transport_config = AlertTransportConfig::from_env();
    let alert_transport: Arc<dyn AlertTransport> = if alert_transport_config.is_configured() {
        Arc::new(TelegramBotTransport::new(
            http_client.clone(),
            alert_transport_config.bot_token.clone().unwrap(),
            alert_transport_config.channel_id.clone().unwrap(),
        ))
    } else {
        tracing::warn!("alert transport not configured, alerts will be logged only");
        Arc::new(NullTransport)
    };
    let alerter = Arc::new(Alerter::new(alert_transport));

    let scheduler_config = SchedulerConfig::default();

    let scheduler = Arc::new(Scheduler::new(
        twitter_worker,
        reddit_worker,
        telegram_worker,
        store.clone(),
        classifier.clone(),
        fear_greed,
        dqm.clone(),
        alerter.clone(),
        scheduler_config,
        config::scheduler_state_path(),
    ));
    let handle = scheduler.run();

    let state = AppState {
        pool,
        asset_registry,
        source_registry,
        classifier,
        dqm,
        alerter,
    };
    let app = app::create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "social context pipeline running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    handle.shutdown(scheduler_config.shutdown_deadline).await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
