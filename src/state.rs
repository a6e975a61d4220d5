use std::sync::Arc;

use sqlx::PgPool;

use crate::alerter::Alerter;
use crate::dqm::monitor::DataQualityMonitor;
use crate::enrichment::llm::SentimentClassifier;
use crate::registries::asset_registry::AssetRegistry;
use crate::registries::source_registry::SourceRegistry;

/// Shared, cloneable handle threaded through the scheduler loops and the
/// thin health-check router. Every field is itself cheaply cloneable
/// (`PgPool`, `Arc<...>`), matching the teacher's `AppState` shape. The
/// axum routes only ever read `dqm`; the rest is carried here so `main.rs`
/// has one place that owns every long-lived collaborator.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub asset_registry: Arc<AssetRegistry>,
    pub source_registry: Arc<SourceRegistry>,
    pub classifier: Arc<dyn SentimentClassifier>,
    pub dqm: Arc<DataQualityMonitor>,
    pub alerter: Arc<Alerter>,
}
