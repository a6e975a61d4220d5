use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;

use crate::dqm::monitor::OverallQuality;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
}

async fn liveness() -> &'static str {
    "OK"
}

/// Reflects the Data Quality Monitor's current verdict. `critical` takes the
/// process out of rotation; `degraded` still serves, since degraded data
/// quality is advisory, not an outage.
async fn readiness(State(state): State<AppState>) -> (StatusCode, &'static str) {
    match state.dqm.overall() {
        OverallQuality::Healthy => (StatusCode::OK, "healthy"),
        OverallQuality::Degraded => (StatusCode::OK, "degraded"),
        OverallQuality::Critical => (StatusCode::SERVICE_UNAVAILABLE, "critical"),
    }
}
