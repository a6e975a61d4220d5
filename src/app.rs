use axum::Router;
use http::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::routes::health;
use crate::state::AppState;

/// Deliberately thin: liveness/readiness only. This is the ambient ops
/// surface every long-running service carries, not the excluded outward
/// context endpoint — the read interface of the enrichment pipeline is a
/// Rust function (`store::queries::query_context`), not a route.
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
            origin.as_bytes().starts_with(b"http://localhost:")
                || origin.as_bytes().starts_with(b"http://127.0.0.1:")
        }))
        .allow_methods([Method::GET])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    Router::<AppState>::new()
        .nest("/", health::router())
        .with_state(state)
        .layer(cors)
}
