//! HTTP, WebSocket and event-stream surface of the ollqd gateway.

pub mod handlers;
pub mod infra;
pub mod routes;

use axum::{Router, http::HeaderValue};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

pub use infra::{app_state::AppState, config::Config};

/// Full application router with middleware and state attached.
pub fn build_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config()
        .server
        .cors_allowed_origins
        .iter()
        .filter_map(|s| HeaderValue::from_str(s).ok())
        .collect();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    let cors_layer = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::create_api_router()
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
