//! REST API Routes
//!
//! - `/api/prices/*item` - reconciled marketplace prices
//! - `/api/cron/cleanup` - scheduler-triggered sweep (shared secret)
//! - `/health/*` - liveness and readiness
//! - `/metrics` - Prometheus scrape endpoint

pub mod cron;
pub mod health;
pub mod prices;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn,
    routing::get,
    Router,
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::CRON_SECRET_HEADER;
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub use cron::create_router as cron_router;
pub use health::create_router as health_router;
pub use prices::create_router as prices_router;

fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(CRON_SECRET_HEADER),
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(
            "CORS: Production mode - allowing origins: {:?}",
            config.cors_origins
        );
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

async fn fallback() -> ApiError {
    ApiError::not_found("No such route")
}

/// Create the complete API router.
pub fn create_api_router(state: AppState, api_config: &ApiConfig) -> Router {
    Router::new()
        .nest("/api/prices", prices::create_router())
        .nest("/api/cron", cron::create_router())
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler))
        .fallback(fallback)
        .layer(from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(api_config))
        .with_state(state)
}
