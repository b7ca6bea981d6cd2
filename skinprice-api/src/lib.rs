//! Skinprice API - HTTP Layer
//!
//! Axum surface over the reconciliation engine: the price lookup route, the
//! scheduler-triggered cleanup route, health checks and Prometheus metrics,
//! plus the marketplace HTTP clients and environment configuration used by
//! the `skinprice-api` binary.

#[macro_use]
mod macros;

pub mod auth;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod providers;
pub mod routes;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use auth::{authorize_cron, CronSecret};
pub use config::{cache_policy_from_env, ApiConfig, StoreBackend};
pub use db::DbConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use providers::{build_fetchers, ProviderConfig};
pub use routes::create_api_router;
pub use state::{build_state, AppState, Settings};
