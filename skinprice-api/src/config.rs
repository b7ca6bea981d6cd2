//! API Configuration Module
//!
//! Server settings loaded from environment variables with development
//! defaults. Cache timing lives in [`skinprice_core::CachePolicy`] and sweep
//! timing in [`skinprice_storage::SweepConfig`]; both are loaded here too so
//! the binary has a single entry point for configuration.

use crate::auth::CronSecret;
use crate::constants::{DEFAULT_BIND_HOST, DEFAULT_CORS_MAX_AGE_SECS, DEFAULT_PORT};
use crate::error::{ApiError, ApiResult};
use skinprice_core::{CachePolicy, ConfigError};
use skinprice_storage::SweepConfig;
use std::net::SocketAddr;

// ============================================================================
// STORE BACKEND
// ============================================================================

/// Which price cache backs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// Shared PostgreSQL table (default)
    #[default]
    Postgres,

    /// Process-local map, for single-instance development
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(StoreBackend::Postgres),
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::InvalidValue {
                field: "SKINPRICE_STORE".to_string(),
                value: other.to_string(),
                reason: "expected 'postgres' or 'memory'".to_string(),
            }),
        }
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind host (default: 0.0.0.0)
    pub bind_host: String,

    /// Listen port (default: 3000)
    pub port: u16,

    /// Shared secret for the cleanup route. `None` disables the route.
    pub cron_secret: Option<CronSecret>,

    /// Which price cache to use
    pub store: StoreBackend,

    /// Coordinate refreshes across instances with database advisory locks.
    /// Ignored for the in-memory store.
    pub distributed_lock: bool,

    /// Run the background cleanup sweeper in-process
    pub sweep_enabled: bool,

    /// Allowed CORS origins. Empty means allow all.
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds
    pub cors_max_age_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            cron_secret: None,
            store: StoreBackend::default(),
            distributed_lock: false,
            sweep_enabled: true,
            cors_origins: Vec::new(),
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `SKINPRICE_API_BIND`: Bind host (default: 0.0.0.0)
    /// - `PORT` or `SKINPRICE_API_PORT`: Listen port (default: 3000)
    /// - `SKINPRICE_CRON_SECRET`: Shared secret for `/api/cron/cleanup`
    /// - `SKINPRICE_STORE`: "postgres" or "memory" (default: postgres)
    /// - `SKINPRICE_DISTRIBUTED_LOCK`: "true" or "false" (default: false)
    /// - `SKINPRICE_SWEEP_ENABLED`: "true" or "false" (default: true)
    /// - `SKINPRICE_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    pub fn from_env() -> ApiResult<Self> {
        let bind_host =
            std::env::var("SKINPRICE_API_BIND").unwrap_or_else(|_| DEFAULT_BIND_HOST.to_string());

        let port = match std::env::var("PORT")
            .ok()
            .or_else(|| std::env::var("SKINPRICE_API_PORT").ok())
        {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                ApiError::configuration_error(format!("Invalid port value: {}", raw))
            })?,
            None => DEFAULT_PORT,
        };

        let cron_secret = match std::env::var("SKINPRICE_CRON_SECRET") {
            Ok(raw) if !raw.trim().is_empty() => Some(CronSecret::new(raw)?),
            _ => {
                tracing::warn!("SKINPRICE_CRON_SECRET not set; cleanup endpoint disabled");
                None
            }
        };

        let store = match std::env::var("SKINPRICE_STORE") {
            Ok(raw) => raw.parse::<StoreBackend>()?,
            Err(_) => StoreBackend::default(),
        };

        let distributed_lock = env_flag("SKINPRICE_DISTRIBUTED_LOCK", false);
        let sweep_enabled = env_flag("SKINPRICE_SWEEP_ENABLED", true);

        let cors_origins = std::env::var("SKINPRICE_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind_host,
            port,
            cron_secret,
            store,
            distributed_lock,
            sweep_enabled,
            cors_origins,
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
        })
    }

    /// Socket address to listen on.
    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind_host, self.port);
        addr.parse::<SocketAddr>().map_err(|e| {
            ApiError::configuration_error(format!("Invalid bind address {}: {}", addr, e))
        })
    }
}

/// Load and validate the cache timing policy.
pub fn cache_policy_from_env() -> ApiResult<CachePolicy> {
    Ok(CachePolicy::from_env()?)
}

/// Load the sweeper configuration.
pub fn sweep_config_from_env() -> SweepConfig {
    SweepConfig::from_env()
}

/// Read a boolean flag. Anything other than "true"/"1"/"yes" is false.
pub(crate) fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|s| parse_flag(&s))
        .unwrap_or(default)
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.store, StoreBackend::Postgres);
        assert!(config.cron_secret.is_none());
        assert!(config.sweep_enabled);
        assert!(!config.distributed_lock);
    }

    #[test]
    fn test_bind_addr() {
        let config = ApiConfig {
            bind_host: "127.0.0.1".to_string(),
            port: 8080,
            ..ApiConfig::default()
        };
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:8080");

        let config = ApiConfig {
            bind_host: "not a host".to_string(),
            ..ApiConfig::default()
        };
        let err = config.bind_addr().unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::ConfigurationError);
    }

    #[test]
    fn test_store_backend_parsing() {
        assert_eq!("postgres".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert_eq!("MEMORY".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" TRUE "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("maybe"));
    }
}
