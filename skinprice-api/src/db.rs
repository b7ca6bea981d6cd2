//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling with deadpool-postgres. Queries live in
//! [`skinprice_storage::PostgresPriceStore`]; this module only builds the pool.

use crate::error::{ApiError, ApiResult};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio_postgres::NoTls;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: SecretString,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection acquire timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "skinprice".to_string(),
            user: "postgres".to_string(),
            password: SecretString::default(),
            max_size: 16,
            timeout: Duration::from_secs(5),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SKINPRICE_DB_HOST` (default: localhost)
    /// - `SKINPRICE_DB_PORT` (default: 5432)
    /// - `SKINPRICE_DB_NAME` (default: skinprice)
    /// - `SKINPRICE_DB_USER` (default: postgres)
    /// - `SKINPRICE_DB_PASSWORD` (default: empty)
    /// - `SKINPRICE_DB_POOL_SIZE` (default: 16)
    /// - `SKINPRICE_DB_TIMEOUT`: Acquire timeout in seconds (default: 5)
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("SKINPRICE_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("SKINPRICE_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("SKINPRICE_DB_NAME").unwrap_or_else(|_| "skinprice".to_string()),
            user: std::env::var("SKINPRICE_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: SecretString::from(std::env::var("SKINPRICE_DB_PASSWORD").unwrap_or_default()),
            max_size: std::env::var("SKINPRICE_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("SKINPRICE_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    ///
    /// Connections are recycled with `RecyclingMethod::Clean`, which discards
    /// session state such as advisory locks left behind by a dropped lease.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.expose_secret().to_string());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Clean,
        });

        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        pool_cfg.timeouts.create = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}
