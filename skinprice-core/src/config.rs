//! Cache policy configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// Default time-to-live for a cached price (5 minutes).
pub const DEFAULT_TTL_SECS: u64 = 300;

/// Default per-source fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 4_000;

/// Default soft ceiling for one whole reconciliation.
pub const DEFAULT_RECONCILE_CEILING_MS: u64 = 6_000;

/// Default bound on a single cache store call.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2_000;

/// Default bound on waiting for another caller's in-flight fetch.
pub const DEFAULT_LOCK_WAIT_MS: u64 = 5_000;

/// Default delay between cache polls while another instance holds the fetch lock.
pub const DEFAULT_LOCK_POLL_MS: u64 = 250;

/// Timing policy for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// How long a freshly written price stays valid.
    pub ttl: Duration,
    /// Timeout applied to each marketplace fetch independently.
    pub fetch_timeout: Duration,
    /// Soft ceiling covering the slowest of the parallel fetches.
    pub reconcile_ceiling: Duration,
    /// Timeout applied to each cache store call.
    pub store_timeout: Duration,
    /// How long a waiter blocks on another caller's fetch before giving up.
    pub lock_wait: Duration,
    /// Poll interval used while another instance holds the distributed fetch lock.
    pub lock_poll_interval: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            fetch_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            reconcile_ceiling: Duration::from_millis(DEFAULT_RECONCILE_CEILING_MS),
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            lock_wait: Duration::from_millis(DEFAULT_LOCK_WAIT_MS),
            lock_poll_interval: Duration::from_millis(DEFAULT_LOCK_POLL_MS),
        }
    }
}

impl CachePolicy {
    /// Create a policy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the per-source fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set the reconciliation ceiling.
    pub fn with_reconcile_ceiling(mut self, ceiling: Duration) -> Self {
        self.reconcile_ceiling = ceiling;
        self
    }

    /// Set the store call timeout.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Set the single-flight wait bound.
    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    /// Set the distributed-lock poll interval.
    pub fn with_lock_poll_interval(mut self, interval: Duration) -> Self {
        self.lock_poll_interval = interval;
        self
    }

    /// Create a policy from environment variables, then validate it.
    ///
    /// # Environment Variables
    /// - `SKINPRICE_CACHE_TTL_SECS`: Cache TTL (default: 300)
    /// - `SKINPRICE_FETCH_TIMEOUT_MS`: Per-source fetch timeout (default: 4000)
    /// - `SKINPRICE_RECONCILE_CEILING_MS`: Whole-reconciliation ceiling (default: 6000)
    /// - `SKINPRICE_STORE_TIMEOUT_MS`: Store call timeout (default: 2000)
    /// - `SKINPRICE_LOCK_WAIT_MS`: Single-flight wait bound (default: 5000)
    /// - `SKINPRICE_LOCK_POLL_MS`: Distributed-lock poll interval (default: 250)
    ///
    /// Unset variables fall back to defaults; set but unparsable ones are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        let policy = Self {
            ttl: Duration::from_secs(env_u64("SKINPRICE_CACHE_TTL_SECS", DEFAULT_TTL_SECS)?),
            fetch_timeout: Duration::from_millis(env_u64(
                "SKINPRICE_FETCH_TIMEOUT_MS",
                DEFAULT_FETCH_TIMEOUT_MS,
            )?),
            reconcile_ceiling: Duration::from_millis(env_u64(
                "SKINPRICE_RECONCILE_CEILING_MS",
                DEFAULT_RECONCILE_CEILING_MS,
            )?),
            store_timeout: Duration::from_millis(env_u64(
                "SKINPRICE_STORE_TIMEOUT_MS",
                DEFAULT_STORE_TIMEOUT_MS,
            )?),
            lock_wait: Duration::from_millis(env_u64("SKINPRICE_LOCK_WAIT_MS", DEFAULT_LOCK_WAIT_MS)?),
            lock_poll_interval: Duration::from_millis(env_u64(
                "SKINPRICE_LOCK_POLL_MS",
                DEFAULT_LOCK_POLL_MS,
            )?),
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Check the policy is internally consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "ttl".to_string(),
                value: "0".to_string(),
                reason: "cached prices would never be valid".to_string(),
            });
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "fetch_timeout".to_string(),
                value: "0".to_string(),
                reason: "every fetch would time out".to_string(),
            });
        }
        if self.fetch_timeout > self.reconcile_ceiling {
            return Err(ConfigError::InvalidValue {
                field: "fetch_timeout".to_string(),
                value: format!("{:?}", self.fetch_timeout),
                reason: format!(
                    "must not exceed reconcile_ceiling ({:?})",
                    self.reconcile_ceiling
                ),
            });
        }
        if self.lock_poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "lock_poll_interval".to_string(),
                value: "0".to_string(),
                reason: "polling would spin".to_string(),
            });
        }
        Ok(())
    }
}

fn env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => parse_u64(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_u64(field: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
            reason: "expected a non-negative integer".to_string(),
        })
}
