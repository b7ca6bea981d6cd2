//! Error types for skinprice operations

use std::time::Duration;
use thiserror::Error;

/// Errors returned by a marketplace fetch.
///
/// `NotFound` is a definitive answer ("no listing"), every other variant is a
/// transient failure that qualifies for stale-cache fallback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Rate limited by marketplace (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Marketplace has no listing for this item")]
    NotFound,

    #[error("Network error: {reason}")]
    Network { reason: String },

    #[error("Fetch timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Gave up waiting for an in-flight fetch after {waited:?}")]
    LockContention { waited: Duration },
}

impl FetchError {
    /// Build a network error from any displayable cause.
    pub fn network(reason: impl Into<String>) -> Self {
        Self::Network {
            reason: reason.into(),
        }
    }

    /// True when the marketplace definitively has nothing for the item.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// True for failures where a stale cached price may be served instead.
    pub fn is_transient(&self) -> bool {
        !self.is_not_found()
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::NotFound => "not_found",
            Self::Network { .. } => "network_error",
            Self::Timeout { .. } => "timeout",
            Self::LockContention { .. } => "lock_contention",
        }
    }

    /// Generic warning shown next to a stale price.
    ///
    /// Never includes the underlying cause: connection details stay in logs.
    pub fn user_warning(&self) -> Option<&'static str> {
        match self {
            Self::RateLimited { .. } => {
                Some("Showing cached price: marketplace is rate limiting requests right now")
            }
            Self::Timeout { .. } => {
                Some("Showing cached price: marketplace did not respond in time")
            }
            Self::Network { .. } => {
                Some("Showing cached price: marketplace is temporarily unavailable")
            }
            Self::LockContention { .. } => {
                Some("Showing cached price: a refresh for this item is still in progress")
            }
            Self::NotFound => None,
        }
    }
}

/// Cache store errors. Every variant is fatal for a reconciliation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Cache store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache store operation '{operation}' timed out")]
    Timeout { operation: String },

    #[error("Corrupt cache row: {reason}")]
    Corrupt { reason: String },
}

impl StorageError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Input validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Item key must not be empty")]
    EmptyItemKey,

    #[error("Item key is {len} characters, maximum is {max}")]
    ItemKeyTooLong { len: usize, max: usize },

    #[error("Unknown marketplace: {value}")]
    UnknownSource { value: String },
}

/// Master error type for all skinprice errors.
#[derive(Debug, Clone, Error)]
pub enum SkinpriceError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl SkinpriceError {
    /// True when the cache store could not be reached.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Result type alias for skinprice operations.
pub type SkinpriceResult<T> = Result<T, SkinpriceError>;
