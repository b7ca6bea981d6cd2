//! Cache store trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skinprice_core::{CacheEntry, ItemKey, PriceQuote, SourceId, StorageError};
use std::time::Duration;

/// Result type for store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Typed access to the price cache table, keyed by (item, source).
///
/// Implementations read "now" from their own clock so that `cached_at` and
/// `expires_at` are always stamped at write time.
///
/// # Errors
///
/// Every method surfaces an unreachable store as [`StorageError`]. Callers
/// treat those as fatal for the reconciliation in progress.
#[async_trait]
pub trait PriceCacheStore: Send + Sync {
    /// Rows for the item whose `expires_at` is after now.
    async fn lookup_valid(&self, item: &ItemKey) -> StorageResult<Vec<CacheEntry>>;

    /// Every row for the item, expired or not.
    async fn lookup_all(&self, item: &ItemKey) -> StorageResult<Vec<CacheEntry>>;

    /// Insert or replace the row for (item, source).
    ///
    /// Sets `cached_at = now` and `expires_at = now + ttl`. Returns the row as
    /// written.
    async fn upsert(
        &self,
        item: &ItemKey,
        source: SourceId,
        quote: &PriceQuote,
        ttl: Duration,
    ) -> StorageResult<CacheEntry>;

    /// Re-arm an existing row: `expires_at = now + ttl`, price and
    /// `cached_at` untouched.
    ///
    /// Returns `None` when no row exists for the pair.
    async fn extend_expiry(
        &self,
        item: &ItemKey,
        source: SourceId,
        ttl: Duration,
    ) -> StorageResult<Option<CacheEntry>>;

    /// Delete rows whose `expires_at` is before `cutoff`. Returns the count.
    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64>;

    /// Cheap reachability check used by readiness probes.
    async fn ping(&self) -> StorageResult<()>;
}
