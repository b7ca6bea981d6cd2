//! In-process price store.
//!
//! A map behind an async lock. Suitable for a single instance and for tests;
//! multi-instance deployments use [`super::PostgresPriceStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skinprice_core::{
    expiry_from, CacheEntry, Clock, ItemKey, PriceQuote, SourceId, SystemClock,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::traits::{PriceCacheStore, StorageResult};

/// In-memory [`PriceCacheStore`].
#[derive(Debug, Clone)]
pub struct InMemoryPriceStore {
    rows: Arc<RwLock<HashMap<(ItemKey, SourceId), CacheEntry>>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryPriceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPriceStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Put a row in place as-is, bypassing the clock. Test seeding only.
    pub async fn insert_raw(&self, entry: CacheEntry) {
        let key = (entry.item_key.clone(), entry.source);
        self.rows.write().await.insert(key, entry);
    }

    /// Current row for a pair, regardless of expiry.
    pub async fn get(&self, item: &ItemKey, source: SourceId) -> Option<CacheEntry> {
        self.rows
            .read()
            .await
            .get(&(item.clone(), source))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl PriceCacheStore for InMemoryPriceStore {
    async fn lookup_valid(&self, item: &ItemKey) -> StorageResult<Vec<CacheEntry>> {
        let now = self.clock.now();
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|e| &e.item_key == item && e.is_valid_at(now))
            .cloned()
            .collect())
    }

    async fn lookup_all(&self, item: &ItemKey) -> StorageResult<Vec<CacheEntry>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|e| &e.item_key == item)
            .cloned()
            .collect())
    }

    async fn upsert(
        &self,
        item: &ItemKey,
        source: SourceId,
        quote: &PriceQuote,
        ttl: Duration,
    ) -> StorageResult<CacheEntry> {
        let entry = CacheEntry::from_quote(item.clone(), source, quote, self.clock.now(), ttl);
        self.rows
            .write()
            .await
            .insert((item.clone(), source), entry.clone());
        Ok(entry)
    }

    async fn extend_expiry(
        &self,
        item: &ItemKey,
        source: SourceId,
        ttl: Duration,
    ) -> StorageResult<Option<CacheEntry>> {
        let now = self.clock.now();
        let mut rows = self.rows.write().await;
        Ok(rows.get_mut(&(item.clone(), source)).map(|entry| {
            entry.expires_at = expiry_from(now, ttl);
            entry.clone()
        }))
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, e| e.expires_at >= cutoff);
        Ok((before - rows.len()) as u64)
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }
}
