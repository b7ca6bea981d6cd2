//! Cache reconciliation.
//!
//! For one item the [`Reconciler`]:
//!
//! 1. reads the valid cache rows and classifies every known source as valid
//!    or missing,
//! 2. returns straight away when nothing is missing,
//! 3. refreshes the missing sources concurrently, each through the
//!    single-flight guard and under its own timeout,
//! 4. writes successful fetches, re-arms stale rows for transient failures,
//!    and omits sources with no listing or no prior data,
//! 5. folds the per-source outcomes with [`skinprice_core::merge`].
//!
//! Per-source failures never abort a reconciliation. Store failures always do.

use futures::future::join_all;
use skinprice_core::{
    merge, CacheEntry, CachePolicy, Clock, FetchError, ItemKey, ReconciliationResult,
    SkinpriceResult, SourceId, SourceOutcome, StorageError, SystemClock,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::fetcher::SourceFetcher;
use crate::lock::FetchLock;
use crate::single_flight::{SingleFlight, SingleFlightError};
use crate::store::{PriceCacheStore, StorageResult};

/// Result shared between callers coalesced on one (item, source) refresh.
type RefreshResult = Result<SourceOutcome, StorageError>;

/// Orchestrates cache lookups, marketplace fetches and stale fallback.
pub struct Reconciler {
    store: Arc<dyn PriceCacheStore>,
    fetchers: BTreeMap<SourceId, Arc<dyn SourceFetcher>>,
    flights: SingleFlight<(ItemKey, SourceId), RefreshResult>,
    fetch_lock: Option<Arc<dyn FetchLock>>,
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("sources", &self.fetchers.keys().collect::<Vec<_>>())
            .field("flights", &self.flights)
            .field("fetch_lock", &self.fetch_lock)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Reconciler {
    /// Reconciler with no fetchers registered yet.
    pub fn new(store: Arc<dyn PriceCacheStore>, policy: CachePolicy) -> Self {
        Self {
            store,
            fetchers: BTreeMap::new(),
            flights: SingleFlight::new(),
            fetch_lock: None,
            policy,
            clock: Arc::new(SystemClock),
        }
    }

    /// Register a marketplace. A second fetcher for the same source replaces
    /// the first.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetchers.insert(fetcher.source(), fetcher);
        self
    }

    /// Coordinate refreshes with other instances sharing the store.
    pub fn with_fetch_lock(mut self, lock: Arc<dyn FetchLock>) -> Self {
        self.fetch_lock = Some(lock);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Sources this reconciler consults.
    pub fn sources(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.fetchers.keys().copied()
    }

    pub fn store(&self) -> &Arc<dyn PriceCacheStore> {
        &self.store
    }

    /// Produce the unified price answer for one item.
    ///
    /// # Errors
    ///
    /// Returns [`skinprice_core::SkinpriceError::Storage`] when the cache store
    /// is unreachable or too slow. Marketplace failures are reported per source
    /// inside the result instead.
    #[tracing::instrument(skip_all, fields(item_key = %item))]
    pub async fn reconcile(&self, item: &ItemKey) -> SkinpriceResult<ReconciliationResult> {
        let deadline = Instant::now() + self.policy.reconcile_ceiling;

        let valid = self
            .store_call("lookup_valid", self.store.lookup_valid(item))
            .await?;
        let mut valid_by_source: BTreeMap<SourceId, CacheEntry> =
            valid.into_iter().map(|e| (e.source, e)).collect();

        let mut outcomes = Vec::with_capacity(self.fetchers.len());
        let mut missing = Vec::new();
        for (source, fetcher) in &self.fetchers {
            match valid_by_source.remove(source) {
                Some(entry) => outcomes.push(SourceOutcome::Cached(entry)),
                None => missing.push(Arc::clone(fetcher)),
            }
        }

        if missing.is_empty() {
            debug!(sources = outcomes.len(), "All sources served from cache");
            return Ok(merge(item.clone(), outcomes, self.fetchers.len()));
        }

        debug!(
            cached = outcomes.len(),
            missing = missing.len(),
            "Refreshing missing sources"
        );

        let refreshed = join_all(
            missing
                .iter()
                .map(|fetcher| self.resolve_missing(item, fetcher.as_ref(), deadline)),
        )
        .await;

        for outcome in refreshed {
            outcomes.push(outcome?);
        }

        let result = merge(item.clone(), outcomes, self.fetchers.len());
        info!(
            status = result.status.as_str(),
            entries = result.entries.len(),
            fetched = result.fetched,
            omitted = result.omitted.len(),
            "Reconciliation complete"
        );
        Ok(result)
    }

    /// Refresh one missing source, bounded by the reconciliation deadline.
    async fn resolve_missing(
        &self,
        item: &ItemKey,
        fetcher: &dyn SourceFetcher,
        deadline: Instant,
    ) -> RefreshResult {
        let source = fetcher.source();
        let shared = timeout_at(
            deadline,
            self.flights.run_exclusive(
                (item.clone(), source),
                self.policy.lock_wait,
                || self.refresh(item, fetcher),
            ),
        )
        .await;

        match shared {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(SingleFlightError::WaitExceeded { waited })) => {
                warn!(%source, ?waited, "Gave up waiting for in-flight refresh");
                self.fallback(item, source, FetchError::LockContention { waited })
                    .await
            }
            Ok(Err(SingleFlightError::Abandoned)) => {
                warn!(%source, "In-flight refresh was abandoned");
                self.fallback(
                    item,
                    source,
                    FetchError::LockContention {
                        waited: Duration::ZERO,
                    },
                )
                .await
            }
            Err(_) => {
                warn!(%source, ceiling = ?self.policy.reconcile_ceiling, "Reconciliation ceiling reached");
                self.fallback(
                    item,
                    source,
                    FetchError::Timeout {
                        after: self.policy.reconcile_ceiling,
                    },
                )
                .await
            }
        }
    }

    /// Check, fetch and write one pair. Runs once per coalesced group.
    async fn refresh(&self, item: &ItemKey, fetcher: &dyn SourceFetcher) -> RefreshResult {
        let source = fetcher.source();
        let Some(lock) = &self.fetch_lock else {
            return self.recheck_then_fetch(item, fetcher).await;
        };

        match self
            .store_call("try_acquire", lock.try_acquire(item, source))
            .await?
        {
            Some(mut lease) => {
                let result = self.recheck_then_fetch(item, fetcher).await;
                lease.release().await;
                result
            }
            None => self.await_peer_refresh(item, source).await,
        }
    }

    /// A flight that finished between our lookup and becoming leader may
    /// already have written the row; only fetch when it is still missing.
    async fn recheck_then_fetch(
        &self,
        item: &ItemKey,
        fetcher: &dyn SourceFetcher,
    ) -> RefreshResult {
        match self.valid_row(item, fetcher.source()).await? {
            Some(entry) => Ok(self.peer_refreshed(item, entry)),
            None => self.fetch_and_store(item, fetcher).await,
        }
    }

    async fn fetch_and_store(&self, item: &ItemKey, fetcher: &dyn SourceFetcher) -> RefreshResult {
        let source = fetcher.source();
        let fetched = match timeout(self.policy.fetch_timeout, fetcher.fetch(item)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                after: self.policy.fetch_timeout,
            }),
        };

        match fetched {
            Ok(quote) => {
                let entry = self
                    .store_call(
                        "upsert",
                        self.store.upsert(item, source, &quote, self.policy.ttl),
                    )
                    .await?;
                debug!(%source, price = %entry.price, "Fetched fresh price");
                Ok(SourceOutcome::Fresh {
                    entry,
                    url: quote.url,
                })
            }
            Err(FetchError::NotFound) => {
                debug!(%source, "Marketplace has no listing");
                Ok(SourceOutcome::NoListing { source })
            }
            Err(err) => {
                warn!(%source, error = %err, kind = err.kind(), "Fetch failed");
                self.fallback(item, source, err).await
            }
        }
    }

    /// Another instance holds the lock: poll for its write instead of fetching.
    async fn await_peer_refresh(&self, item: &ItemKey, source: SourceId) -> RefreshResult {
        let wait = self.policy.lock_wait;
        let started = Instant::now();
        debug!(%source, "Refresh held by another instance, polling cache");

        loop {
            tokio::time::sleep(self.policy.lock_poll_interval).await;
            if let Some(entry) = self.valid_row(item, source).await? {
                return Ok(self.peer_refreshed(item, entry));
            }
            if started.elapsed() >= wait {
                warn!(%source, ?wait, "Peer refresh did not land in time");
                return self
                    .fallback(item, source, FetchError::LockContention { waited: wait })
                    .await;
            }
        }
    }

    /// A row written by a peer during this reconciliation counts as fresh.
    fn peer_refreshed(&self, item: &ItemKey, entry: CacheEntry) -> SourceOutcome {
        let url = entry.source.listing_url(item);
        SourceOutcome::Fresh { entry, url }
    }

    async fn valid_row(
        &self,
        item: &ItemKey,
        source: SourceId,
    ) -> StorageResult<Option<CacheEntry>> {
        let rows = self
            .store_call("lookup_valid", self.store.lookup_valid(item))
            .await?;
        Ok(rows.into_iter().find(|e| e.source == source))
    }

    /// Serve a prior row after a transient failure, re-arming its expiry.
    async fn fallback(
        &self,
        item: &ItemKey,
        source: SourceId,
        error: FetchError,
    ) -> RefreshResult {
        let rows = self
            .store_call("lookup_all", self.store.lookup_all(item))
            .await?;

        if !rows.iter().any(|e| e.source == source) {
            warn!(%source, kind = error.kind(), "No prior price to fall back on, omitting source");
            return Ok(SourceOutcome::Unavailable { source, error });
        }

        match self
            .store_call(
                "extend_expiry",
                self.store.extend_expiry(item, source, self.policy.ttl),
            )
            .await?
        {
            Some(entry) => {
                warn!(
                    %source,
                    kind = error.kind(),
                    age_secs = entry.age_at(self.clock.now()).as_secs(),
                    "Serving stale price"
                );
                Ok(SourceOutcome::StaleFallback { entry, error })
            }
            // Swept between the two calls
            None => Ok(SourceOutcome::Unavailable { source, error }),
        }
    }

    /// Bound a store call by the store timeout.
    async fn store_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = StorageResult<T>>,
    ) -> StorageResult<T> {
        match timeout(self.policy.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!(operation, error = %e, "Cache store call failed");
                Err(e)
            }
            Err(_) => {
                error!(operation, timeout = ?self.policy.store_timeout, "Cache store call timed out");
                Err(StorageError::Timeout {
                    operation: operation.to_string(),
                })
            }
        }
    }
}
