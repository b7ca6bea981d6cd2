//! Skinprice Test Utilities
//!
//! Shared test infrastructure for the skinprice workspace:
//! - Scripted marketplace fetchers with call counters
//! - A manually driven clock
//! - Store doubles that fail or hang
//! - Proptest generators and scenario fixtures

pub use skinprice_core::{
    CacheEntry, CachePolicy, CacheStatus, Clock, FetchError, ItemKey, PriceEntry,
    PriceProvenance, PriceQuote, ReconciliationResult, SourceId, StorageError,
};
pub use skinprice_storage::{InMemoryPriceStore, PriceCacheStore, SourceFetcher};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use skinprice_storage::StorageResult;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// SCRIPTED FETCHER
// ============================================================================

/// Marketplace double that replays scripted answers and counts calls.
///
/// Scripted results are consumed in order; once the script is empty every
/// call returns the default result.
#[derive(Debug)]
pub struct ScriptedFetcher {
    source: SourceId,
    script: Mutex<VecDeque<Result<PriceQuote, FetchError>>>,
    default: Mutex<Result<PriceQuote, FetchError>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    /// Fetcher that always answers `result`.
    pub fn new(source: SourceId, result: Result<PriceQuote, FetchError>) -> Self {
        Self {
            source,
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(result),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fetcher that always returns `price` (e.g. `"8500.00"`).
    pub fn returning(source: SourceId, price: &str) -> Self {
        Self::new(source, Ok(fixtures::quote(source, price)))
    }

    /// Fetcher that always fails with `error`.
    pub fn failing(source: SourceId, error: FetchError) -> Self {
        Self::new(source, Err(error))
    }

    /// Sleep before answering each call.
    pub fn with_delay(self, delay: Duration) -> Self {
        *lock(&self.delay) = delay;
        self
    }

    /// Queue a one-off answer ahead of the default.
    pub fn then(self, result: Result<PriceQuote, FetchError>) -> Self {
        lock(&self.script).push_back(result);
        self
    }

    /// Replace the default answer.
    pub fn set_default(&self, result: Result<PriceQuote, FetchError>) {
        *lock(&self.default) = result;
    }

    /// Number of `fetch` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl SourceFetcher for ScriptedFetcher {
    fn source(&self) -> SourceId {
        self.source
    }

    async fn fetch(&self, _item: &ItemKey) -> Result<PriceQuote, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let scripted = lock(&self.script).pop_front();
        scripted.unwrap_or_else(|| lock(&self.default).clone())
    }
}

// ============================================================================
// MANUAL CLOCK
// ============================================================================

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Clock frozen at 2025-01-01T12:00:00Z.
    pub fn new() -> Self {
        Self::at(fixtures::epoch())
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *lock(&self.now) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

// ============================================================================
// STORE DOUBLES
// ============================================================================

/// How a [`FailingStore`] misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Every call returns `StorageError::Unavailable`.
    Unavailable,
    /// Every call never completes.
    Hang,
}

/// A store that is down.
#[derive(Debug)]
pub struct FailingStore {
    mode: FailureMode,
    calls: AtomicUsize,
}

impl FailingStore {
    pub fn unavailable() -> Self {
        Self {
            mode: FailureMode::Unavailable,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn hanging() -> Self {
        Self {
            mode: FailureMode::Hang,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn fail<T>(&self) -> StorageResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            FailureMode::Unavailable => Err(StorageError::unavailable(
                "connection refused (os error 111)",
            )),
            FailureMode::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl PriceCacheStore for FailingStore {
    async fn lookup_valid(&self, _item: &ItemKey) -> StorageResult<Vec<CacheEntry>> {
        self.fail().await
    }

    async fn lookup_all(&self, _item: &ItemKey) -> StorageResult<Vec<CacheEntry>> {
        self.fail().await
    }

    async fn upsert(
        &self,
        _item: &ItemKey,
        _source: SourceId,
        _quote: &PriceQuote,
        _ttl: Duration,
    ) -> StorageResult<CacheEntry> {
        self.fail().await
    }

    async fn extend_expiry(
        &self,
        _item: &ItemKey,
        _source: SourceId,
        _ttl: Duration,
    ) -> StorageResult<Option<CacheEntry>> {
        self.fail().await
    }

    async fn delete_expired_before(&self, _cutoff: DateTime<Utc>) -> StorageResult<u64> {
        self.fail().await
    }

    async fn ping(&self) -> StorageResult<()> {
        self.fail().await
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    /// Market-hash-name shaped item keys.
    pub fn arb_item_key() -> impl Strategy<Value = ItemKey> {
        "[A-Z][A-Za-z0-9-]{1,12} \\| [A-Z][a-z ]{1,16}"
            .prop_filter_map("normalizable key", |raw| ItemKey::parse(&raw).ok())
    }

    pub fn arb_source() -> impl Strategy<Value = SourceId> {
        prop_oneof![
            Just(SourceId::Steam),
            Just(SourceId::Skinport),
            Just(SourceId::CsFloat),
        ]
    }

    /// Transient fetch failures, i.e. everything but `NotFound`.
    pub fn arb_transient_error() -> impl Strategy<Value = FetchError> {
        prop_oneof![
            Just(FetchError::RateLimited { retry_after: None }),
            (1u64..120).prop_map(|s| FetchError::RateLimited {
                retry_after: Some(Duration::from_secs(s))
            }),
            Just(FetchError::network("connection reset by peer")),
            (1u64..10).prop_map(|s| FetchError::Timeout {
                after: Duration::from_secs(s)
            }),
        ]
    }

    /// Prices with two fractional digits between 0.03 and 99999.99.
    pub fn arb_price() -> impl Strategy<Value = Decimal> {
        (3i64..9_999_999).prop_map(|cents| Decimal::new(cents, 2))
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;

    /// Fixed starting instant for [`ManualClock`].
    pub fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_732_800, 0).unwrap_or_default()
    }

    pub fn item(name: &str) -> ItemKey {
        ItemKey::parse(name).unwrap_or_else(|e| panic!("invalid fixture key {:?}: {}", name, e))
    }

    /// The item used throughout the reconciliation scenarios.
    pub fn scenario_item() -> ItemKey {
        item("AK-47 | Redline (Field-Tested)")
    }

    pub fn price(raw: &str) -> Decimal {
        Decimal::from_str(raw).unwrap_or_else(|e| panic!("invalid fixture price {:?}: {}", raw, e))
    }

    /// A quote as a marketplace would return it, with a listing-specific URL.
    pub fn quote(source: SourceId, raw_price: &str) -> PriceQuote {
        let quote = PriceQuote::new(
            price(raw_price),
            format!("https://{}.test/listing/{}", source.as_str(), raw_price),
        );
        if source.exposes_float() {
            quote.with_float(price("0.1523"))
        } else {
            quote
        }
    }

    /// Steam=8500.00, Skinport=8200.00, CSFloat=8350.00.
    pub fn scenario_prices() -> [(SourceId, &'static str); 3] {
        [
            (SourceId::Steam, "8500.00"),
            (SourceId::Skinport, "8200.00"),
            (SourceId::CsFloat, "8350.00"),
        ]
    }

    /// Policy with the default 5-minute TTL and short timeouts for tests.
    pub fn test_policy() -> CachePolicy {
        CachePolicy::default()
            .with_fetch_timeout(Duration::from_millis(500))
            .with_reconcile_ceiling(Duration::from_secs(2))
            .with_store_timeout(Duration::from_millis(500))
            .with_lock_wait(Duration::from_secs(1))
            .with_lock_poll_interval(Duration::from_millis(20))
    }

    /// A row written `age` before `now` with the given TTL.
    pub fn entry_aged(
        item: &ItemKey,
        source: SourceId,
        raw_price: &str,
        now: DateTime<Utc>,
        age: Duration,
        ttl: Duration,
    ) -> CacheEntry {
        let cached_at = now - chrono::Duration::from_std(age).unwrap_or(chrono::Duration::zero());
        CacheEntry::from_quote(item.clone(), source, &quote(source, raw_price), cached_at, ttl)
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    use super::*;

    /// Assert the entry for `source` exists and has the given provenance.
    pub fn assert_provenance(
        result: &ReconciliationResult,
        source: SourceId,
        expected: PriceProvenance,
    ) -> &PriceEntry {
        let entry = result
            .entry(source)
            .unwrap_or_else(|| panic!("no entry for {} in {:?}", source, result.entries));
        assert_eq!(
            entry.provenance, expected,
            "unexpected provenance for {}",
            source
        );
        entry
    }

    /// Assert every entry has the given provenance.
    pub fn assert_all_provenance(result: &ReconciliationResult, expected: PriceProvenance) {
        for entry in &result.entries {
            assert_eq!(
                entry.provenance, expected,
                "unexpected provenance for {}",
                entry.source
            );
        }
    }

    /// Assert `source` was left out of the priced entries.
    pub fn assert_omitted(result: &ReconciliationResult, source: SourceId) {
        assert!(
            result.entry(source).is_none(),
            "{} should have been omitted",
            source
        );
        assert!(result.omitted.iter().any(|o| o.source == source));
    }
}
