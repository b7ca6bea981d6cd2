//! Skinprice Storage - Cache Reconciliation Engine
//!
//! Everything that touches the price cache lives here:
//!
//! - [`PriceCacheStore`] with in-memory and PostgreSQL implementations
//! - [`SingleFlight`], collapsing concurrent refreshes of one (item, source)
//! - [`FetchLock`], extending that guarantee across instances
//! - [`Reconciler`], merging cached, fresh and stale-fallback prices
//! - [`CleanupSweeper`], deleting rows expired beyond a grace window

pub mod fetcher;
pub mod lock;
pub mod reconciler;
pub mod single_flight;
pub mod store;
pub mod sweeper;

pub use fetcher::SourceFetcher;
pub use lock::{FetchLease, FetchLock, InMemoryFetchLock};
pub use reconciler::Reconciler;
pub use single_flight::{SingleFlight, SingleFlightError};
pub use store::{
    InMemoryPriceStore, PgAdvisoryFetchLock, PostgresPriceStore, PriceCacheStore, StorageResult,
};
pub use sweeper::{CleanupSweeper, SweepConfig, SweepMetrics, SweepSnapshot};
