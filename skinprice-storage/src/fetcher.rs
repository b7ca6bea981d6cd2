//! Marketplace fetch contract.

use async_trait::async_trait;
use skinprice_core::{FetchError, ItemKey, PriceQuote, SourceId};

/// Fetches the current price for an item from one marketplace.
///
/// Implementations report a missing listing as [`FetchError::NotFound`] and
/// every other failure with the matching transient variant. They do not need
/// their own overall timeout: the reconciler bounds each call.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// The marketplace this fetcher talks to.
    fn source(&self) -> SourceId;

    async fn fetch(&self, item: &ItemKey) -> Result<PriceQuote, FetchError>;
}
