//! Price cache stores.

mod memory;
mod postgres;
mod traits;

pub use memory::InMemoryPriceStore;
pub use postgres::{PgAdvisoryFetchLock, PostgresPriceStore};
pub use traits::{PriceCacheStore, StorageResult};
