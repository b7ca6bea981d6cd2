//! Skinprice Core - Entity Types
//!
//! Pure data structures shared by every other crate: item and marketplace
//! identity, cache rows, reconciliation outcomes, the error taxonomy and the
//! cache timing policy. No I/O lives here.

pub mod clock;
pub mod config;
pub mod entities;
pub mod error;
pub mod identity;
pub mod reconcile;

pub use clock::{Clock, SystemClock};
pub use config::CachePolicy;
pub use entities::{
    expiry_from, normalize_currency, CacheEntry, PriceQuote, DEFAULT_CURRENCY, FLOAT_SCALE,
    PRICE_SCALE,
};
pub use error::{
    ConfigError, FetchError, SkinpriceError, SkinpriceResult, StorageError, ValidationError,
};
pub use identity::{ItemKey, SourceId, MAX_ITEM_KEY_LEN};
pub use reconcile::{
    merge, CacheStatus, OmittedSource, PriceEntry, PriceProvenance, ReconciliationResult,
    SourceOutcome,
};

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
