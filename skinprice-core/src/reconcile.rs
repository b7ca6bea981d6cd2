//! Reconciliation outcomes and the pure merge step.
//!
//! Every source consulted during a reconciliation ends in exactly one
//! [`SourceOutcome`]. [`merge`] folds those outcomes into a single
//! [`ReconciliationResult`] without touching the store or the network, so the
//! tagging rules can be tested on their own.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::entities::CacheEntry;
use crate::error::FetchError;
use crate::identity::{ItemKey, SourceId};

// ============================================================================
// PROVENANCE
// ============================================================================

/// Where a returned price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceProvenance {
    /// Fetched from the marketplace during this reconciliation.
    Fresh,
    /// Served from a valid cache row.
    Cache,
    /// Served from an expired row because the fetch failed.
    StaleCache,
}

impl PriceProvenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceProvenance::Fresh => "fresh",
            PriceProvenance::Cache => "cache",
            PriceProvenance::StaleCache => "stale_cache",
        }
    }
}

// ============================================================================
// PER-SOURCE OUTCOME
// ============================================================================

/// Terminal state of one source within a reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    /// Valid row found, no fetch issued.
    Cached(CacheEntry),
    /// Fetch succeeded and the row was written.
    Fresh { entry: CacheEntry, url: String },
    /// Fetch failed transiently; an older row was re-armed and served.
    StaleFallback { entry: CacheEntry, error: FetchError },
    /// Fetch failed transiently and no prior row exists.
    Unavailable { source: SourceId, error: FetchError },
    /// Marketplace definitively has no listing for the item.
    NoListing { source: SourceId },
}

impl SourceOutcome {
    pub fn source(&self) -> SourceId {
        match self {
            SourceOutcome::Cached(entry) => entry.source,
            SourceOutcome::Fresh { entry, .. } => entry.source,
            SourceOutcome::StaleFallback { entry, .. } => entry.source,
            SourceOutcome::Unavailable { source, .. } => *source,
            SourceOutcome::NoListing { source } => *source,
        }
    }

    /// Whether reaching this outcome required a fetch attempt.
    pub fn required_fetch(&self) -> bool {
        !matches!(self, SourceOutcome::Cached(_))
    }

    /// Label used for logs and the per-source outcome counter.
    pub fn label(&self) -> &'static str {
        match self {
            SourceOutcome::Cached(_) => "cache",
            SourceOutcome::Fresh { .. } => "fresh",
            SourceOutcome::StaleFallback { .. } => "stale_cache",
            SourceOutcome::Unavailable { .. } => "unavailable",
            SourceOutcome::NoListing { .. } => "not_found",
        }
    }
}

// ============================================================================
// RESULT
// ============================================================================

/// One priced entry in the unified answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub source: SourceId,
    /// Human-facing marketplace name.
    pub market: String,
    pub price: Decimal,
    pub currency: String,
    pub url: String,
    pub float_value: Option<Decimal>,
    pub provenance: PriceProvenance,
    pub cached_at: DateTime<Utc>,
    pub warning: Option<String>,
}

impl PriceEntry {
    fn from_entry(
        entry: CacheEntry,
        url: String,
        provenance: PriceProvenance,
        warning: Option<String>,
    ) -> Self {
        Self {
            source: entry.source,
            market: entry.source.display_name().to_string(),
            price: entry.price,
            currency: entry.currency,
            url,
            float_value: entry.float_value,
            provenance,
            cached_at: entry.cached_at,
            warning,
        }
    }
}

/// Overall cache status of a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// Every source was answered from valid cache rows.
    Hit,
    /// Some sources were fetched, some valid cache entries remain.
    Mixed,
    /// Every source needed a fetch.
    Fresh,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Mixed => "mixed",
            CacheStatus::Fresh => "fresh",
        }
    }
}

/// A source left out of the priced entries, kept for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct OmittedSource {
    pub source: SourceId,
    /// `None` for a definitive "no listing" answer.
    pub error: Option<FetchError>,
}

/// The unified answer for one item.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult {
    pub item_key: ItemKey,
    /// One entry per source that has any data; order is not significant.
    pub entries: Vec<PriceEntry>,
    /// Number of sources consulted, including omitted ones.
    pub sources_checked: usize,
    /// Number of sources that required a fetch attempt.
    pub fetched: usize,
    pub status: CacheStatus,
    pub omitted: Vec<OmittedSource>,
}

impl ReconciliationResult {
    pub fn cache_hit(&self) -> bool {
        self.status == CacheStatus::Hit
    }

    pub fn entry(&self, source: SourceId) -> Option<&PriceEntry> {
        self.entries.iter().find(|e| e.source == source)
    }
}

// ============================================================================
// MERGE
// ============================================================================

/// Fold per-source outcomes into the unified answer.
///
/// Outcomes for a source already seen are dropped, so the result holds at most
/// one entry per source.
pub fn merge(
    item_key: ItemKey,
    outcomes: Vec<SourceOutcome>,
    sources_checked: usize,
) -> ReconciliationResult {
    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(outcomes.len());
    let mut omitted = Vec::new();
    let mut fetched = 0;
    let mut any_cached = false;

    for outcome in outcomes {
        if !seen.insert(outcome.source()) {
            continue;
        }
        if outcome.required_fetch() {
            fetched += 1;
        }

        match outcome {
            SourceOutcome::Cached(entry) => {
                any_cached = true;
                let url = entry.source.listing_url(&item_key);
                entries.push(PriceEntry::from_entry(
                    entry,
                    url,
                    PriceProvenance::Cache,
                    None,
                ));
            }
            SourceOutcome::Fresh { entry, url } => {
                entries.push(PriceEntry::from_entry(
                    entry,
                    url,
                    PriceProvenance::Fresh,
                    None,
                ));
            }
            SourceOutcome::StaleFallback { entry, error } => {
                let url = entry.source.listing_url(&item_key);
                let warning = error
                    .user_warning()
                    .unwrap_or("Showing cached price: marketplace is temporarily unavailable")
                    .to_string();
                entries.push(PriceEntry::from_entry(
                    entry,
                    url,
                    PriceProvenance::StaleCache,
                    Some(warning),
                ));
            }
            SourceOutcome::Unavailable { source, error } => {
                omitted.push(OmittedSource {
                    source,
                    error: Some(error),
                });
            }
            SourceOutcome::NoListing { source } => {
                omitted.push(OmittedSource {
                    source,
                    error: None,
                });
            }
        }
    }

    let status = if fetched == 0 {
        CacheStatus::Hit
    } else if any_cached {
        CacheStatus::Mixed
    } else {
        CacheStatus::Fresh
    };

    ReconciliationResult {
        item_key,
        entries,
        sources_checked,
        fetched,
        status,
        omitted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::PriceQuote;
    use proptest::prelude::*;
    use std::str::FromStr;
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(300);

    fn key() -> ItemKey {
        ItemKey::parse("AK-47 | Redline (Field-Tested)").unwrap()
    }

    fn entry(source: SourceId, price: &str) -> CacheEntry {
        let quote = PriceQuote::new(Decimal::from_str(price).unwrap(), "https://m.test/x");
        CacheEntry::from_quote(key(), source, &quote, Utc::now(), TTL)
    }

    #[test]
    fn test_all_cached_is_hit() {
        let outcomes = SourceId::ALL
            .iter()
            .map(|s| SourceOutcome::Cached(entry(*s, "10.00")))
            .collect();

        let result = merge(key(), outcomes, 3);

        assert!(result.cache_hit());
        assert_eq!(result.fetched, 0);
        assert_eq!(result.entries.len(), 3);
        assert!(result
            .entries
            .iter()
            .all(|e| e.provenance == PriceProvenance::Cache && e.warning.is_none()));
    }

    #[test]
    fn test_partial_fetch_is_mixed() {
        let outcomes = vec![
            SourceOutcome::Cached(entry(SourceId::Steam, "10.00")),
            SourceOutcome::Cached(entry(SourceId::Skinport, "9.50")),
            SourceOutcome::Fresh {
                entry: entry(SourceId::CsFloat, "9.80"),
                url: "https://csfloat.com/item/1".to_string(),
            },
        ];

        let result = merge(key(), outcomes, 3);

        assert_eq!(result.status, CacheStatus::Mixed);
        assert!(!result.cache_hit());
        assert_eq!(result.fetched, 1);
        let fresh = result.entry(SourceId::CsFloat).unwrap();
        assert_eq!(fresh.provenance, PriceProvenance::Fresh);
        assert_eq!(fresh.url, "https://csfloat.com/item/1");
    }

    #[test]
    fn test_stale_fallback_carries_warning_and_rebuilt_url() {
        let outcomes = vec![SourceOutcome::StaleFallback {
            entry: entry(SourceId::Skinport, "8200.00"),
            error: FetchError::RateLimited { retry_after: None },
        }];

        let result = merge(key(), outcomes, 3);
        let stale = result.entry(SourceId::Skinport).unwrap();

        assert_eq!(stale.provenance, PriceProvenance::StaleCache);
        assert!(stale.warning.as_deref().unwrap().contains("rate limiting"));
        assert_eq!(stale.url, SourceId::Skinport.listing_url(&key()));
        assert_eq!(result.status, CacheStatus::Fresh);
    }

    #[test]
    fn test_no_listing_and_unavailable_are_omitted() {
        let outcomes = vec![
            SourceOutcome::Fresh {
                entry: entry(SourceId::Steam, "1.00"),
                url: "u".to_string(),
            },
            SourceOutcome::NoListing {
                source: SourceId::Skinport,
            },
            SourceOutcome::Unavailable {
                source: SourceId::CsFloat,
                error: FetchError::network("reset"),
            },
        ];

        let result = merge(key(), outcomes, 3);

        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.sources_checked, 3);
        assert_eq!(result.fetched, 3);
        assert_eq!(result.omitted.len(), 2);
        let no_listing = result
            .omitted
            .iter()
            .find(|o| o.source == SourceId::Skinport)
            .unwrap();
        assert!(no_listing.error.is_none());
    }

    #[test]
    fn test_duplicate_source_keeps_first() {
        let outcomes = vec![
            SourceOutcome::Cached(entry(SourceId::Steam, "1.00")),
            SourceOutcome::Cached(entry(SourceId::Steam, "2.00")),
        ];

        let result = merge(key(), outcomes, 3);

        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].price, Decimal::from_str("1.00").unwrap());
    }

    #[test]
    fn test_provenance_serializes_snake_case() {
        let json = serde_json::to_string(&PriceProvenance::StaleCache).unwrap();
        assert_eq!(json, "\"stale_cache\"");
    }

    fn arb_outcome(source: SourceId) -> impl Strategy<Value = SourceOutcome> {
        prop_oneof![
            Just(SourceOutcome::Cached(entry(source, "1.00"))),
            Just(SourceOutcome::Fresh {
                entry: entry(source, "2.00"),
                url: "u".to_string(),
            }),
            Just(SourceOutcome::StaleFallback {
                entry: entry(source, "3.00"),
                error: FetchError::Timeout {
                    after: Duration::from_secs(4),
                },
            }),
            Just(SourceOutcome::Unavailable {
                source,
                error: FetchError::network("down"),
            }),
            Just(SourceOutcome::NoListing { source }),
        ]
    }

    proptest! {
        #[test]
        fn prop_merge_invariants(
            steam in arb_outcome(SourceId::Steam),
            skinport in arb_outcome(SourceId::Skinport),
            csfloat in arb_outcome(SourceId::CsFloat),
        ) {
            let outcomes = vec![steam, skinport, csfloat];
            let any_fetch = outcomes.iter().any(SourceOutcome::required_fetch);
            let result = merge(key(), outcomes, 3);

            let unique: HashSet<_> = result.entries.iter().map(|e| e.source).collect();
            prop_assert_eq!(unique.len(), result.entries.len());
            prop_assert_eq!(result.entries.len() + result.omitted.len(), 3);
            prop_assert_eq!(result.cache_hit(), !any_fetch);

            for e in &result.entries {
                prop_assert_eq!(
                    e.warning.is_some(),
                    e.provenance == PriceProvenance::StaleCache
                );
            }
            for o in &result.omitted {
                prop_assert!(result.entry(o.source).is_none());
            }
        }
    }
}
