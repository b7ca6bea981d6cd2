//! Price Lookup Endpoint
//!
//! `GET /api/prices/{item}` reconciles cached and live marketplace prices
//! for one item. Per-marketplace failures degrade to stale prices or an
//! omitted entry; only a store failure fails the request.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use skinprice_core::{ItemKey, PriceEntry, PriceProvenance, ReconciliationResult};
use skinprice_storage::Reconciler;
use std::sync::Arc;

use crate::error::ApiResult;
use crate::state::AppState;
use crate::telemetry::with_metrics;

// ============================================================================
// TYPES
// ============================================================================

/// One marketplace price in the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketPrice {
    /// Marketplace display name
    pub market: String,
    pub price: Decimal,
    pub currency: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub float_value: Option<Decimal>,
    /// `fresh`, `cache` or `stale_cache`
    pub source: PriceProvenance,
    /// When the price was read from the marketplace; omitted for fresh prices.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl From<PriceEntry> for MarketPrice {
    fn from(entry: PriceEntry) -> Self {
        let cached_at = match entry.provenance {
            PriceProvenance::Fresh => None,
            PriceProvenance::Cache | PriceProvenance::StaleCache => Some(entry.cached_at),
        };
        Self {
            market: entry.market,
            price: entry.price,
            currency: entry.currency,
            url: entry.url,
            float_value: entry.float_value,
            source: entry.provenance,
            cached_at,
            warning: entry.warning,
        }
    }
}

/// Response body for a price lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceResponse {
    pub item_name: String,
    pub prices: Vec<MarketPrice>,
    /// Marketplaces consulted, including those with no price to show
    pub marketplaces_checked: usize,
    /// True when every marketplace was answered from valid cache rows
    pub cache_hit: bool,
}

impl PriceResponse {
    /// Build the response. Prices are listed in marketplace order.
    pub fn from_result(item_name: &str, result: ReconciliationResult) -> Self {
        let cache_hit = result.cache_hit();
        let mut entries = result.entries;
        entries.sort_by_key(|e| e.source);

        Self {
            item_name: item_name.to_string(),
            prices: entries.into_iter().map(MarketPrice::from).collect(),
            marketplaces_checked: result.sources_checked,
            cache_hit,
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/prices/{item} - Reconciled prices for one item
pub async fn get_prices(
    State(reconciler): State<Arc<Reconciler>>,
    Path(raw): Path<String>,
) -> ApiResult<Json<PriceResponse>> {
    let item = ItemKey::parse(&raw)?;

    match reconciler.reconcile(&item).await {
        Ok(result) => {
            with_metrics(|m| m.record_reconciliation(&result));
            tracing::debug!(
                item_key = %item,
                status = result.status.as_str(),
                fetched = result.fetched,
                "Prices served"
            );
            Ok(Json(PriceResponse::from_result(raw.trim(), result)))
        }
        Err(e) => {
            with_metrics(|m| m.record_reconciliation_error());
            Err(e.into())
        }
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the price router. Item names may contain `/`, so the whole tail
/// of the path is the item.
pub fn create_router() -> Router<AppState> {
    Router::new().route("/*item", get(get_prices))
}
