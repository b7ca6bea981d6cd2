//! Steam Community Market client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use skinprice_core::{FetchError, ItemKey, PriceQuote, SourceId};
use skinprice_storage::SourceFetcher;
use std::time::Duration;

use super::{check_status, decode_error, parse_money, transport_error};
use crate::constants::{CS2_APP_ID, STEAM_CURRENCY_USD};

/// `/market/priceoverview` response body.
#[derive(Debug, Deserialize)]
struct PriceOverview {
    success: bool,
    #[serde(default)]
    lowest_price: Option<String>,
    #[serde(default)]
    median_price: Option<String>,
}

/// Fetches the lowest listing price from the Steam Community Market.
#[derive(Debug, Clone)]
pub struct SteamFetcher {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl SteamFetcher {
    pub fn new(client: Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

/// Turn a price overview into a quote.
///
/// `lowest_price` is preferred; `median_price` covers items with no live
/// listing but recent sales.
fn quote_from_overview(item: &ItemKey, overview: PriceOverview) -> Result<PriceQuote, FetchError> {
    if !overview.success {
        return Err(FetchError::NotFound);
    }

    let price = overview
        .lowest_price
        .as_deref()
        .and_then(parse_money)
        .or_else(|| overview.median_price.as_deref().and_then(parse_money))
        .ok_or(FetchError::NotFound)?;

    Ok(PriceQuote::new(price, SourceId::Steam.listing_url(item)).normalized())
}

#[async_trait]
impl SourceFetcher for SteamFetcher {
    fn source(&self) -> SourceId {
        SourceId::Steam
    }

    #[tracing::instrument(skip_all, fields(item_key = %item))]
    async fn fetch(&self, item: &ItemKey) -> Result<PriceQuote, FetchError> {
        let url = format!("{}/market/priceoverview/", self.base_url);
        let app_id = CS2_APP_ID.to_string();
        let currency = STEAM_CURRENCY_USD.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("appid", app_id.as_str()),
                ("currency", currency.as_str()),
                ("market_hash_name", item.as_str()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(SourceId::Steam, e, self.timeout))?;

        let overview: PriceOverview = check_status(SourceId::Steam, response)?
            .json()
            .await
            .map_err(|e| decode_error(SourceId::Steam, e, self.timeout))?;

        quote_from_overview(item, overview)
    }
}
