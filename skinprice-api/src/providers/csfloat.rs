//! CSFloat client.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use skinprice_core::{FetchError, ItemKey, PriceQuote, SourceId};
use skinprice_storage::SourceFetcher;
use std::time::Duration;

use super::{check_status, decimal_from_f64, decode_error, transport_error};

#[derive(Debug, Deserialize)]
struct ListingItem {
    #[serde(default)]
    float_value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    id: String,
    /// Price in cents.
    price: i64,
    #[serde(default)]
    item: Option<ListingItem>,
}

/// The listings endpoint has answered both with a bare array and with a
/// `{ "data": [...] }` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListingsResponse {
    Envelope { data: Vec<Listing> },
    Bare(Vec<Listing>),
}

impl ListingsResponse {
    fn into_listings(self) -> Vec<Listing> {
        match self {
            ListingsResponse::Envelope { data } => data,
            ListingsResponse::Bare(listings) => listings,
        }
    }
}

/// Fetches the cheapest CSFloat listing, including its float value.
#[derive(Clone)]
pub struct CsFloatFetcher {
    client: Client,
    base_url: String,
    timeout: Duration,
    api_key: SecretString,
}

impl std::fmt::Debug for CsFloatFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsFloatFetcher")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl CsFloatFetcher {
    pub fn new(client: Client, base_url: &str, timeout: Duration, api_key: SecretString) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            api_key,
        }
    }

    fn listing_page(&self, listing_id: &str) -> String {
        format!("{}/item/{}", self.base_url, listing_id)
    }
}

fn quote_from_listings(
    listings: Vec<Listing>,
    page: impl FnOnce(&str) -> String,
) -> Result<PriceQuote, FetchError> {
    let cheapest = listings
        .into_iter()
        .filter(|l| l.price > 0)
        .min_by_key(|l| l.price)
        .ok_or(FetchError::NotFound)?;

    let mut quote = PriceQuote::new(Decimal::new(cheapest.price, 2), page(&cheapest.id));
    if let Some(float_value) = cheapest
        .item
        .and_then(|i| i.float_value)
        .and_then(decimal_from_f64)
    {
        quote = quote.with_float(float_value);
    }
    Ok(quote.normalized())
}

#[async_trait]
impl SourceFetcher for CsFloatFetcher {
    fn source(&self) -> SourceId {
        SourceId::CsFloat
    }

    #[tracing::instrument(skip_all, fields(item_key = %item))]
    async fn fetch(&self, item: &ItemKey) -> Result<PriceQuote, FetchError> {
        let url = format!("{}/api/v1/listings", self.base_url);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, self.api_key.expose_secret())
            .query(&[
                ("market_hash_name", item.as_str()),
                ("sort_by", "lowest_price"),
                ("limit", "1"),
            ])
            .send()
            .await
            .map_err(|e| transport_error(SourceId::CsFloat, e, self.timeout))?;

        let listings: ListingsResponse = check_status(SourceId::CsFloat, response)?
            .json()
            .await
            .map_err(|e| decode_error(SourceId::CsFloat, e, self.timeout))?;

        quote_from_listings(listings.into_listings(), |id| self.listing_page(id))
    }
}
