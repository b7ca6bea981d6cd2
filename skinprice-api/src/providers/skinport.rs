//! Skinport client.
//!
//! Skinport only publishes its whole catalogue (`/v1/items`), and rate limits
//! that endpoint hard. The catalogue is downloaded once and reused for a
//! short window; concurrent lookups share a single download.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use skinprice_core::{FetchError, ItemKey, PriceQuote, SourceId};
use skinprice_storage::SourceFetcher;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{check_status, decimal_from_f64, decode_error, transport_error};
use crate::constants::CS2_APP_ID;

/// One catalogue entry.
#[derive(Debug, Clone, Deserialize)]
struct SkinportItem {
    market_hash_name: String,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    min_price: Option<f64>,
    #[serde(default)]
    item_page: Option<String>,
}

type Catalogue = HashMap<ItemKey, SkinportItem>;

#[derive(Debug)]
struct CachedCatalogue {
    fetched_at: Instant,
    items: Arc<Catalogue>,
}

/// Fetches the cheapest Skinport listing for an item.
#[derive(Debug, Clone)]
pub struct SkinportFetcher {
    client: Client,
    base_url: String,
    timeout: Duration,
    catalogue_ttl: Duration,
    catalogue: Arc<Mutex<Option<CachedCatalogue>>>,
}

impl SkinportFetcher {
    pub fn new(client: Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            catalogue_ttl: Duration::from_secs(300),
            catalogue: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_catalogue_ttl(mut self, ttl: Duration) -> Self {
        self.catalogue_ttl = ttl;
        self
    }

    async fn catalogue(&self) -> Result<Arc<Catalogue>, FetchError> {
        let mut cached = self.catalogue.lock().await;
        if let Some(c) = cached.as_ref() {
            if c.fetched_at.elapsed() < self.catalogue_ttl {
                return Ok(Arc::clone(&c.items));
            }
        }

        let items = Arc::new(self.download().await?);
        tracing::debug!(items = items.len(), "Skinport catalogue refreshed");
        *cached = Some(CachedCatalogue {
            fetched_at: Instant::now(),
            items: Arc::clone(&items),
        });
        Ok(items)
    }

    async fn download(&self) -> Result<Catalogue, FetchError> {
        let url = format!("{}/v1/items", self.base_url);
        let app_id = CS2_APP_ID.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[("app_id", app_id.as_str()), ("currency", "USD")])
            .send()
            .await
            .map_err(|e| transport_error(SourceId::Skinport, e, self.timeout))?;

        let items: Vec<SkinportItem> = check_status(SourceId::Skinport, response)?
            .json()
            .await
            .map_err(|e| decode_error(SourceId::Skinport, e, self.timeout))?;

        Ok(index_catalogue(items))
    }
}

/// Key the catalogue by normalized item name. Unparsable names are skipped.
fn index_catalogue(items: Vec<SkinportItem>) -> Catalogue {
    items
        .into_iter()
        .filter_map(|entry| {
            ItemKey::parse(&entry.market_hash_name)
                .ok()
                .map(|key| (key, entry))
        })
        .collect()
}

fn quote_from_catalogue(item: &ItemKey, catalogue: &Catalogue) -> Result<PriceQuote, FetchError> {
    let entry = catalogue.get(item).ok_or(FetchError::NotFound)?;
    let price = entry
        .min_price
        .and_then(decimal_from_f64)
        .filter(|p| !p.is_zero() && p.is_sign_positive())
        .ok_or(FetchError::NotFound)?;

    let url = entry
        .item_page
        .clone()
        .unwrap_or_else(|| SourceId::Skinport.listing_url(item));

    let mut quote = PriceQuote::new(price, url);
    if let Some(currency) = &entry.currency {
        quote = quote.with_currency(currency.as_str());
    }
    Ok(quote.normalized())
}

#[async_trait]
impl SourceFetcher for SkinportFetcher {
    fn source(&self) -> SourceId {
        SourceId::Skinport
    }

    #[tracing::instrument(skip_all, fields(item_key = %item))]
    async fn fetch(&self, item: &ItemKey) -> Result<PriceQuote, FetchError> {
        let catalogue = self.catalogue().await?;
        quote_from_catalogue(item, &catalogue)
    }
}
