//! Marketplace Clients
//!
//! `reqwest` implementations of [`SourceFetcher`] for Steam, Skinport and
//! CSFloat. Every client maps HTTP failures the same way:
//!
//! | response                  | error                      |
//! |---------------------------|----------------------------|
//! | 429                       | `RateLimited` (Retry-After) |
//! | 404                       | `NotFound`                 |
//! | other non-success         | `Network`                  |
//! | client timeout            | `Timeout`                  |
//! | connect / decode failure  | `Network`                  |

pub mod csfloat;
pub mod skinport;
pub mod steam;

pub use csfloat::CsFloatFetcher;
pub use skinport::SkinportFetcher;
pub use steam::SteamFetcher;

use crate::constants::{CSFLOAT_BASE_URL, SKINPORT_BASE_URL, STEAM_BASE_URL, USER_AGENT};
use crate::error::{ApiError, ApiResult};
use reqwest::{header::HeaderMap, Client, Response, StatusCode};
use rust_decimal::Decimal;
use secrecy::SecretString;
use skinprice_core::{FetchError, SourceId};
use skinprice_storage::SourceFetcher;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Marketplace client configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub steam_base_url: String,
    pub skinport_base_url: String,
    pub csfloat_base_url: String,
    /// CSFloat requires an API key; without one the source is disabled.
    pub csfloat_api_key: Option<SecretString>,
    /// HTTP client timeout, normally the cache policy's fetch timeout.
    pub request_timeout: Duration,
    /// How long the Skinport catalogue is reused between downloads.
    pub skinport_catalogue_ttl: Duration,
    /// Sources switched off via `SKINPRICE_DISABLED_SOURCES`.
    pub disabled: Vec<SourceId>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            steam_base_url: STEAM_BASE_URL.to_string(),
            skinport_base_url: SKINPORT_BASE_URL.to_string(),
            csfloat_base_url: CSFLOAT_BASE_URL.to_string(),
            csfloat_api_key: None,
            request_timeout: Duration::from_secs(4),
            skinport_catalogue_ttl: Duration::from_secs(300),
            disabled: Vec::new(),
        }
    }
}

impl ProviderConfig {
    /// Create ProviderConfig from environment variables.
    ///
    /// Environment variables:
    /// - `SKINPRICE_STEAM_BASE_URL`, `SKINPRICE_SKINPORT_BASE_URL`,
    ///   `SKINPRICE_CSFLOAT_BASE_URL`: Override marketplace endpoints
    /// - `SKINPRICE_CSFLOAT_API_KEY`: CSFloat API key
    /// - `SKINPRICE_DISABLED_SOURCES`: Comma-separated sources to skip
    /// - `SKINPRICE_SKINPORT_CATALOGUE_TTL_SECS`: Catalogue reuse window (default: 300)
    pub fn from_env(request_timeout: Duration) -> ApiResult<Self> {
        let defaults = Self::default();

        let disabled = match std::env::var("SKINPRICE_DISABLED_SOURCES") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(SourceId::from_str)
                .collect::<Result<Vec<_>, _>>()?,
            Err(_) => Vec::new(),
        };

        Ok(Self {
            steam_base_url: std::env::var("SKINPRICE_STEAM_BASE_URL")
                .unwrap_or(defaults.steam_base_url),
            skinport_base_url: std::env::var("SKINPRICE_SKINPORT_BASE_URL")
                .unwrap_or(defaults.skinport_base_url),
            csfloat_base_url: std::env::var("SKINPRICE_CSFLOAT_BASE_URL")
                .unwrap_or(defaults.csfloat_base_url),
            csfloat_api_key: std::env::var("SKINPRICE_CSFLOAT_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty())
                .map(SecretString::from),
            request_timeout,
            skinport_catalogue_ttl: Duration::from_secs(
                std::env::var("SKINPRICE_SKINPORT_CATALOGUE_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            disabled,
        })
    }

    fn enabled(&self, source: SourceId) -> bool {
        !self.disabled.contains(&source)
    }
}

/// Build every enabled marketplace client.
pub fn build_fetchers(config: &ProviderConfig) -> ApiResult<Vec<Arc<dyn SourceFetcher>>> {
    let client = http_client(config.request_timeout)?;
    let mut fetchers: Vec<Arc<dyn SourceFetcher>> = Vec::new();

    if config.enabled(SourceId::Steam) {
        fetchers.push(Arc::new(SteamFetcher::new(
            client.clone(),
            &config.steam_base_url,
            config.request_timeout,
        )));
    }
    if config.enabled(SourceId::Skinport) {
        fetchers.push(Arc::new(
            SkinportFetcher::new(
                client.clone(),
                &config.skinport_base_url,
                config.request_timeout,
            )
            .with_catalogue_ttl(config.skinport_catalogue_ttl),
        ));
    }
    if config.enabled(SourceId::CsFloat) {
        match &config.csfloat_api_key {
            Some(key) => fetchers.push(Arc::new(CsFloatFetcher::new(
                client.clone(),
                &config.csfloat_base_url,
                config.request_timeout,
                key.clone(),
            ))),
            None => tracing::warn!("SKINPRICE_CSFLOAT_API_KEY not set; CSFloat disabled"),
        }
    }

    let sources: Vec<&str> = fetchers.iter().map(|f| f.source().as_str()).collect();
    tracing::info!(?sources, "Marketplace clients configured");

    Ok(fetchers)
}

/// Shared HTTP client with the marketplace timeout and user agent.
pub fn http_client(timeout: Duration) -> ApiResult<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ApiError::internal_error(format!("Failed to build HTTP client: {}", e)))
}

// ============================================================================
// RESPONSE MAPPING
// ============================================================================

/// Map a transport-level reqwest error.
pub(crate) fn transport_error(source: SourceId, err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        tracing::debug!(%source, error = %err, "Marketplace request timed out");
        FetchError::Timeout { after: timeout }
    } else {
        tracing::debug!(%source, error = %err, "Marketplace request failed");
        FetchError::network(format!("{} request failed: {}", source, err))
    }
}

/// Reject non-success responses with the matching fetch error.
pub(crate) fn check_status(source: SourceId, response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(status_error(source, status, response.headers()))
}

pub(crate) fn status_error(source: SourceId, status: StatusCode, headers: &HeaderMap) -> FetchError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited {
            retry_after: parse_retry_after(headers),
        },
        StatusCode::NOT_FOUND => FetchError::NotFound,
        other => FetchError::network(format!("{} returned HTTP {}", source, other.as_u16())),
    }
}

/// Body decode failures are reported as network errors.
pub(crate) fn decode_error(source: SourceId, err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        return transport_error(source, err, timeout);
    }
    FetchError::network(format!("{} returned an unreadable body: {}", source, err))
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Parse a formatted price such as `"$8,500.00"` or `"8500.00 USD"`.
pub(crate) fn parse_money(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok().filter(|d| *d > Decimal::ZERO)
}

/// Convert an upstream float to a decimal.
pub(crate) fn decimal_from_f64(value: f64) -> Option<Decimal> {
    Decimal::try_from(value).ok()
}
