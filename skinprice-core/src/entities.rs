//! Cache rows and marketplace quotes.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::identity::{ItemKey, SourceId};

/// Currency assumed when a marketplace does not report one.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Fractional digits kept for prices.
pub const PRICE_SCALE: u32 = 2;

/// Fractional digits kept for float (wear) values.
pub const FLOAT_SCALE: u32 = 4;

/// A price as reported by one marketplace, before it is cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: Decimal,
    pub currency: String,
    pub float_value: Option<Decimal>,
    /// Listing page the price was read from.
    pub url: String,
}

impl PriceQuote {
    /// Quote in the default currency with no float value.
    pub fn new(price: Decimal, url: impl Into<String>) -> Self {
        Self {
            price,
            currency: DEFAULT_CURRENCY.to_string(),
            float_value: None,
            url: url.into(),
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_float(mut self, float_value: Decimal) -> Self {
        self.float_value = Some(float_value);
        self
    }

    /// Round to storage precision and canonicalize the currency code.
    ///
    /// Currency codes that are not three ASCII letters fall back to
    /// [`DEFAULT_CURRENCY`].
    pub fn normalized(mut self) -> Self {
        self.price = self
            .price
            .round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero);
        self.float_value = self.float_value.map(|f| {
            f.round_dp_with_strategy(FLOAT_SCALE, RoundingStrategy::MidpointAwayFromZero)
        });
        self.currency = normalize_currency(&self.currency);
        self
    }
}

/// Uppercase a 3-letter currency code, or fall back to the default.
pub fn normalize_currency(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        trimmed.to_ascii_uppercase()
    } else {
        DEFAULT_CURRENCY.to_string()
    }
}

/// One cached price row, unique per (item, source).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub item_key: ItemKey,
    pub source: SourceId,
    pub price: Decimal,
    pub currency: String,
    pub float_value: Option<Decimal>,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Build the row written for a successful fetch at `now`.
    pub fn from_quote(
        item_key: ItemKey,
        source: SourceId,
        quote: &PriceQuote,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let quote = quote.clone().normalized();
        Self {
            item_key,
            source,
            price: quote.price,
            currency: quote.currency,
            float_value: quote.float_value,
            cached_at: now,
            expires_at: expiry_from(now, ttl),
        }
    }

    /// Valid iff `expires_at > now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Inverse of [`CacheEntry::is_valid_at`].
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_valid_at(now)
    }

    /// Time since the row was last written.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.cached_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// `now + ttl`, saturating instead of overflowing on absurd TTLs.
pub fn expiry_from(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn key() -> ItemKey {
        ItemKey::parse("AWP | Asiimov (Field-Tested)").unwrap()
    }

    #[test]
    fn test_quote_normalization_rounds_price_and_float() {
        let quote = PriceQuote::new(dec("8500.005"), "https://example.test")
            .with_float(dec("0.123456"))
            .with_currency("usd")
            .normalized();

        assert_eq!(quote.price, dec("8500.01"));
        assert_eq!(quote.float_value, Some(dec("0.1235")));
        assert_eq!(quote.currency, "USD");
    }

    #[test]
    fn test_invalid_currency_falls_back_to_default() {
        assert_eq!(normalize_currency("eur"), "EUR");
        assert_eq!(normalize_currency("dollars"), DEFAULT_CURRENCY);
        assert_eq!(normalize_currency(""), DEFAULT_CURRENCY);
        assert_eq!(normalize_currency("U$D"), DEFAULT_CURRENCY);
    }

    #[test]
    fn test_entry_expiry_is_cached_at_plus_ttl() {
        let now = Utc::now();
        let quote = PriceQuote::new(dec("12.50"), "https://example.test");
        let entry = CacheEntry::from_quote(
            key(),
            SourceId::Steam,
            &quote,
            now,
            Duration::from_secs(300),
        );

        assert_eq!(entry.cached_at, now);
        assert_eq!(entry.expires_at - entry.cached_at, chrono::Duration::seconds(300));
    }

    #[test]
    fn test_entry_validity_boundary() {
        let now = Utc::now();
        let quote = PriceQuote::new(dec("1.00"), "u");
        let entry = CacheEntry::from_quote(
            key(),
            SourceId::Skinport,
            &quote,
            now,
            Duration::from_secs(60),
        );

        assert!(entry.is_valid_at(now));
        assert!(entry.is_stale_at(entry.expires_at));
        assert!(entry.is_stale_at(entry.expires_at + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_zero_ttl_is_immediately_stale() {
        let now = Utc::now();
        let quote = PriceQuote::new(dec("1.00"), "u");
        let entry =
            CacheEntry::from_quote(key(), SourceId::CsFloat, &quote, now, Duration::ZERO);
        assert!(entry.is_stale_at(now));
    }

    #[test]
    fn test_expiry_saturates() {
        let now = Utc::now();
        let far = expiry_from(now, Duration::from_secs(u64::MAX));
        assert!(far > now);
    }
}
