//! Identity types: normalized item keys and marketplace identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Maximum accepted length of an item key, in characters.
pub const MAX_ITEM_KEY_LEN: usize = 256;

// ============================================================================
// ITEM KEY
// ============================================================================

/// Normalized catalog item identifier.
///
/// Keys are trimmed and internal whitespace runs are collapsed to a single
/// space, so `"AK-47 |  Redline"` and `" AK-47 | Redline "` address the same
/// cache rows. Case is preserved: marketplaces treat market hash names as
/// case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemKey(String);

impl ItemKey {
    /// Parse and normalize a raw item name.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");

        if normalized.is_empty() {
            return Err(ValidationError::EmptyItemKey);
        }

        let len = normalized.chars().count();
        if len > MAX_ITEM_KEY_LEN {
            return Err(ValidationError::ItemKeyTooLong {
                len,
                max: MAX_ITEM_KEY_LEN,
            });
        }

        Ok(Self(normalized))
    }

    /// The normalized key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key, returning the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ItemKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ItemKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ItemKey> for String {
    fn from(key: ItemKey) -> Self {
        key.0
    }
}

impl FromStr for ItemKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ============================================================================
// SOURCE ID
// ============================================================================

/// A marketplace consulted for prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    Steam,
    Skinport,
    #[serde(rename = "csfloat")]
    CsFloat,
}

impl SourceId {
    /// Every known source, in a stable order.
    pub const ALL: [SourceId; 3] = [SourceId::Steam, SourceId::Skinport, SourceId::CsFloat];

    /// Storage and wire identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Steam => "steam",
            SourceId::Skinport => "skinport",
            SourceId::CsFloat => "csfloat",
        }
    }

    /// Human-facing marketplace name.
    pub fn display_name(&self) -> &'static str {
        match self {
            SourceId::Steam => "Steam",
            SourceId::Skinport => "Skinport",
            SourceId::CsFloat => "CSFloat",
        }
    }

    /// Whether this marketplace reports a wear/float value with its listings.
    pub fn exposes_float(&self) -> bool {
        matches!(self, SourceId::CsFloat)
    }

    /// Public listing page for an item on this marketplace.
    ///
    /// Cached rows carry no URL, so the listing link is rebuilt from the key.
    pub fn listing_url(&self, item: &ItemKey) -> String {
        let encoded = urlencoding::encode(item.as_str());
        match self {
            SourceId::Steam => {
                format!("https://steamcommunity.com/market/listings/730/{}", encoded)
            }
            SourceId::Skinport => format!("https://skinport.com/market?search={}", encoded),
            SourceId::CsFloat => {
                format!("https://csfloat.com/search?market_hash_name={}", encoded)
            }
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "steam" => Ok(SourceId::Steam),
            "skinport" => Ok(SourceId::Skinport),
            "csfloat" => Ok(SourceId::CsFloat),
            other => Err(ValidationError::UnknownSource {
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_item_key_normalizes_whitespace() {
        let key = ItemKey::parse("  AK-47 |   Redline  (Field-Tested) ").unwrap();
        assert_eq!(key.as_str(), "AK-47 | Redline (Field-Tested)");
    }

    #[test]
    fn test_item_key_rejects_empty() {
        assert_eq!(ItemKey::parse("   "), Err(ValidationError::EmptyItemKey));
        assert_eq!(ItemKey::parse(""), Err(ValidationError::EmptyItemKey));
    }

    #[test]
    fn test_item_key_rejects_too_long() {
        let raw = "x".repeat(MAX_ITEM_KEY_LEN + 1);
        assert!(matches!(
            ItemKey::parse(&raw),
            Err(ValidationError::ItemKeyTooLong { .. })
        ));
    }

    #[test]
    fn test_item_key_preserves_case() {
        let key = ItemKey::parse("StatTrak™ M4A1-S").unwrap();
        assert_eq!(key.as_str(), "StatTrak™ M4A1-S");
    }

    #[test]
    fn test_item_key_serde_normalizes() {
        let key: ItemKey = serde_json::from_str("\"  Glock-18 |  Fade \"").unwrap();
        assert_eq!(key.as_str(), "Glock-18 | Fade");
        assert!(serde_json::from_str::<ItemKey>("\"  \"").is_err());
    }

    #[test]
    fn test_source_id_round_trips_through_str() {
        for source in SourceId::ALL {
            assert_eq!(source.as_str().parse::<SourceId>().unwrap(), source);
        }
        assert!("buff".parse::<SourceId>().is_err());
    }

    #[test]
    fn test_source_id_serde_uses_lowercase() {
        let json = serde_json::to_string(&SourceId::CsFloat).unwrap();
        assert_eq!(json, "\"csfloat\"");
    }

    #[test]
    fn test_listing_url_encodes_item() {
        let key = ItemKey::parse("AK-47 | Redline").unwrap();
        let url = SourceId::Steam.listing_url(&key);
        assert_eq!(
            url,
            "https://steamcommunity.com/market/listings/730/AK-47%20%7C%20Redline"
        );
    }

    proptest! {
        #[test]
        fn prop_item_key_parse_is_idempotent(raw in "[ a-zA-Z0-9|()-]{1,64}") {
            if let Ok(key) = ItemKey::parse(&raw) {
                let again = ItemKey::parse(key.as_str()).unwrap();
                prop_assert_eq!(again, key);
            }
        }

        #[test]
        fn prop_item_key_has_no_edge_or_double_spaces(raw in "[ a-z]{1,64}") {
            if let Ok(key) = ItemKey::parse(&raw) {
                let s = key.as_str();
                prop_assert!(!s.starts_with(' '));
                prop_assert!(!s.ends_with(' '));
                prop_assert!(!s.contains("  "));
            }
        }
    }
}
