//! Constants for the Skinprice API
//!
//! Centralized values shared by the server, routes and marketplace clients.

// ============================================================================
// SERVER
// ============================================================================

/// Default bind host
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_PORT: u16 = 3000;

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

// ============================================================================
// MARKETPLACES
// ============================================================================

/// Steam application id for Counter-Strike 2
pub const CS2_APP_ID: u32 = 730;

/// Steam currency code for USD
pub const STEAM_CURRENCY_USD: u32 = 1;

/// Default Steam Community base URL
pub const STEAM_BASE_URL: &str = "https://steamcommunity.com";

/// Default Skinport API base URL
pub const SKINPORT_BASE_URL: &str = "https://api.skinport.com";

/// Default CSFloat base URL
pub const CSFLOAT_BASE_URL: &str = "https://csfloat.com";

/// User agent sent to marketplaces
pub const USER_AGENT: &str = concat!("skinprice/", env!("CARGO_PKG_VERSION"));
