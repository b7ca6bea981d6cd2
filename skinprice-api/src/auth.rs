//! Cron Authentication
//!
//! The cleanup route is called by an external scheduler and authenticated
//! with a shared secret, sent either as `Authorization: Bearer <secret>` or
//! in the `X-Cron-Secret` header.

use crate::error::{ApiError, ApiResult};
use axum::http::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use skinprice_core::ConfigError;
use subtle::ConstantTimeEq;

/// Header carrying the shared secret when `Authorization` is not used.
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

// ============================================================================
// CRON SECRET (TYPE-SAFE)
// ============================================================================

/// Shared scheduler secret that is never logged or displayed.
#[derive(Clone)]
pub struct CronSecret(SecretString);

impl CronSecret {
    /// Create a new cron secret.
    ///
    /// # Errors
    /// Returns error if the secret is empty or whitespace.
    pub fn new(secret: String) -> Result<Self, ConfigError> {
        if secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "SKINPRICE_CRON_SECRET".to_string(),
            });
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Get the length of the secret without exposing it.
    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    /// Check if the secret is empty without exposing it.
    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    /// Compare a presented value against the secret in constant time.
    pub fn matches(&self, presented: &str) -> bool {
        self.0
            .expose_secret()
            .as_bytes()
            .ct_eq(presented.as_bytes())
            .into()
    }
}

impl std::fmt::Debug for CronSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CronSecret([REDACTED, {} chars])", self.len())
    }
}

// ============================================================================
// HEADER EXTRACTION
// ============================================================================

/// Pull the presented secret out of the request headers.
///
/// `Authorization: Bearer` wins over `X-Cron-Secret` when both are present.
pub fn presented_secret(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        return value.strip_prefix("Bearer ").map(str::trim);
    }

    headers
        .get(CRON_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}

/// Check the scheduler secret on a cleanup request.
///
/// A server started without a secret rejects every cleanup request.
pub fn authorize_cron(secret: Option<&CronSecret>, headers: &HeaderMap) -> ApiResult<()> {
    let Some(secret) = secret else {
        tracing::warn!("Cleanup requested but no cron secret is configured");
        return Err(ApiError::unauthorized("Cleanup endpoint is disabled"));
    };

    match presented_secret(headers) {
        Some(presented) if secret.matches(presented) => Ok(()),
        Some(_) => {
            tracing::warn!("Cleanup request with invalid cron secret");
            Err(ApiError::unauthorized("Invalid cron secret"))
        }
        None => Err(ApiError::unauthorized(
            "Authentication required: provide Authorization: Bearer or X-Cron-Secret",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn secret() -> CronSecret {
        CronSecret::new("s3cret-value".to_string()).unwrap()
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(CronSecret::new(String::new()).is_err());
        assert!(CronSecret::new("   ".to_string()).is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let debug = format!("{:?}", secret());
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_matches() {
        assert!(secret().matches("s3cret-value"));
        assert!(!secret().matches("s3cret-valuf"));
        assert!(!secret().matches("s3cret-value-longer"));
        assert!(!secret().matches("s3cret"));
        assert!(!secret().matches(""));
    }

    #[test]
    fn test_bearer_header_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer s3cret-value"),
        );
        assert!(authorize_cron(Some(&secret()), &headers).is_ok());
    }

    #[test]
    fn test_custom_header_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(CRON_SECRET_HEADER, HeaderValue::from_static("s3cret-value"));
        assert!(authorize_cron(Some(&secret()), &headers).is_ok());
    }

    #[test]
    fn test_wrong_or_missing_secret_rejected() {
        let mut headers = HeaderMap::new();
        assert!(authorize_cron(Some(&secret()), &headers).is_err());

        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer nope"),
        );
        let err = authorize_cron(Some(&secret()), &headers).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);

        // Non-bearer scheme is not accepted
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Basic s3cret-value"),
        );
        assert!(authorize_cron(Some(&secret()), &headers).is_err());
    }

    #[test]
    fn test_unconfigured_secret_rejects_everything() {
        let mut headers = HeaderMap::new();
        headers.insert(CRON_SECRET_HEADER, HeaderValue::from_static("anything"));
        assert!(authorize_cron(None, &headers).is_err());
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn matches_agrees_with_string_eq(
                configured in "[a-zA-Z0-9_-]{1,48}",
                presented in "[a-zA-Z0-9_-]{0,48}",
            ) {
                let secret = CronSecret::new(configured.clone()).unwrap();
                prop_assert_eq!(secret.matches(&presented), configured == presented);
                prop_assert!(secret.matches(&configured));
            }
        }
    }
}
