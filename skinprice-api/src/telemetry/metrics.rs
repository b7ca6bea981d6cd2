//! Prometheus Metrics Definitions
//!
//! Defines all skinprice metrics with their labels and exposes a /metrics
//! endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, CounterVec, Encoder,
    HistogramVec, IntCounter, TextEncoder,
};
use skinprice_core::ReconciliationResult;

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<SkinpriceMetrics>> = Lazy::new(SkinpriceMetrics::new);

/// Container for all skinprice metrics.
#[derive(Clone)]
pub struct SkinpriceMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Reconciliation counter - labels: status (hit, mixed, fresh, error)
    pub reconciliations_total: CounterVec,

    /// Per-source outcome counter - labels: source, outcome
    pub source_outcomes_total: CounterVec,

    /// Rows removed by cron-triggered sweeps
    pub sweep_deleted_rows_total: IntCounter,
}

impl SkinpriceMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "skinprice_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "skinprice_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            reconciliations_total: register_counter_vec!(
                "skinprice_reconciliations_total",
                "Total price reconciliations by cache status",
                &["status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register reconciliations_total: {}", e)))?,

            source_outcomes_total: register_counter_vec!(
                "skinprice_source_outcomes_total",
                "Per-marketplace reconciliation outcomes",
                &["source", "outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register source_outcomes_total: {}", e)))?,

            sweep_deleted_rows_total: register_int_counter!(
                "skinprice_sweep_deleted_rows_total",
                "Expired price cache rows deleted by the cleanup endpoint"
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register sweep_deleted_rows_total: {}", e)))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a completed reconciliation and the outcome of each source.
    pub fn record_reconciliation(&self, result: &ReconciliationResult) {
        self.reconciliations_total
            .with_label_values(&[result.status.as_str()])
            .inc();

        for entry in &result.entries {
            self.source_outcomes_total
                .with_label_values(&[entry.source.as_str(), entry.provenance.as_str()])
                .inc();
        }
        for omitted in &result.omitted {
            let outcome = match &omitted.error {
                Some(_) => "unavailable",
                None => "not_found",
            };
            self.source_outcomes_total
                .with_label_values(&[omitted.source.as_str(), outcome])
                .inc();
        }
    }

    /// Record a reconciliation that failed outright.
    pub fn record_reconciliation_error(&self) {
        self.reconciliations_total.with_label_values(&["error"]).inc();
    }

    /// Record rows deleted by a sweep.
    pub fn record_sweep(&self, deleted: u64) {
        self.sweep_deleted_rows_total.inc_by(deleted);
    }
}

/// Run `f` against the global metrics, if they initialised.
pub fn with_metrics(f: impl FnOnce(&SkinpriceMetrics)) {
    if let Ok(metrics) = METRICS.as_ref() {
        f(metrics);
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::core::Collector;
    use skinprice_core::{merge, CacheEntry, ItemKey, PriceQuote, SourceId, SourceOutcome};
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn metrics() -> Result<&'static SkinpriceMetrics, String> {
        METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))
    }

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        let metrics = metrics()?;
        assert!(!metrics.http_requests_total.desc().is_empty());
        Ok(())
    }

    #[test]
    fn test_record_http_request() -> Result<(), String> {
        let metrics = metrics()?;
        metrics.record_http_request("GET", "/api/prices/*item", 200, 0.015);
        let count = metrics
            .http_requests_total
            .with_label_values(&["GET", "/api/prices/*item", "200"])
            .get();
        assert!(count >= 1.0);
        Ok(())
    }

    #[test]
    fn test_record_reconciliation() -> Result<(), String> {
        let metrics = metrics()?;
        let item = ItemKey::parse("Metrics Test Item").map_err(|e| e.to_string())?;
        let now = chrono::Utc::now();
        let entry = CacheEntry::from_quote(
            item.clone(),
            SourceId::Steam,
            &PriceQuote::new(Decimal::new(150, 2), "https://example.test"),
            now,
            Duration::from_secs(300),
        );
        let result = merge(
            item,
            vec![
                SourceOutcome::Cached(entry),
                SourceOutcome::NoListing {
                    source: SourceId::Skinport,
                },
            ],
            2,
        );

        let before = metrics
            .source_outcomes_total
            .with_label_values(&["skinport", "not_found"])
            .get();
        metrics.record_reconciliation(&result);
        let after = metrics
            .source_outcomes_total
            .with_label_values(&["skinport", "not_found"])
            .get();
        assert!(after >= before + 1.0);
        Ok(())
    }

    #[test]
    fn test_record_sweep() -> Result<(), String> {
        let metrics = metrics()?;
        let before = metrics.sweep_deleted_rows_total.get();
        metrics.record_sweep(3);
        assert!(metrics.sweep_deleted_rows_total.get() >= before + 3);
        Ok(())
    }
}
