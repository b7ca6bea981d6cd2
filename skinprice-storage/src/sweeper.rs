//! Cleanup sweeper.
//!
//! Deletes cache rows that expired more than a grace window ago. Rows inside
//! the window are kept as stale-fallback candidates. Sweeping is idempotent:
//! a second run right after the first deletes nothing.

use skinprice_core::{Clock, StorageError, SystemClock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::store::PriceCacheStore;

/// Default interval between sweeps (30 minutes).
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 1800;

/// Default retention past expiry (1 hour).
pub const DEFAULT_SWEEP_GRACE_SECS: u64 = 3600;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the cleanup sweeper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    /// How often the background loop sweeps (default: 30 minutes)
    pub interval: Duration,

    /// How long an expired row is kept for stale fallback (default: 1 hour)
    pub grace: Duration,

    /// Whether to log every sweep, including empty ones (default: false)
    pub log_sweeps: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            grace: Duration::from_secs(DEFAULT_SWEEP_GRACE_SECS),
            log_sweeps: false,
        }
    }
}

impl SweepConfig {
    /// Create SweepConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `SKINPRICE_SWEEP_INTERVAL_SECS`: Interval between sweeps (default: 1800)
    /// - `SKINPRICE_SWEEP_GRACE_SECS`: Retention past expiry (default: 3600)
    /// - `SKINPRICE_SWEEP_LOG`: Log empty sweeps too (default: false)
    ///
    /// A zero grace is replaced by the default: expired rows must outlive
    /// expiry to serve as fallback.
    pub fn from_env() -> Self {
        let interval = Duration::from_secs(
            std::env::var("SKINPRICE_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
        );

        let grace = Duration::from_secs(
            std::env::var("SKINPRICE_SWEEP_GRACE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_SWEEP_GRACE_SECS),
        );

        let log_sweeps = std::env::var("SKINPRICE_SWEEP_LOG")
            .ok()
            .map(|s| s.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            interval,
            grace,
            log_sweeps,
        }
    }

    /// Replace a zero interval or grace with the defaults.
    ///
    /// A zero grace would delete rows the instant they expire, leaving
    /// nothing to fall back on.
    pub fn normalized(mut self) -> Self {
        if self.interval.is_zero() {
            tracing::warn!("Sweep interval of zero replaced by the default");
            self.interval = Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS);
        }
        if self.grace.is_zero() {
            tracing::warn!("Sweep grace of zero replaced by the default");
            self.grace = Duration::from_secs(DEFAULT_SWEEP_GRACE_SECS);
        }
        self
    }

    /// Short intervals for local development.
    pub fn development() -> Self {
        Self {
            interval: Duration::from_secs(60),
            grace: Duration::from_secs(600),
            log_sweeps: true,
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Cumulative sweeper counters.
#[derive(Debug, Default)]
pub struct SweepMetrics {
    pub sweeps: AtomicU64,
    pub rows_deleted: AtomicU64,
    pub failures: AtomicU64,
}

impl SweepMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SweepSnapshot {
        SweepSnapshot {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            rows_deleted: self.rows_deleted.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SweepMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSnapshot {
    pub sweeps: u64,
    pub rows_deleted: u64,
    pub failures: u64,
}

// ============================================================================
// SWEEPER
// ============================================================================

/// Deletes rows expired beyond the grace window.
#[derive(Clone)]
pub struct CleanupSweeper {
    store: Arc<dyn PriceCacheStore>,
    config: SweepConfig,
    clock: Arc<dyn Clock>,
    metrics: Arc<SweepMetrics>,
}

impl std::fmt::Debug for CleanupSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupSweeper")
            .field("config", &self.config)
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

impl CleanupSweeper {
    /// A zero interval or grace in `config` is replaced by the default.
    pub fn new(store: Arc<dyn PriceCacheStore>, config: SweepConfig) -> Self {
        Self {
            store,
            config: config.normalized(),
            clock: Arc::new(SystemClock),
            metrics: Arc::new(SweepMetrics::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<SweepMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run one sweep. Returns the number of rows deleted.
    pub async fn sweep_once(&self) -> Result<u64, StorageError> {
        self.metrics.sweeps.fetch_add(1, Ordering::Relaxed);

        let grace = chrono::Duration::from_std(self.config.grace)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_SWEEP_GRACE_SECS as i64));
        let cutoff = self.clock.now() - grace;

        match self.store.delete_expired_before(cutoff).await {
            Ok(deleted) => {
                self.metrics
                    .rows_deleted
                    .fetch_add(deleted, Ordering::Relaxed);
                if deleted > 0 || self.config.log_sweeps {
                    tracing::info!(deleted, %cutoff, "Price cache sweep completed");
                } else {
                    tracing::trace!("Price cache sweep found nothing to delete");
                }
                Ok(deleted)
            }
            Err(e) => {
                self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %e, "Price cache sweep failed");
                Err(e)
            }
        }
    }

    /// Sweep on an interval until the shutdown flag flips to `true`.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) -> Arc<SweepMetrics> {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            grace_secs = self.config.grace.as_secs(),
            "Cleanup sweeper started"
        );

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("Cleanup sweeper shutting down");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    // Failures are counted and logged; the next tick retries.
                    let _ = self.sweep_once().await;
                }
            }
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            sweeps = snapshot.sweeps,
            rows_deleted = snapshot.rows_deleted,
            failures = snapshot.failures,
            "Cleanup sweeper stopped"
        );

        self.metrics
    }

    /// Spawn [`CleanupSweeper::run`] on the current runtime.
    pub fn spawn(self, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<Arc<SweepMetrics>> {
        tokio::spawn(self.run(shutdown_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SweepConfig::default();
        assert_eq!(config.interval, Duration::from_secs(1800));
        assert_eq!(config.grace, Duration::from_secs(3600));
        assert!(!config.grace.is_zero());
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = SweepMetrics::new();
        metrics.sweeps.fetch_add(2, Ordering::Relaxed);
        metrics.rows_deleted.fetch_add(10, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sweeps, 2);
        assert_eq!(snapshot.rows_deleted, 10);
        assert_eq!(snapshot.failures, 0);
    }
}
