//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use skinprice_core::CachePolicy;
use skinprice_storage::{
    CleanupSweeper, FetchLock, InMemoryPriceStore, PgAdvisoryFetchLock, PostgresPriceStore,
    PriceCacheStore, Reconciler, SweepConfig,
};

use crate::auth::CronSecret;
use crate::config::{cache_policy_from_env, sweep_config_from_env, ApiConfig, StoreBackend};
use crate::db::DbConfig;
use crate::error::ApiResult;
use crate::providers::{build_fetchers, ProviderConfig};

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<Reconciler>,
    /// Shares its store and counters with the background sweeper.
    pub sweeper: CleanupSweeper,
    pub store: Arc<dyn PriceCacheStore>,
    /// `None` disables the cleanup route.
    pub cron_secret: Option<CronSecret>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        reconciler: Arc<Reconciler>,
        sweeper: CleanupSweeper,
        cron_secret: Option<CronSecret>,
    ) -> Self {
        Self {
            store: Arc::clone(reconciler.store()),
            reconciler,
            sweeper,
            cron_secret,
            start_time: Instant::now(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("reconciler", &self.reconciler)
            .field("sweeper", &self.sweeper)
            .field("cron_secret", &self.cron_secret)
            .finish()
    }
}

crate::impl_from_ref!(Arc<Reconciler>, reconciler);
crate::impl_from_ref!(CleanupSweeper, sweeper);
crate::impl_from_ref!(Arc<dyn PriceCacheStore>, store);

// ============================================================================
// BOOTSTRAP
// ============================================================================

/// Every configuration section the server needs.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api: ApiConfig,
    pub policy: CachePolicy,
    pub sweep: SweepConfig,
    pub db: DbConfig,
    pub providers: ProviderConfig,
}

impl Settings {
    /// Load every configuration section from the environment.
    pub fn from_env() -> ApiResult<Self> {
        let api = ApiConfig::from_env()?;
        let policy = cache_policy_from_env()?;
        let providers = ProviderConfig::from_env(policy.fetch_timeout)?;
        Ok(Self {
            api,
            policy,
            sweep: sweep_config_from_env(),
            db: DbConfig::from_env(),
            providers,
        })
    }
}

/// Build the store, marketplace clients, reconciler and sweeper.
pub async fn build_state(settings: &Settings) -> ApiResult<AppState> {
    let (store, fetch_lock): (Arc<dyn PriceCacheStore>, Option<Arc<dyn FetchLock>>) =
        match settings.api.store {
            StoreBackend::Postgres => {
                let pool = settings.db.create_pool()?;
                let store = PostgresPriceStore::new(pool.clone());
                store.ensure_schema().await?;

                let lock: Option<Arc<dyn FetchLock>> = if settings.api.distributed_lock {
                    Some(Arc::new(PgAdvisoryFetchLock::new(pool)))
                } else {
                    None
                };
                (Arc::new(store), lock)
            }
            StoreBackend::Memory => {
                if settings.api.distributed_lock {
                    tracing::warn!("SKINPRICE_DISTRIBUTED_LOCK ignored for the in-memory store");
                }
                (Arc::new(InMemoryPriceStore::new()), None)
            }
        };

    let mut reconciler = Reconciler::new(Arc::clone(&store), settings.policy.clone());
    for fetcher in build_fetchers(&settings.providers)? {
        reconciler = reconciler.with_fetcher(fetcher);
    }
    if let Some(lock) = fetch_lock {
        reconciler = reconciler.with_fetch_lock(lock);
    }

    let sweeper = CleanupSweeper::new(store, settings.sweep.clone());

    tracing::info!(
        store = ?settings.api.store,
        distributed_lock = settings.api.distributed_lock,
        ttl_secs = settings.policy.ttl.as_secs(),
        "Application state built"
    );

    Ok(AppState::new(
        Arc::new(reconciler),
        sweeper,
        settings.api.cron_secret.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_memory_state() {
        let settings = Settings {
            api: ApiConfig {
                store: StoreBackend::Memory,
                distributed_lock: true,
                ..ApiConfig::default()
            },
            policy: CachePolicy::default(),
            sweep: SweepConfig::default(),
            db: DbConfig::default(),
            providers: ProviderConfig::default(),
        };

        let state = build_state(&settings).await.unwrap();
        let sources: Vec<_> = state.reconciler.sources().collect();

        // CSFloat needs an API key
        assert_eq!(sources.len(), 2);
        assert!(state.cron_secret.is_none());
        assert!(state.store.ping().await.is_ok());
    }
}
