//! Skinprice API Server Entry Point
//!
//! Loads configuration, builds the store and marketplace clients, starts the
//! background sweeper and serves HTTP until ctrl-c.

use axum::Router;
use skinprice_api::telemetry::{init_tracing, TelemetryConfig};
use skinprice_api::{build_state, create_api_router, ApiError, ApiResult, Settings};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::default())?;

    let settings = Settings::from_env()?;
    let state = build_state(&settings).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = if settings.api.sweep_enabled {
        Some(state.sweeper.clone().spawn(shutdown_rx))
    } else {
        tracing::info!("Background sweeper disabled");
        None
    };

    let app: Router = create_api_router(state, &settings.api);

    let addr = settings.api.bind_addr()?;
    tracing::info!(%addr, "Starting skinprice API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let mut server_rx = shutdown_tx.subscribe();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = server_rx.wait_for(|stop| *stop).await;
    });

    let mut serve = tokio::spawn(async move { server.await });

    let finished = tokio::select! {
        joined = &mut serve => Some(joined),
        _ = tokio::signal::ctrl_c() => None,
    };
    let outcome = match finished {
        Some(joined) => joined,
        None => {
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
            serve.await
        }
    };
    // Stops the sweeper when the server exited on its own
    let _ = shutdown_tx.send(true);

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(ApiError::internal_error(format!("Server error: {}", e))),
        Err(e) => return Err(ApiError::internal_error(format!("Server task failed: {}", e))),
    }

    if let Some(handle) = sweeper {
        match handle.await {
            Ok(metrics) => {
                let snapshot = metrics.snapshot();
                tracing::info!(
                    sweeps = snapshot.sweeps,
                    rows_deleted = snapshot.rows_deleted,
                    "Sweeper stopped"
                );
            }
            Err(e) => tracing::error!(error = %e, "Sweeper task failed"),
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
