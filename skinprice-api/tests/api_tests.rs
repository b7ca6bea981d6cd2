//! HTTP-level tests driving the router with `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use skinprice_api::{create_api_router, ApiConfig, AppState, CronSecret};
use skinprice_core::{Clock, FetchError, SourceId};
use skinprice_storage::{CleanupSweeper, InMemoryPriceStore, PriceCacheStore, Reconciler, SweepConfig};
use skinprice_test_utils::fixtures::{entry_aged, scenario_item, scenario_prices, test_policy};
use skinprice_test_utils::{FailingStore, ManualClock, ScriptedFetcher};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const SECRET: &str = "cron-secret-for-tests";
const ITEM_PATH: &str = "/api/prices/AK-47%20%7C%20Redline%20(Field-Tested)";
const TTL: Duration = Duration::from_secs(300);

struct TestApp {
    router: Router,
    clock: Arc<ManualClock>,
    store: Arc<InMemoryPriceStore>,
    fetchers: Vec<Arc<ScriptedFetcher>>,
}

impl TestApp {
    fn new() -> Self {
        let fetchers = scenario_prices()
            .into_iter()
            .map(|(source, price)| Arc::new(ScriptedFetcher::returning(source, price)))
            .collect();
        Self::with_fetchers(fetchers, Some(SECRET))
    }

    fn with_fetchers(fetchers: Vec<Arc<ScriptedFetcher>>, secret: Option<&str>) -> Self {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(InMemoryPriceStore::with_clock(clock.clone()));
        let router = router_for(store.clone(), clock.clone(), &fetchers, secret);
        Self {
            router,
            clock,
            store,
            fetchers,
        }
    }

    fn total_calls(&self) -> usize {
        self.fetchers.iter().map(|f| f.calls()).sum()
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        send(&self.router, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }
}

fn router_for(
    store: Arc<dyn PriceCacheStore>,
    clock: Arc<ManualClock>,
    fetchers: &[Arc<ScriptedFetcher>],
    secret: Option<&str>,
) -> Router {
    let mut reconciler = Reconciler::new(store.clone(), test_policy()).with_clock(clock.clone());
    for fetcher in fetchers {
        reconciler = reconciler.with_fetcher(fetcher.clone());
    }
    let sweeper = CleanupSweeper::new(store, SweepConfig::default()).with_clock(clock);
    let secret = secret.map(|s| CronSecret::new(s.to_string()).unwrap());

    create_api_router(
        AppState::new(Arc::new(reconciler), sweeper, secret),
        &ApiConfig::default(),
    )
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}

fn prices(body: &Value) -> &Vec<Value> {
    body["prices"].as_array().unwrap()
}

fn price_for<'a>(body: &'a Value, market: &str) -> &'a Value {
    prices(body)
        .iter()
        .find(|p| p["market"] == market)
        .unwrap_or_else(|| panic!("no {} price in {}", market, body))
}

// ============================================================================
// PRICES
// ============================================================================

#[tokio::test]
async fn cold_then_warm_lookup() {
    let app = TestApp::new();

    let (status, body) = app.get(ITEM_PATH).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["itemName"], "AK-47 | Redline (Field-Tested)");
    assert_eq!(body["cacheHit"], false);
    assert_eq!(body["marketplacesChecked"], 3);
    assert_eq!(prices(&body).len(), 3);
    for p in prices(&body) {
        assert_eq!(p["source"], "fresh");
        assert!(p.get("cachedAt").is_none());
    }
    assert_eq!(price_for(&body, "Steam")["price"].as_f64(), Some(8500.0));
    assert_eq!(price_for(&body, "CSFloat")["floatValue"].as_f64(), Some(0.1523));
    assert!(price_for(&body, "Skinport").get("floatValue").is_none());
    assert_eq!(app.total_calls(), 3);
    assert_eq!(app.store.len().await, 3);

    app.clock.advance(Duration::from_secs(120));

    let (status, body) = app.get(ITEM_PATH).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cacheHit"], true);
    for p in prices(&body) {
        assert_eq!(p["source"], "cache");
        assert!(p.get("cachedAt").is_some());
        assert!(p["url"].as_str().unwrap().starts_with("https://"));
    }
    assert_eq!(app.total_calls(), 3);
}

#[tokio::test]
async fn rate_limited_source_served_stale_with_warning() {
    let [(steam, a), (_, _), (csfloat, c)] = scenario_prices();
    let fetchers = vec![
        Arc::new(ScriptedFetcher::returning(steam, a)),
        Arc::new(ScriptedFetcher::failing(
            SourceId::Skinport,
            FetchError::RateLimited { retry_after: None },
        )),
        Arc::new(ScriptedFetcher::returning(csfloat, c)),
    ];
    let app = TestApp::with_fetchers(fetchers, Some(SECRET));
    let item = scenario_item();
    let now = app.clock.now();
    for (source, price) in scenario_prices() {
        app.store
            .insert_raw(entry_aged(&item, source, price, now, Duration::from_secs(600), TTL))
            .await;
    }

    let (status, body) = app.get(ITEM_PATH).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cacheHit"], false);

    let skinport = price_for(&body, "Skinport");
    assert_eq!(skinport["source"], "stale_cache");
    assert!(skinport["warning"].as_str().unwrap().contains("rate limiting"));
    assert!(skinport.get("cachedAt").is_some());

    assert_eq!(price_for(&body, "Steam")["source"], "fresh");
    assert_eq!(price_for(&body, "CSFloat")["source"], "fresh");
}

#[tokio::test]
async fn not_found_source_is_omitted_silently() {
    let [(steam, a), (skinport, b), _] = scenario_prices();
    let fetchers = vec![
        Arc::new(ScriptedFetcher::returning(steam, a)),
        Arc::new(ScriptedFetcher::returning(skinport, b)),
        Arc::new(ScriptedFetcher::failing(SourceId::CsFloat, FetchError::NotFound)),
    ];
    let app = TestApp::with_fetchers(fetchers, Some(SECRET));

    let (status, body) = app.get(ITEM_PATH).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["marketplacesChecked"], 3);
    assert_eq!(prices(&body).len(), 2);
    assert!(prices(&body).iter().all(|p| p["market"] != "CSFloat"));
    assert!(prices(&body).iter().all(|p| p.get("warning").is_none()));
}

#[tokio::test]
async fn invalid_item_is_rejected() {
    let app = TestApp::new();

    let (status, body) = app.get("/api/prices/%20%20%20").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let long = "x".repeat(300);
    let (status, _) = app.get(&format!("/api/prices/{}", long)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(app.total_calls(), 0);
}

#[tokio::test]
async fn store_outage_is_a_generic_503() {
    let clock = Arc::new(ManualClock::new());
    let fetchers: Vec<Arc<ScriptedFetcher>> = scenario_prices()
        .into_iter()
        .map(|(source, price)| Arc::new(ScriptedFetcher::returning(source, price)))
        .collect();
    let router = router_for(
        Arc::new(FailingStore::unavailable()),
        clock,
        &fetchers,
        Some(SECRET),
    );

    let (status, body) =
        send(&router, Request::builder().uri(ITEM_PATH).body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "STORE_UNAVAILABLE");
    let message = body["message"].as_str().unwrap();
    assert!(!message.to_lowercase().contains("connection"));
}

// ============================================================================
// CRON
// ============================================================================

fn cleanup_request(method: &str, auth: Option<(&str, String)>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri("/api/cron/cleanup");
    if let Some((name, value)) = auth {
        builder = builder.header(name, value);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn cleanup_requires_the_shared_secret() {
    let app = TestApp::new();

    let (status, body) = send(&app.router, cleanup_request("POST", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let wrong = Some((header::AUTHORIZATION.as_str(), "Bearer wrong".to_string()));
    let (status, _) = send(&app.router, cleanup_request("POST", wrong)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn cleanup_deletes_rows_past_grace_and_is_idempotent() {
    let app = TestApp::new();
    let item = scenario_item();
    let now = app.clock.now();
    // Two hours past expiry, beyond the default one-hour grace
    app.store
        .insert_raw(entry_aged(&item, SourceId::Steam, "1.00", now, Duration::from_secs(7500), TTL))
        .await;
    // Ten minutes past expiry, still a fallback candidate
    app.store
        .insert_raw(entry_aged(&item, SourceId::Skinport, "1.00", now, Duration::from_secs(900), TTL))
        .await;

    let bearer = || Some((header::AUTHORIZATION.as_str(), format!("Bearer {}", SECRET)));

    let (status, body) = send(&app.router, cleanup_request("POST", bearer())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);
    assert_eq!(body["graceSeconds"], 3600);

    // GET with the custom header reaches the same sweep
    let custom = Some(("x-cron-secret", SECRET.to_string()));
    let (status, body) = send(&app.router, cleanup_request("GET", custom)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 0);

    assert_eq!(app.store.len().await, 1);
}

#[tokio::test]
async fn cleanup_disabled_without_configured_secret() {
    let fetchers = scenario_prices()
        .into_iter()
        .map(|(source, price)| Arc::new(ScriptedFetcher::returning(source, price)))
        .collect();
    let app = TestApp::with_fetchers(fetchers, None);

    let auth = Some(("x-cron-secret", SECRET.to_string()));
    let (status, _) = send(&app.router, cleanup_request("POST", auth)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// HEALTH & METRICS
// ============================================================================

#[tokio::test]
async fn health_endpoints() {
    let app = TestApp::new();

    let (status, body) = app.get("/health/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("pong".to_string()));

    let (status, body) = app.get("/health/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.get("/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["details"]["store"]["status"], "healthy");
}

#[tokio::test]
async fn readiness_reports_unreachable_store() {
    let router = router_for(
        Arc::new(FailingStore::unavailable()),
        Arc::new(ManualClock::new()),
        &[],
        None,
    );

    let (status, body) =
        send(&router, Request::builder().uri("/health/ready").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["details"]["store"]["status"], "unhealthy");
}

#[tokio::test]
async fn metrics_endpoint_exposes_counters() {
    let app = TestApp::new();
    let (status, _) = app.get(ITEM_PATH).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = body.as_str().unwrap();
    assert!(text.contains("skinprice_http_requests_total"));
    assert!(text.contains("skinprice_reconciliations_total"));
    assert!(text.contains("/api/prices/*item"));
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}
