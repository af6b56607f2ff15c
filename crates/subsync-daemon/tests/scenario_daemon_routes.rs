//! In-process scenario tests for subsync-daemon HTTP endpoints.
//!
//! These tests spin up the Axum router **without** binding a TCP socket.
//! Each test calls `routes::build_router` and drives it via
//! `tower::ServiceExt::oneshot`. Billing and storage are testkit fakes.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use subsync_config::EngineConfig;
use subsync_daemon::{routes, state};
use subsync_runtime::BillingError;
use subsync_testkit::{free_snapshot, pro_snapshot, FakeBillingClient, Journal, RecordingStore};
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const SECRET: &str = "whsec-test";

struct Fixture {
    state: Arc<state::AppState>,
    billing: Arc<FakeBillingClient>,
    store: Arc<RecordingStore>,
}

fn fixture(billing: FakeBillingClient, webhook_secret: Option<&str>) -> Fixture {
    let billing = Arc::new(billing);
    let store = Arc::new(RecordingStore::new(Journal::new()));
    let cfg = EngineConfig {
        restart_delay: Duration::from_millis(10),
        ..EngineConfig::default()
    };
    let state = Arc::new(state::AppState::new(
        billing.clone(),
        store.clone(),
        &cfg,
        webhook_secret.map(str::to_string),
    ));
    Fixture {
        state,
        billing,
        store,
    }
}

fn pro_user(user: &str) -> FakeBillingClient {
    FakeBillingClient::new(pro_snapshot(user, Utc::now() + chrono::Duration::days(30)))
}

fn router(f: &Fixture) -> axum::Router {
    routes::build_router(Arc::clone(&f.state))
}

/// Drive the router with a single request and return (status, body_bytes).
async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

/// Parse body bytes as a `serde_json::Value`.
fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

fn get(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn post(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn webhook(auth: Option<&str>, body: serde_json::Value) -> Request<axum::body::Body> {
    let mut b = Request::builder()
        .method("POST")
        .uri("/v1/webhooks/billing")
        .header("content-type", "application/json");
    if let Some(a) = auth {
        b = b.header("authorization", a);
    }
    b.body(axum::body::Body::from(body.to_string())).unwrap()
}

// ---------------------------------------------------------------------------
// GET /v1/health  GET /v1/status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_ok_true() {
    let f = fixture(FakeBillingClient::new(free_snapshot("u")), None);
    let (status, body) = call(router(&f), get("/v1/health")).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "subsync-daemon");
}

#[tokio::test]
async fn status_reports_idle_session() {
    let f = fixture(FakeBillingClient::new(free_snapshot("u")), None);
    let (status, body) = call(router(&f), get("/v1/status")).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["is_syncing"], false);
    assert!(json["last_sync_elapsed_ms"].is_null());
    assert!(json["pending_user"].is_null());
}

// ---------------------------------------------------------------------------
// POST /v1/reconcile/:user_id
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconcile_upgrades_then_defers_inside_window() {
    let f = fixture(pro_user("alice"), None);

    let (status, body) = call(router(&f), post("/v1/reconcile/alice")).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["outcome"], "updated");
    assert_eq!(json["user_id"], "alice");
    assert_eq!(json["old_status"], "free");
    assert_eq!(json["new_status"], "pro");
    // no SSE client is connected, so nobody can be restarted
    assert_eq!(json["restart"], "unavailable");

    let (status, body) = call(router(&f), post("/v1/reconcile/alice")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let json = parse_json(body);
    assert_eq!(json["outcome"], "deferred");
    assert_eq!(json["collapsed"], false);

    assert_eq!(f.billing.fetch_calls(), 1);
    assert_eq!(f.store.write_calls(), 1);
}

#[tokio::test]
async fn reconcile_maps_billing_failures_to_gateway_errors() {
    let billing = pro_user("bob");
    billing.fail_with(BillingError::Rejected {
        status: 500,
        body: "upstream".to_string(),
    });
    let f = fixture(billing, None);

    let (status, body) = call(router(&f), post("/v1/reconcile/bob")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let json = parse_json(body);
    assert_eq!(json["error"], "BILLING_FETCH");
    assert_eq!(f.store.write_calls(), 0);
}

#[tokio::test]
async fn link_route_links_then_reconciles() {
    let f = fixture(pro_user("carol"), None);

    let (status, body) = call(router(&f), post("/v1/link/carol")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["outcome"], "updated");
    assert_eq!(f.billing.link_calls(), 1);
}

// ---------------------------------------------------------------------------
// GET /v1/subscriptions/:user_id
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_user_reads_as_default_free_record() {
    let f = fixture(FakeBillingClient::new(free_snapshot("dave")), None);

    let (status, body) = call(router(&f), get("/v1/subscriptions/dave")).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["user_id"], "dave");
    assert_eq!(json["status"], "free");
    assert!(json["expires_at"].is_null());
    assert!(f.store.get("dave").is_some());
}

#[tokio::test]
async fn subscription_read_failure_is_503() {
    let f = fixture(FakeBillingClient::new(free_snapshot("erin")), None);
    f.store.set_fail_reads(true);

    let (status, body) = call(router(&f), get("/v1/subscriptions/erin")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(parse_json(body)["error"], "PERSISTENCE");
}

// ---------------------------------------------------------------------------
// POST /v1/webhooks/billing
// ---------------------------------------------------------------------------

fn event(event_type: &str, user: &str) -> serde_json::Value {
    serde_json::json!({ "event": { "type": event_type, "app_user_id": user } })
}

#[tokio::test]
async fn webhook_disabled_without_secret() {
    let f = fixture(pro_user("u"), None);
    let (status, body) = call(router(&f), webhook(Some(SECRET), event("RENEWAL", "u"))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(parse_json(body)["error"], "WEBHOOK_NOT_CONFIGURED");
}

#[tokio::test]
async fn webhook_rejects_bad_authorization() {
    let f = fixture(pro_user("u"), Some(SECRET));

    let (status, _) = call(router(&f), webhook(None, event("RENEWAL", "u"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) =
        call(router(&f), webhook(Some("Bearer nope"), event("RENEWAL", "u"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(parse_json(body)["error"], "WEBHOOK_UNAUTHORIZED");
    assert_eq!(f.billing.fetch_calls(), 0);
}

#[tokio::test]
async fn webhook_rejects_malformed_payloads() {
    let f = fixture(pro_user("u"), Some(SECRET));

    let (status, body) = call(
        router(&f),
        webhook(Some(SECRET), serde_json::json!({ "nope": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(parse_json(body)["error"], "WEBHOOK_MALFORMED");

    let (status, _) = call(router(&f), webhook(Some(SECRET), event("RENEWAL", "  "))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(f.billing.fetch_calls(), 0);
}

#[tokio::test]
async fn webhook_ignores_events_that_cannot_change_the_tier() {
    let f = fixture(pro_user("u"), Some(SECRET));

    let (status, body) = call(
        router(&f),
        webhook(Some(SECRET), event("INVOICE_ISSUANCE", "u")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["success"], true);
    assert!(json["message"].as_str().unwrap_or_default().starts_with("ignored"));
    assert!(json.get("outcome").is_none());
    assert_eq!(f.billing.fetch_calls(), 0);
}

#[tokio::test]
async fn webhook_renewal_reconciles_from_billing_snapshot() {
    let f = fixture(pro_user("frank"), Some(SECRET));

    let (status, body) = call(
        router(&f),
        webhook(Some(&format!("Bearer {SECRET}")), event("RENEWAL", "frank")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["success"], true);
    assert_eq!(json["outcome"]["outcome"], "updated");
    assert_eq!(json["outcome"]["new_status"], "pro");
    assert_eq!(f.billing.fetch_calls(), 1);
}

#[tokio::test]
async fn webhook_cancellation_still_trusts_the_snapshot() {
    // the event says "cancelled" but billing still reports an active pro entitlement
    let f = fixture(pro_user("gina"), Some(SECRET));

    let (status, body) = call(
        router(&f),
        webhook(Some(SECRET), event("CANCELLATION", "gina")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["outcome"]["new_status"], "pro");
}
