//! Axum router and all HTTP handlers for subsync-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers.  All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::{convert::Infallible, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use sha2::{Digest, Sha256};
use subsync_classify::webhook::{classify_webhook, IgnoreReason, RawWebhook, WebhookDisposition};
use subsync_runtime::{BillingError, ReconcileError, ReconcileOutcome};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::{
    api_types::{
        ErrorResponse, HealthResponse, ReconcileResponse, StatusResponse, WebhookResponse,
    },
    state::{uptime_secs, AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/subscriptions/:user_id", get(subscription_get))
        .route("/v1/reconcile/:user_id", post(reconcile_user))
        .route("/v1/link/:user_id", post(link_user))
        .route("/v1/webhooks/billing", post(billing_webhook))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let session = st.coordinator.session_state();
    (
        StatusCode::OK,
        Json(StatusResponse::from_session(uptime_secs(), &session)),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/subscriptions/:user_id
// ---------------------------------------------------------------------------

/// Current persisted record. Creates the default `free` record on first read.
pub(crate) async fn subscription_get(
    State(st): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Response {
    match st.coordinator.store().read_record(&user_id, Utc::now()).await {
        Ok(rec) => (StatusCode::OK, Json(rec)).into_response(),
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "record read failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::new("PERSISTENCE", e.to_string())),
            )
                .into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// POST /v1/reconcile/:user_id   POST /v1/link/:user_id
// ---------------------------------------------------------------------------

pub(crate) async fn reconcile_user(
    State(st): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Response {
    outcome_response(st.coordinator.reconcile(&user_id).await)
}

pub(crate) async fn link_user(
    State(st): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Response {
    outcome_response(st.coordinator.link_and_reconcile(&user_id).await)
}

fn outcome_response(res: Result<ReconcileOutcome, ReconcileError>) -> Response {
    match res {
        Ok(out) => {
            // deferred work has been accepted, not done
            let code = match out {
                ReconcileOutcome::Deferred { .. } => StatusCode::ACCEPTED,
                _ => StatusCode::OK,
            };
            (code, Json(ReconcileResponse::from(&out))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// HTTP status for each reconcile failure kind.
pub fn error_status(e: &ReconcileError) -> StatusCode {
    match e {
        ReconcileError::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
        ReconcileError::BillingFetch(BillingError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
        ReconcileError::BillingFetch(_) => StatusCode::BAD_GATEWAY,
        ReconcileError::Persistence { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn error_response(e: &ReconcileError) -> Response {
    (error_status(e), Json(ErrorResponse::from(e))).into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/webhooks/billing
// ---------------------------------------------------------------------------

/// Billing provider notification.
///
/// The payload never writes a record itself; tier-affecting events trigger a
/// reconcile that re-fetches the authoritative snapshot. A non-2xx response
/// makes the provider retry delivery.
pub(crate) async fn billing_webhook(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(secret) = st.webhook_secret.as_deref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new(
                "WEBHOOK_NOT_CONFIGURED",
                "no webhook secret configured",
            )),
        )
            .into_response();
    };

    if !authorization_matches(&headers, secret) {
        warn!("webhook rejected: bad authorization");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("WEBHOOK_UNAUTHORIZED", "invalid authorization")),
        )
            .into_response();
    }

    let raw: RawWebhook = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) => return malformed(e.to_string()),
    };

    match classify_webhook(&raw.event, Utc::now()) {
        WebhookDisposition::Ignore { event_type, reason } => {
            info!(event_type = %event_type, reason = ?reason, "webhook ignored");
            let why = match reason {
                IgnoreReason::NoStatusChange => "no status change",
                IgnoreReason::Unhandled => "unhandled event type",
            };
            (
                StatusCode::OK,
                Json(WebhookResponse {
                    success: true,
                    message: format!("ignored {event_type}: {why}"),
                    outcome: None,
                }),
            )
                .into_response()
        }
        WebhookDisposition::Reconcile { user_id, hint, .. } => {
            if user_id.trim().is_empty() {
                return malformed("event.app_user_id is empty".to_string());
            }
            info!(user_id = %user_id, hint = %hint, event_type = %raw.event.event_type, "webhook triggers reconcile");
            match st.coordinator.reconcile(&user_id).await {
                Ok(out) => (
                    StatusCode::OK,
                    Json(WebhookResponse {
                        success: true,
                        message: format!("reconcile {}", out.as_str()),
                        outcome: Some(ReconcileResponse::from(&out)),
                    }),
                )
                    .into_response(),
                Err(e) => error_response(&e),
            }
        }
    }
}

/// Accepts either the bare secret or `Bearer <secret>`.
fn authorization_matches(headers: &HeaderMap, secret: &str) -> bool {
    let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    secrets_equal(token, secret)
}

/// Constant-time over fixed-size digests, so neither length nor content
/// leaks through timing.
fn secrets_equal(given: &str, expected: &str) -> bool {
    let a = Sha256::digest(given.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn malformed(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new("WEBHOOK_MALFORMED", message)),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/stream
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(m.event_name()).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
