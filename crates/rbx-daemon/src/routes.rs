//! Axum router and HTTP handlers for rbx-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Handlers are `pub(crate)` so tests compose the router
//! directly.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use rbx_reconcile::GuestKey;
use rbx_runtime::GuestNotFound;

use crate::{
    api_types::{ErrorResponse, GuestReconcileResponse, HealthResponse, LastRunResponse, RunRequest},
    state::{AppState, BatchRunError, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Middleware layers (CORS, tracing) are attached by `main.rs`.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/stream", get(stream))
        .route("/v1/reconcile/run", post(reconcile_run))
        .route("/v1/reconcile/last", get(reconcile_last))
        .route("/v1/reconcile/guest/:owner_id/:guest_id", post(reconcile_guest))
        .with_state(state)
}

fn error(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: msg.into() })).into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
            schedule_secs: st.schedule.map(|d| d.as_secs()),
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/reconcile/run
// ---------------------------------------------------------------------------

/// Run a batch now. 409 if one is already running.
///
/// The batch outlives the request: a caller that disconnects early still
/// leaves a recorded run behind.
///
/// The report is returned with 200 even when `success` is false; per-guest
/// failures are data, not transport errors.
pub(crate) async fn reconcile_run(
    State(st): State<Arc<AppState>>,
    body: Option<Json<RunRequest>>,
) -> Response {
    let mut opts = st.options.clone();
    if let Some(Json(RunRequest { limit: Some(l) })) = body {
        opts.limit = Some(l);
    }

    match st.try_run_batch(&opts).await {
        Ok(report) => {
            info!(run_id = %report.run_id, "reconcile/run");
            (StatusCode::OK, Json(report)).into_response()
        }
        Err(e @ BatchRunError::InProgress) => error(StatusCode::CONFLICT, e.to_string()),
        Err(e) => {
            warn!(error = %e, "reconcile/run failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// GET /v1/reconcile/last
// ---------------------------------------------------------------------------

pub(crate) async fn reconcile_last(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let report = st.last_report.read().await.clone();
    (StatusCode::OK, Json(LastRunResponse { report }))
}

// ---------------------------------------------------------------------------
// POST /v1/reconcile/guest/:owner_id/:guest_id
// ---------------------------------------------------------------------------

pub(crate) async fn reconcile_guest(
    State(st): State<Arc<AppState>>,
    Path((owner_id, guest_id)): Path<(String, String)>,
) -> Response {
    let key = GuestKey::new(owner_id, guest_id);
    match st.driver.reconcile_guest(&key).await {
        Ok(cycles) => {
            info!(guest = %key, cycles, "reconcile/guest");
            if cycles > 0 {
                let _ = st.bus.send(BusMsg::GuestReconciled {
                    owner_id: key.owner_id.clone(),
                    guest_id: key.guest_id.clone(),
                    cycles,
                });
            }
            (
                StatusCode::OK,
                Json(GuestReconcileResponse {
                    owner_id: key.owner_id,
                    guest_id: key.guest_id,
                    cycles_processed: cycles,
                }),
            )
                .into_response()
        }
        Err(e) if e.downcast_ref::<GuestNotFound>().is_some() => error(StatusCode::NOT_FOUND, e.to_string()),
        Err(e) => {
            warn!(guest = %key, error = %format!("{e:#}"), "reconcile/guest failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
        }
    }
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(rx: broadcast::Receiver<BusMsg>) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::BatchFinished(_) => "batch",
                    BusMsg::GuestReconciled { .. } => "guest",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
