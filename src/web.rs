// src/web.rs
//! HTTP control surface over the variable store.
//!
//! Lets other processes read and write the engine's variables:
//!
//! - `GET /vars` lists every variable.
//! - `GET /vars/:name` returns a variable. For a variable with print
//!   notification (the metrics variable) it opens a report session and
//!   returns the engine's JSON report instead.
//! - `PUT /vars/:name` writes a variable from a plain-text body, firing its
//!   change notification.
//!
//! Variable names are paths, so `:name` is matched as a wildcard.

use crate::error::StoreError;
use crate::store::{MemoryStore, NotifyKind};
use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch::Receiver as WatchReceiver;
use tracing::{debug, info, warn};

/// How long a report request waits for the dispatcher.
const REPORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state for the control handlers.
#[derive(Clone)]
struct AppState {
    store: Arc<MemoryStore>,
}

/// Maps store failures onto HTTP status codes.
struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Closed | StoreError::NoSession(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, self.0.to_string()).into_response()
    }
}

/// Normalizes a wildcard capture to the stored name, which starts with `/`.
fn var_name(raw: &str) -> String {
    if raw.starts_with('/') {
        raw.to_string()
    } else {
        format!("/{raw}")
    }
}

async fn list_vars(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.list())
}

async fn get_var(State(state): State<AppState>, Path(raw): Path<String>) -> Result<Response, ApiError> {
    let name = var_name(&raw);
    let kind = state
        .store
        .notify_kind(&name)
        .ok_or_else(|| StoreError::NotFound(name.clone()))?;

    if kind == NotifyKind::Print {
        let rx = state.store.request_report(&name)?;
        return Ok(match tokio::time::timeout(REPORT_TIMEOUT, rx).await {
            Ok(Ok(body)) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
            Ok(Err(_)) => (StatusCode::NO_CONTENT, String::new()).into_response(),
            Err(_) => {
                warn!("Report for {} timed out", name);
                (StatusCode::GATEWAY_TIMEOUT, "report timed out".to_string()).into_response()
            }
        });
    }

    let view = state
        .store
        .describe(&name)
        .ok_or_else(|| StoreError::NotFound(name.clone()))?;
    Ok(Json(view).into_response())
}

async fn put_var(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    body: String,
) -> Result<StatusCode, ApiError> {
    let name = var_name(&raw);
    let text = body.trim_end_matches(['\r', '\n']);
    state.store.set_text(&name, text)?;
    debug!("Control set {} = {:?}", name, text);
    Ok(StatusCode::NO_CONTENT)
}

/// Builds the control router.
pub fn router(store: Arc<MemoryStore>) -> Router {
    Router::new()
        .route("/vars", get(list_vars))
        .route("/vars/*name", get(get_var).put(put_var))
        .with_state(AppState { store })
}

/// Starts the control server and runs it until shutdown is signalled.
///
/// # Arguments
/// * `addr` - Address to listen on.
/// * `store` - Store the handlers read and write.
/// * `shutdown_signal` - Watch channel for shutdown notification.
///
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn start_server(
    addr: SocketAddr,
    store: Arc<MemoryStore>,
    shutdown_signal: WatchReceiver<bool>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Control surface listening on {}", listener.local_addr()?);

    let mut shutdown = shutdown_signal.clone();
    axum::serve(listener, router(store))
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
            info!("Control surface shutting down.");
        })
        .await?;
    Ok(())
}
