//! Request handlers and server loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::{Dispatcher, Request, Response};
use crate::error::{ExecError, ServerError};
use crate::pool::WorkerPool;
use crate::validator;

/// Shared state behind the router.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,
    pub pool: Arc<WorkerPool>,
}

/// Wire shape of `POST /v1/exec`.
#[derive(Debug, Deserialize)]
pub struct ExecPayload {
    pub sandbox: String,
    #[serde(default)]
    pub version: String,
    pub command: String,
    #[serde(default)]
    pub files: HashMap<String, String>,
}

/// Builds the application router.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/exec", post(exec))
        .route("/healthz", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the listen address and serves until ctrl-c.
///
/// # Errors
///
/// Returns [`ServerError`] when the address cannot be bound or the server
/// loop fails.
pub async fn serve(addr: &str, state: AppState) -> std::result::Result<(), ServerError> {
    let listener = TcpListener::bind(addr).await.map_err(|e| ServerError::Bind {
        addr: addr.to_string(),
        source: e,
    })?;
    info!(addr, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Request IDs double as container names, so stick to `[a-z0-9_]`.
fn next_id() -> String {
    format!("http_{}", Uuid::new_v4().simple())
}

async fn exec(
    State(state): State<AppState>,
    Json(payload): Json<ExecPayload>,
) -> (StatusCode, Json<Response>) {
    let started = Instant::now();
    let id = next_id();

    let req = Request {
        id: id.clone(),
        sandbox: payload.sandbox,
        version: payload.version,
        command: payload.command,
        files: payload.files,
    };

    // validation failures bypass the engine and the pool entirely
    if let Err(err) = validator::validate(&state.config, &req) {
        return (StatusCode::OK, Json(Response::failure(id, err, started)));
    }

    // the validator guaranteed the pair exists, but stay graceful
    let Some(engine) = state.dispatcher.resolve(&req.sandbox, &req.command) else {
        let err = ExecError::UnknownCommand(req.command);
        return (StatusCode::OK, Json(Response::failure(id, err, started)));
    };

    match state.pool.run(engine.exec(req)).await {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(Response::failure(id, err, started)),
        ),
    }
}
