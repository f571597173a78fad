//! Introspection server.
//!
//! A small HTTP surface for external monitoring of a running soak:
//!
//! | Route | Body |
//! |-------|------|
//! | `GET /types` | `["command"]` |
//! | `GET /types/command` | registered command ids, `[0, 1, ...]` |
//! | `GET /types/command/{id}` | [`CommandSnapshot`] |
//!
//! Handlers only load the counters the command loops publish; they never
//! lock or allocate per-command state.

use std::net::SocketAddr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::context::{CommandSnapshot, ContextTable};
use crate::error::{Result, StressError};

/// The only entity type exposed.
pub const COMMAND_TYPE: &str = "command";

/// Error body for unknown routes, types and ids.
#[derive(Debug)]
struct NotFound(String);

impl IntoResponse for NotFound {
    fn into_response(self) -> Response {
        (StatusCode::NOT_FOUND, Json(json!({ "error": self.0 }))).into_response()
    }
}

/// Routes over a context table.
pub fn router(contexts: ContextTable) -> Router {
    Router::new()
        .route("/types", get(list_types))
        .route("/types/:kind", get(list_ids))
        .route("/types/:kind/:id", get(get_snapshot))
        .fallback(|| async { NotFound("no such route".to_string()) })
        .with_state(contexts)
}

async fn list_types() -> Json<Vec<&'static str>> {
    Json(vec![COMMAND_TYPE])
}

async fn list_ids(
    Path(kind): Path<String>,
    State(contexts): State<ContextTable>,
) -> std::result::Result<Json<Vec<usize>>, NotFound> {
    check_kind(&kind)?;
    Ok(Json(contexts.iter().map(|ctx| ctx.index()).collect()))
}

async fn get_snapshot(
    Path((kind, id)): Path<(String, String)>,
    State(contexts): State<ContextTable>,
) -> std::result::Result<Json<CommandSnapshot>, NotFound> {
    check_kind(&kind)?;
    let ctx = id
        .parse::<usize>()
        .ok()
        .and_then(|index| contexts.get(index))
        .ok_or_else(|| NotFound(format!("no {} with id '{}'", COMMAND_TYPE, id)))?;
    Ok(Json(ctx.snapshot()))
}

fn check_kind(kind: &str) -> std::result::Result<(), NotFound> {
    if kind == COMMAND_TYPE {
        Ok(())
    } else {
        Err(NotFound(format!("no entity type '{}'", kind)))
    }
}

/// A running introspection server.
pub struct IntrospectionServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl IntrospectionServer {
    /// Bind `addr` (port 0 picks a free port) and serve in the background.
    pub async fn start(addr: SocketAddr, contexts: ContextTable) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| StressError::Introspection {
                addr: addr.to_string(),
                source,
            })?;
        let local = listener
            .local_addr()
            .map_err(|source| StressError::Introspection {
                addr: addr.to_string(),
                source,
            })?;
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let app = router(contexts);

        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                warn!(addr = %local, error = %e, "introspection server stopped with error");
            }
        });
        info!(addr = %local, "introspection server listening");
        Ok(Self {
            addr: local,
            shutdown: Some(shutdown),
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting and wait for in-flight requests.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for IntrospectionServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
