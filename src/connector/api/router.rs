use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::info;

use super::container::Container;
use super::controller::{ChatController, ChatParams, StatusController};
use crate::domain::StatusReport;

#[derive(Clone)]
struct AppState {
    status: Arc<StatusController>,
    chat: Arc<ChatController>,
}

/// Routes of the relay API with request logging applied.
pub fn build_router(container: Arc<Container>) -> axum::Router {
    let state = AppState {
        status: Arc::new(StatusController::new(Arc::clone(&container))),
        chat: Arc::new(ChatController::new(container)),
    };
    axum::Router::new()
        .route("/api/status", get(status))
        .route("/api/chat", post(chat))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Serve until `shutdown` resolves, then let in-flight requests finish.
pub async fn serve<F>(listener: TcpListener, container: Arc<Container>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Relay listening on http://{}", addr);
    }
    axum::serve(listener, build_router(container))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn status(State(state): State<AppState>) -> Json<StatusReport> {
    Json(state.status.report())
}

async fn chat(
    State(state): State<AppState>,
    Query(params): Query<ChatParams>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    match state.chat.chat(params, body).await {
        Ok(response) => response,
        Err(error) => error.into_response(),
    }
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    info!("--> {} {}", method, path);

    let response = next.run(request).await;

    info!(
        "<-- {} {} {} in {:?}",
        method,
        path,
        response.status().as_u16(),
        started.elapsed()
    );
    response
}
