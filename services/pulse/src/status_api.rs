//! Read-only JSON status API over the live view

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;

use crate::engine::{EngineHandle, LiveView};

#[derive(Clone)]
pub struct StatusApiState {
    pub engine: EngineHandle,
}

/// Build the status API router
pub fn build_router(engine: EngineHandle) -> Router {
    Router::new()
        .route("/api/monitor", get(monitor_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/chart", get(chart_handler))
        .route("/api/incidents", get(incidents_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(StatusApiState { engine })
}

fn not_ready() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({ "error": "no snapshot loaded" })),
    )
        .into_response()
}

async fn with_view<F>(api: &StatusApiState, render: F) -> Response
where
    F: FnOnce(&LiveView) -> Response,
{
    let engine = api.engine.read().await;
    match engine.view() {
        Some(view) => render(view),
        None => not_ready(),
    }
}

async fn monitor_handler(State(api): State<StatusApiState>) -> Response {
    let resync = api.engine.read().await.resync_state();
    with_view(&api, |view| {
        Json(serde_json::json!({
            "monitor": view.monitor,
            "resyncState": resync,
        }))
        .into_response()
    })
    .await
}

async fn stats_handler(State(api): State<StatusApiState>) -> Response {
    with_view(&api, |view| Json(&view.stats).into_response()).await
}

async fn chart_handler(State(api): State<StatusApiState>) -> Response {
    with_view(&api, |view| Json(&view.chart).into_response()).await
}

async fn incidents_handler(State(api): State<StatusApiState>) -> Response {
    with_view(&api, |view| Json(&view.incidents).into_response()).await
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}
