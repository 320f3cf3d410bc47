use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

use crate::cluster::LocalCluster;
use crate::ingest::Ingestor;
use crate::node::NodeId;
use crate::reduce::Readout;

#[derive(Clone)]
pub struct AppState {
    pub cluster: Arc<LocalCluster>,
    pub ingestors: Arc<Vec<Ingestor>>,
    pub readout: watch::Receiver<Option<Readout>>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/average", get(average))
        .route("/events", post(submit_events))
        .route("/nodes/{id}", get(node_status))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Latest reduce readout; 503 until the first cycle has run.
async fn average(State(state): State<AppState>) -> Response {
    let current = state.readout.borrow().clone();
    match current {
        Some(readout) => Json(readout).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "pending" })),
        )
            .into_response(),
    }
}

#[derive(serde::Deserialize)]
struct SubmitReq {
    node: NodeId,
    values: Vec<i64>,
}

#[derive(serde::Serialize)]
struct SubmitResp {
    accepted: usize,
    /// Values the queue refused; the client may resend them.
    rejected: Vec<i64>,
}

async fn submit_events(State(state): State<AppState>, Json(body): Json<SubmitReq>) -> Response {
    let Some(ingestor) = state.ingestors.iter().find(|i| i.node() == body.node) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown node {}", body.node) })),
        )
            .into_response();
    };

    let mut accepted = 0usize;
    let mut rejected = Vec::new();
    for v in body.values {
        match ingestor.submit(v) {
            Ok(()) => accepted += 1,
            Err(err) => rejected.push(err.value()),
        }
    }

    (StatusCode::ACCEPTED, Json(SubmitResp { accepted, rejected })).into_response()
}

async fn node_status(State(state): State<AppState>, Path(id): Path<NodeId>) -> Response {
    let Some(node) = state.cluster.node(id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown node {id}") })),
        )
            .into_response();
    };
    match node.status() {
        Ok(status) => Json(status).into_response(),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}
