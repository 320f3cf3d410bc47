// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - GET /average (pending, ok, no_data)
// - POST /events (including values that would overflow a node total)
// - GET /nodes/{id}

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    Router,
};
use chrono::Utc;
use http::{Request, StatusCode};
use serde_json::json;
use serde_json::Value as Json;
use tokio::sync::watch;
use tower::ServiceExt as _; // for `oneshot`

use running_average::api::{self, AppState};
use running_average::reduce::GlobalAverage;
use running_average::{Config, LocalCluster, Readout, ReduceError, Runtime};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

fn idle_config() -> Config {
    Config {
        nodes: 2,
        window_capacity: 3,
        // Keep the reduce loop out of the way.
        reduce_interval_ms: 3_600_000,
        ..Config::default()
    }
}

/// Router over a cluster with no ingestion, publishing `readout` as-is.
fn router_with_readout(readout: Option<Readout>) -> Router {
    let (_tx, rx) = watch::channel(readout);
    api::create_router(AppState {
        cluster: Arc::new(LocalCluster::new(1, 3, Duration::from_secs(1))),
        ingestors: Arc::new(Vec::new()),
        readout: rx,
    })
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build GET");
    let resp = app.oneshot(req).await.expect("oneshot GET");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v = serde_json::from_slice(&bytes).expect("parse json");
    (status, v)
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let app = router_with_readout(None);
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    assert_eq!(String::from_utf8(bytes.to_vec()).unwrap(), "ok");
}

#[tokio::test]
async fn average_is_pending_before_first_cycle() {
    let (status, v) = get_json(router_with_readout(None), "/average").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(v["status"], "pending");
}

#[tokio::test]
async fn average_reports_value_and_ideal() {
    let readout = Readout::from_result(
        &Ok(GlobalAverage {
            avg: 49.25,
            total: 197,
            count: 4,
            contributing: 2,
            unreachable: 1,
        }),
        50.0,
        Utc::now(),
    );
    let (status, v) = get_json(router_with_readout(Some(readout)), "/average").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "ok");
    assert_eq!(v["avg"], 49.25);
    assert_eq!(v["ideal_avg"], 50.0);
    assert_eq!(v["unreachable"], 1);
}

#[tokio::test]
async fn average_shows_no_data_instead_of_a_number() {
    let readout = Readout::from_result(
        &Err(ReduceError::NoData {
            nodes: 3,
            unreachable: 0,
        }),
        50.0,
        Utc::now(),
    );
    let (status, v) = get_json(router_with_readout(Some(readout)), "/average").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "no_data");
    assert!(v.get("avg").is_none());
}

#[tokio::test]
async fn posted_events_reach_the_node() {
    let runtime = Runtime::start_idle(&idle_config());
    let app = api::create_router(runtime.state());

    let payload = json!({ "node": 1, "values": [10, 20, 30, 40] });
    let req = Request::builder()
        .method("POST")
        .uri("/events")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build POST /events");
    let resp = app.clone().oneshot(req).await.expect("oneshot /events");
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    let v: Json = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(v["accepted"], 4);
    assert_eq!(v["rejected"], json!([]));

    // Stopping drains the queue, so the node state is final afterwards.
    let cluster = Arc::clone(runtime.cluster());
    runtime.shutdown().await;
    let status = cluster.node(1).unwrap().status().unwrap();
    assert_eq!((status.total, status.count), (90, 3));

    let (code, v) = get_json(app, "/nodes/1").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(v["avg"], 30.0);
    assert_eq!(v["window_len"], 3);
}

#[tokio::test]
async fn extreme_values_do_not_take_the_node_down() {
    let runtime = Runtime::start_idle(&Config {
        batch_size: 1,
        ..idle_config()
    });
    let app = api::create_router(runtime.state());

    // i64::MAX fits; the 1 after it would overflow the total and is dropped;
    // -20 still lands, so the worker kept running.
    let payload = json!({ "node": 0, "values": [i64::MAX, 1, -20] });
    let req = Request::builder()
        .method("POST")
        .uri("/events")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let cluster = Arc::clone(runtime.cluster());
    runtime.shutdown().await;
    let status = cluster.node(0).unwrap().status().unwrap();
    assert_eq!((status.total, status.count), (i64::MAX - 20, 2));
    assert_eq!(status.window_len, 2);
}

#[tokio::test]
async fn unknown_node_is_404() {
    let runtime = Runtime::start_idle(&idle_config());
    let app = api::create_router(runtime.state());

    let (code, _) = get_json(app.clone(), "/nodes/9").await;
    assert_eq!(code, StatusCode::NOT_FOUND);

    let req = Request::builder()
        .method("POST")
        .uri("/events")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "node": 9, "values": [1] }).to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    runtime.shutdown().await;
}
