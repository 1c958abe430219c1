//! HTTP API for the hub
//!
//! Transport boundary over the Hub:
//! - Node registry endpoints (register, list, heartbeat status, deregister)
//! - Key-value endpoints (write, read, delete, search)
//! - Sync trigger, stats, snapshot export
//! - Live change feed over WebSocket and SSE

use crate::common::{Error, NodeStatus};
use crate::hub::broadcast::Event;
use crate::hub::Hub;
use async_stream::stream;
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response, Sse},
    routing::{get, post, put},
    Json, Router,
};
use futures_util::StreamExt;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio_stream::wrappers::BroadcastStream;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
}

fn error_response(e: Error) -> Response {
    (e.to_http_status(), Json(json!({ "error": e.to_string() }))).into_response()
}

// ============================================================================
// Health
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "uptime_secs": STARTED_AT.elapsed().as_secs(),
    }))
}

async fn health_live() -> impl IntoResponse {
    StatusCode::OK
}

// ============================================================================
// Node registry
// ============================================================================

#[derive(Debug, Deserialize)]
struct RegisterNodeRequest {
    id: String,
    category: String,
}

async fn register_node(
    State(state): State<AppState>,
    Json(req): Json<RegisterNodeRequest>,
) -> Response {
    match state.hub.register_node(&req.id, &req.category) {
        Ok(node) => (StatusCode::CREATED, Json(node)).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct ListNodesQuery {
    category: Option<String>,
}

async fn list_nodes(
    State(state): State<AppState>,
    Query(query): Query<ListNodesQuery>,
) -> impl IntoResponse {
    let nodes = match query.category {
        Some(category) => state.hub.list_nodes_by_category(&category),
        None => state.hub.list_nodes(),
    };
    let total = nodes.len();
    Json(json!({ "nodes": nodes, "total": total }))
}

async fn get_node(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.hub.get_node(&id) {
        Some(node) => Json(node).into_response(),
        None => error_response(Error::NotFound(id)),
    }
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    status: String,
}

/// Heartbeat collaborator endpoint
async fn report_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Response {
    let status: NodeStatus = match req.status.parse() {
        Ok(s) => s,
        Err(e) => return error_response(e),
    };
    if state.hub.report_status(&id, status) {
        Json(json!({ "id": id, "status": status })).into_response()
    } else {
        error_response(Error::NotFound(id))
    }
}

async fn deregister_node(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    // Idempotent: deleting an unknown node still reports ok
    let removed = state.hub.deregister_node(&id);
    Json(json!({ "id": id, "removed": removed }))
}

// ============================================================================
// Key-value
// ============================================================================

#[derive(Debug, Deserialize)]
struct WriteRequest {
    value: Value,
    origin_node_id: Option<String>,
}

async fn put_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<WriteRequest>,
) -> Response {
    match state
        .hub
        .write(&key, req.value, req.origin_node_id.as_deref())
    {
        Ok(entry) => Json(entry).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_key(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    match state.hub.read(&key) {
        Some(entry) => Json(entry).into_response(),
        None => error_response(Error::NotFound(key)),
    }
}

async fn delete_key(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    if state.hub.delete(&key) {
        Json(json!({ "key": key, "deleted": true })).into_response()
    } else {
        error_response(Error::NotFound(key))
    }
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
}

async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> impl IntoResponse {
    let entries = state.hub.search(&query.q);
    let total = entries.len();
    Json(json!({ "entries": entries, "total": total }))
}

// ============================================================================
// Sync, stats, snapshot
// ============================================================================

async fn trigger_sync(State(state): State<AppState>) -> impl IntoResponse {
    let outcome = state.hub.trigger_sync();
    Json(outcome)
}

async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.hub.stats())
}

async fn get_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.hub.snapshot())
}

// ============================================================================
// Live change feed
// ============================================================================

async fn watch_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(state, socket))
}

async fn handle_ws(state: AppState, mut socket: WebSocket) {
    let sub = state.hub.subscribe();
    let connection_id = sub.connection_id.clone();

    let welcome = serde_json::to_string(&sub.welcome).unwrap_or_default();
    if socket.send(Message::Text(welcome)).await.is_err() {
        return;
    }

    let mut events = BroadcastStream::new(sub.rx);
    while let Some(item) = events.next().await {
        // Lagged subscribers miss events rather than stalling the bus
        let Ok(event) = item else { continue };
        let msg = serde_json::to_string(&event).unwrap_or_default();
        if socket.send(Message::Text(msg)).await.is_err() {
            break;
        }
    }
    tracing::debug!(%connection_id, "websocket observer disconnected");
}

/// SSE endpoint for the same event feed
async fn watch_sse(
    State(state): State<AppState>,
) -> Sse<impl futures_util::Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let sub = state.hub.subscribe();
    let stream = stream! {
        let data = serde_json::to_string(&sub.welcome).unwrap_or_default();
        yield Ok(axum::response::sse::Event::default().data(data));

        let mut rx = sub.rx;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(axum::response::sse::Event::default().data(data));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(missed = n, "sse observer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream)
}

/// Build the hub router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(health_live))
        .route("/nodes", post(register_node).get(list_nodes))
        .route("/nodes/:id", get(get_node).delete(deregister_node))
        .route("/nodes/:id/status", put(report_status))
        .route("/kv/:key", put(put_key).get(get_key).delete(delete_key))
        .route("/search", get(search))
        .route("/sync", post(trigger_sync))
        .route("/stats", get(get_stats))
        .route("/snapshot", get(get_snapshot))
        .route("/watch/ws", get(watch_ws))
        .route("/watch/sse", get(watch_sse))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(1024 * 1024)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_router() -> Router {
        create_router(AppState {
            hub: Arc::new(Hub::default()),
        })
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let router = test_router();
        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_register_and_get_node() {
        let router = test_router();

        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/nodes",
                json!({"id": "cache-1", "category": "cache"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = router
            .clone()
            .oneshot(Request::get("/nodes/cache-1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["category"], "cache");
        assert_eq!(body["status"], "active");

        // Duplicate registration conflicts
        let response = router
            .oneshot(json_request(
                "POST",
                "/nodes",
                json!({"id": "cache-1", "category": "cache"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_kv_round_trip() {
        let router = test_router();

        let response = router
            .clone()
            .oneshot(json_request(
                "PUT",
                "/kv/greeting",
                json!({"value": "hi", "origin_node_id": null}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .clone()
            .oneshot(Request::get("/kv/greeting").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["value"], "hi");

        let response = router
            .oneshot(Request::get("/kv/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_report_status_and_bad_status() {
        let router = test_router();
        router
            .clone()
            .oneshot(json_request(
                "POST",
                "/nodes",
                json!({"id": "n1", "category": "cache"}),
            ))
            .await
            .unwrap();

        let response = router
            .clone()
            .oneshot(json_request(
                "PUT",
                "/nodes/n1/status",
                json!({"status": "degraded"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(json_request(
                "PUT",
                "/nodes/n1/status",
                json!({"status": "vaporized"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sync_and_stats() {
        let router = test_router();

        router
            .clone()
            .oneshot(json_request("PUT", "/kv/k", json!({"value": 1})))
            .await
            .unwrap();

        let response = router
            .clone()
            .oneshot(Request::post("/sync").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["ran"], true);
        assert_eq!(body["tasks_applied"], 1);

        let response = router
            .oneshot(Request::get("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["data_entries"], 1);
        assert_eq!(body["queue_depth"], 0);
        assert_eq!(body["sync_operations"], 1);
    }

    #[tokio::test]
    async fn test_search() {
        let router = test_router();
        router
            .clone()
            .oneshot(json_request(
                "PUT",
                "/kv/cache-config",
                json!({"value": "ttl=30"}),
            ))
            .await
            .unwrap();

        let response = router
            .oneshot(Request::get("/search?q=CACHE").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["entries"][0]["key"], "cache-config");
    }

    #[tokio::test]
    async fn test_deregister_idempotent() {
        let router = test_router();

        let response = router
            .oneshot(
                Request::delete("/nodes/never-there")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["removed"], false);
    }
}
