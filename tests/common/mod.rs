#![allow(dead_code)]

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const TOKEN: &str = "0123456789abcdef";

/// Lo que el servidor falso vio y cómo debe responder.
#[derive(Default)]
pub struct FakeStreamlabs {
    pub queries: Vec<String>,
    pub start_bodies: Vec<String>,
    pub ended: Vec<String>,
    pub bad_auth: usize,
    pub can_be_live: bool,
    pub fail_start: bool,
}

pub type Shared = Arc<Mutex<FakeStreamlabs>>;

pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v == format!("Bearer {}", TOKEN))
}

async fn info(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let mut state = state.lock().unwrap();
    if !authorized(&headers) {
        state.bad_auth += 1;
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Unauthenticated."})));
    }

    match params.get("category") {
        Some(query) => {
            state.queries.push(query.clone());
            (
                StatusCode::OK,
                Json(json!({
                    "categories": [
                        {"full_name": "Minecraft", "game_mask_id": "m1"},
                        {"full_name": "Minecraft Dungeons", "game_mask_id": "m2"}
                    ]
                })),
            )
        }
        None => (
            StatusCode::OK,
            Json(json!({
                "user": {"username": "streamer"},
                "application_status": {"status": "approved"},
                "can_be_live": state.can_be_live
            })),
        ),
    }
}

async fn start(State(state): State<Shared>, headers: HeaderMap, body: String) -> (StatusCode, Json<Value>) {
    let mut state = state.lock().unwrap();
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    state.start_bodies.push(body);
    if state.fail_start {
        return (StatusCode::OK, Json(json!({"message": "not allowed"})));
    }
    (
        StatusCode::OK,
        Json(json!({"id": "s-1", "rtmp": "rtmp://push.tiktok/live", "key": "stream-key-1"})),
    )
}

async fn end(State(state): State<Shared>, Path(id): Path<String>) -> Json<Value> {
    let mut state = state.lock().unwrap();
    let success = id == "s-1";
    if success {
        state.ended.push(id);
    }
    Json(json!({ "success": success }))
}

pub async fn fake_streamlabs(can_be_live: bool) -> (String, Shared) {
    let state: Shared = Arc::new(Mutex::new(FakeStreamlabs {
        can_be_live,
        ..Default::default()
    }));

    let router = Router::new()
        .route("/api/v5/slobs/tiktok/info", get(info))
        .route("/api/v5/slobs/tiktok/stream/start", post(start))
        .route("/api/v5/slobs/tiktok/stream/{id}/end", post(end))
        .with_state(state.clone());

    (serve(router).await, state)
}
