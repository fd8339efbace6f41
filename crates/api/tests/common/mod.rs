// All functions in this module are shared test helpers. Not every test binary
// uses every helper, so we suppress dead_code warnings at the item level.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use taskforge_api::capabilities::console;
use taskforge_api::config::FileConfig;
use taskforge_api::router::build_app_router;
use taskforge_api::state::AppState;
use taskforge_core::script::store::MemoryScriptStore;
use taskforge_core::script::ScriptPool;

/// Test configuration: execute routes mounted under `/task`, in-memory
/// script store.
pub fn test_config() -> FileConfig {
    FileConfig::from_yaml(
        "script:\n  groupName: test_scripts\n  endpoint: task\nweb:\n  port: 0\n",
    )
    .expect("test config must parse")
}

/// Build the full application router over an in-memory store, plus the pool
/// so tests can seed scripts directly. Exercises the same middleware stack
/// production uses.
pub async fn build_test_app() -> (Router, ScriptPool) {
    let pool = ScriptPool::new(Arc::new(MemoryScriptStore::new()));
    pool.cache().initialize().await;
    pool.inject("console.log", console::log()).unwrap();
    pool.inject("console.error", console::error()).unwrap();

    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(test_config()),
    };
    (build_app_router(state), pool)
}

pub async fn get(app: Router, uri: &str) -> Response<axum::body::Body> {
    app.oneshot(
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn delete(app: Router, uri: &str) -> Response<axum::body::Body> {
    app.oneshot(
        Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn post_json(
    app: Router,
    uri: &str,
    body: serde_json::Value,
) -> Response<axum::body::Body> {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn post_text(app: Router, uri: &str, body: &str) -> Response<axum::body::Body> {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn post_multipart(
    app: Router,
    uri: &str,
    field_name: &str,
    file_name: &str,
    bytes: Vec<u8>,
) -> Response<axum::body::Body> {
    let boundary = "taskforge-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field_name}\"; \
             filename=\"{file_name}\"\r\nContent-Type: application/zip\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(&bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_bytes(response: Response<axum::body::Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<axum::body::Body>) -> serde_json::Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("response body should be JSON")
}
