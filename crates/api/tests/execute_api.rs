//! Integration tests for script execution over HTTP.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::{body_json, build_test_app, get, post_text, test_config};
use taskforge_api::router::build_app_router;
use taskforge_api::state::AppState;
use taskforge_core::script::ScriptPool;

async fn seeded_app(name: &str, code: &str) -> (axum::Router, ScriptPool) {
    let (_, pool) = build_test_app().await;
    pool.cache().store_script(name, code).await.unwrap();
    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(test_config()),
    };
    (build_app_router(state), pool)
}

#[tokio::test]
async fn simple_script_returns_enveloped_value() {
    let (app, _) = seeded_app("calc", "40 + 2").await;
    let response = get(app, "/task/calc").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["success"], serde_json::json!(true));
    assert_eq!(json["data"], serde_json::json!(42));
    assert!(json["elapsed_ms"].is_number());
}

#[tokio::test]
async fn query_parameters_become_script_variables() {
    let (app, _) = seeded_app("greet", r#""hello " + who"#).await;
    let response = get(app, "/task/greet?who=amy").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"], serde_json::json!("hello amy"));
}

#[tokio::test]
async fn map_with_data_member_is_unwrapped() {
    let (app, _) = seeded_app("wrapped", "#{data: #{x: 1}, note: \"hidden\"}").await;
    let response = get(app, "/task/wrapped").await;
    assert_eq!(response.status(), StatusCode::OK);

    // The envelope is replaced by the map's `data` member.
    let json = body_json(response).await;
    assert_eq!(json, serde_json::json!({ "x": 1 }));
}

#[tokio::test]
async fn post_body_becomes_the_request_variable() {
    let (app, _) = seeded_app("echo", r#"request + "!""#).await;
    let response = post_text(app, "/task/echo", "hi").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["data"], serde_json::json!("hi!"));
}

#[tokio::test]
async fn unknown_task_is_404() {
    let (app, _) = build_test_app().await;
    let response = get(app, "/task/ghost").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn thrown_script_error_is_500_with_message() {
    let (app, _) = seeded_app("boom", r#"throw "nope""#).await;
    let response = get(app, "/task/boom").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json = body_json(response).await;
    assert_eq!(json["success"], serde_json::json!(false));
    assert!(json["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn compile_error_is_500() {
    let (app, _) = seeded_app("bad", "fn (").await;
    let response = get(app, "/task/bad").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("compile"));
}

#[tokio::test]
async fn updated_source_is_picked_up_on_next_call() {
    let (app, pool) = seeded_app("v", "1").await;
    let response = get(app, "/task/v").await;
    assert_eq!(body_json(response).await["data"], serde_json::json!(1));

    pool.cache().store_script("v", "2").await.unwrap();
    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(test_config()),
    };
    let app = build_app_router(state);
    let response = get(app, "/task/v").await;
    assert_eq!(body_json(response).await["data"], serde_json::json!(2));
}
