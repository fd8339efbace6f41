//! Handlers for script execution.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use taskforge_core::script::{ScriptArg, ScriptArgs};
use taskforge_core::CoreError;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// GET /<endpoint>/{name}
///
/// Each query parameter becomes a script variable.
pub async fn execute_get(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Response> {
    let mut args = ScriptArgs::new();
    for (key, value) in params {
        args.insert(key, ScriptArg::Value(Value::String(value)));
    }
    run_script(&state, &name, args).await
}

/// POST /<endpoint>/{name}
///
/// The raw body is exposed to the script as the `request` variable.
pub async fn execute_post(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: String,
) -> AppResult<Response> {
    let mut args = ScriptArgs::new();
    args.insert("request".to_string(), ScriptArg::Value(Value::String(body)));
    run_script(&state, &name, args).await
}

/// Resolve the script through the cache, compile if new, run, and shape the
/// response: a map value with a `data` member is unwrapped, anything else is
/// enveloped with timing.
async fn run_script(state: &AppState, name: &str, args: ScriptArgs) -> AppResult<Response> {
    let cache = state.pool.cache();
    if !cache.script_exists(name).await? {
        return Err(AppError::Core(CoreError::NotFound(format!(
            "task script '{name}'"
        ))));
    }

    let code = cache.get_script(name).await?;
    state.pool.ensure_script(name, &code)?;

    let result = state.pool.run(name, args).await?;
    let elapsed_ms = result.duration.as_secs_f64() * 1e3;

    if !result.success {
        let message = result
            .error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "script failed".to_string());
        tracing::warn!(task = name, error = %message, elapsed_ms, "task failed");
        let body = json!({ "success": false, "error": message });
        return Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response());
    }

    tracing::info!(task = name, elapsed_ms, "task executed");

    if let Value::Object(map) = &result.value {
        if let Some(data) = map.get("data") {
            return Ok(Json(data.clone()).into_response());
        }
    }

    let body = json!({
        "success": true,
        "elapsed_ms": elapsed_ms,
        "data": result.value,
    });
    Ok(Json(body).into_response())
}
