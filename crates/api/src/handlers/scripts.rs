//! Handlers for script CRUD.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use taskforge_core::CoreError;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// A task script with its source.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScriptItem {
    pub name: String,
    pub code: String,
}

/// GET /scripts
///
/// List all known script names.
pub async fn list_scripts(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let tasks = state.pool.cache().list_scripts().await?;
    Ok(Json(json!({ "tasks": tasks })))
}

/// GET /scripts/{name}
///
/// Fetch one script's source.
pub async fn get_script(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<ScriptItem>> {
    let cache = state.pool.cache();
    if !cache.script_exists(&name).await? {
        return Err(AppError::Core(CoreError::NotFound(format!(
            "task script '{name}'"
        ))));
    }
    let code = cache.get_script(&name).await?;
    Ok(Json(ScriptItem { name, code }))
}

/// POST /scripts/{name}
///
/// Save a script. The body's `name` must match the path.
pub async fn save_script(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(script): Json<ScriptItem>,
) -> AppResult<Json<Value>> {
    if script.name != name {
        return Err(AppError::BadRequest(
            "Task name in URL does not match task name in request body".to_string(),
        ));
    }

    state.pool.cache().store_script(&name, &script.code).await?;
    Ok(Json(json!({
        "status": "success",
        "message": format!("Task script '{name}' saved successfully"),
    })))
}

/// DELETE /scripts/{name}
pub async fn delete_script(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<Value>> {
    let cache = state.pool.cache();
    if !cache.script_exists(&name).await? {
        return Err(AppError::Core(CoreError::NotFound(format!(
            "task script '{name}'"
        ))));
    }

    cache.delete_script(&name).await?;
    Ok(Json(json!({
        "status": "success",
        "message": format!("Task script '{name}' deleted successfully"),
    })))
}
