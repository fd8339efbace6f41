//! Route definitions for bulk script management.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::manage;
use crate::state::AppState;

/// ```text
/// GET  /manage/export -> zip of all scripts
/// POST /manage/import -> multipart zip upload
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/manage/export", get(manage::export_scripts))
        .route("/manage/import", post(manage::import_scripts))
}
