//! Route definitions for script execution.
//!
//! Mounted under the configured endpoint prefix; when the prefix is empty
//! these routes are not registered at all.

use axum::routing::get;
use axum::Router;

use crate::handlers::execute;
use crate::state::AppState;

/// ```text
/// GET  /<endpoint>/{name} -> run with query params
/// POST /<endpoint>/{name} -> run with the raw body as `request`
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/{name}",
        get(execute::execute_get).post(execute::execute_post),
    )
}
