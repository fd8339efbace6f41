//! Route definitions for script management.

use axum::routing::get;
use axum::Router;

use crate::handlers::scripts;
use crate::state::AppState;

/// Script CRUD surface.
///
/// ```text
/// GET    /scripts          -> list_scripts
/// GET    /scripts/{name}   -> get_script
/// POST   /scripts/{name}   -> save_script
/// DELETE /scripts/{name}   -> delete_script
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/scripts", get(scripts::list_scripts))
        .route(
            "/scripts/{name}",
            get(scripts::get_script)
                .post(scripts::save_script)
                .delete(scripts::delete_script),
        )
}
