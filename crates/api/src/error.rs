use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use taskforge_core::CoreError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent `{error: …}` JSON
/// responses without leaking stack traces.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from the core crates.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Core(core) => match core {
                CoreError::NotFound(_) => (StatusCode::NOT_FOUND, core.to_string()),
                CoreError::InvalidArgument(_) | CoreError::Serialization(_) => {
                    (StatusCode::BAD_REQUEST, core.to_string())
                }
                CoreError::Compile { .. }
                | CoreError::Runtime(_)
                | CoreError::Cancelled(_)
                | CoreError::Timeout(_)
                | CoreError::Upstream(_)
                | CoreError::BackendUnavailable(_) => {
                    tracing::error!(error = %core, kind = core.kind(), "request failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, core.to_string())
                }
            },
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };

        let body = json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let response = AppError::Core(CoreError::NotFound("script 'x'".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_argument_maps_to_400() {
        let response =
            AppError::Core(CoreError::InvalidArgument("empty name".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn compile_error_maps_to_500() {
        let response = AppError::Core(CoreError::Compile {
            name: "s".into(),
            message: "bad".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
