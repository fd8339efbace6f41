/// Error taxonomy shared across the workspace.
///
/// Payloads are plain strings so the type stays `Clone`: a script outcome
/// (including its error) can be re-read any number of times from an async
/// handle.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    /// A caller-supplied argument was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The named entity does not exist in the cache or the store.
    #[error("not found: {0}")]
    NotFound(String),

    /// The script failed to compile; any previously compiled program is kept.
    #[error("compile error in '{name}': {message}")]
    Compile {
        /// Script name the source was compiled under.
        name: String,
        /// Parser message, including the source position.
        message: String,
    },

    /// The script threw, or a host function error was re-thrown uncaught.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// A backing client (KV, SQL, registry) is not configured.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A JSON or CSV payload could not be parsed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Execution was cancelled before completion.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// An operation exceeded its deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// An HTTP or SQL call performed on behalf of a script failed.
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl CoreError {
    /// Short machine-readable kind tag, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::Compile { .. } => "compile_error",
            Self::Runtime(_) => "runtime_error",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::Serialization(_) => "serialization_error",
            Self::Cancelled(_) => "cancelled",
            Self::Timeout(_) => "timeout",
            Self::Upstream(_) => "upstream_error",
        }
    }
}

/// Convenience alias used throughout the core crate.
pub type CoreResult<T> = Result<T, CoreError>;
