use std::sync::Arc;

use taskforge_core::script::ScriptPool;

use crate::config::FileConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// Cheaply cloneable: everything lives behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Script pool (compile cache + capability registry) with its cache and
    /// store attached.
    pub pool: ScriptPool,
    /// File configuration loaded at startup.
    pub config: Arc<FileConfig>,
}
