//! Script execution subsystem.
//!
//! Layout mirrors the runtime pipeline: [`store`] is the persistence
//! contract, [`cache`] the in-process tier above it, [`pool`] compiles and
//! runs scripts with host capabilities from [`host`], and [`future`] wraps
//! asynchronous runs.

pub mod cache;
pub mod future;
pub mod host;
pub mod pool;
pub mod store;

pub use cache::{ScriptCache, ScriptEntry};
pub use future::ScriptFuture;
pub use host::{HostFunc, ScriptArg, ScriptArgs};
pub use pool::{RunResult, ScriptPool};
pub use store::{MemoryScriptStore, ScriptStore};
