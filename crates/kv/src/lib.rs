//! Redis adapter: a thin facade over the remote hash store plus the
//! Redis-backed script store.

pub mod client;
pub mod script_store;

pub use client::{KvClient, DEFAULT_HASH_GROUP};
pub use script_store::RedisScriptStore;
