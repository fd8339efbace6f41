//! Host capabilities exposed to scripts.
//!
//! Each submodule builds [`HostFunc`]s over clients captured at injection
//! time. Script execution happens on blocking workers, so capabilities
//! drive the async clients with `Handle::block_on`; a call in flight
//! completes (or times out) on its own even if the script is cancelled.

pub mod console;
pub mod kv;
pub mod net;
pub mod sql;
pub mod sys;

use std::sync::Arc;

use taskforge_core::error::CoreResult;
use taskforge_core::script::ScriptPool;
use taskforge_db::SqlClients;
use taskforge_kv::KvClient;

/// Clients shared by the capability set.
pub struct CapabilityDeps {
    pub handle: tokio::runtime::Handle,
    pub kv_data: Option<KvClient>,
    pub sql: Option<Arc<SqlClients>>,
    pub http: reqwest::Client,
}

/// Register the full capability set on `pool`. SQL capabilities are only
/// injected when at least one MySQL client connected.
pub fn inject_all(pool: &ScriptPool, deps: &CapabilityDeps) -> CoreResult<()> {
    pool.inject("console.log", console::log())?;
    pool.inject("console.error", console::error())?;

    if let Some(client) = &deps.kv_data {
        pool.inject("redis.set", kv::set(client.clone(), deps.handle.clone()))?;
        pool.inject("redis.get", kv::get(client.clone(), deps.handle.clone()))?;
        pool.inject("redis.keys", kv::keys(client.clone(), deps.handle.clone()))?;
        pool.inject(
            "redis.hgetall",
            kv::hgetall(client.clone(), deps.handle.clone()),
        )?;
        pool.inject("redis.sadd", kv::sadd(client.clone(), deps.handle.clone()))?;
        pool.inject("redis.srem", kv::srem(client.clone(), deps.handle.clone()))?;
        pool.inject("redis.scard", kv::scard(client.clone(), deps.handle.clone()))?;
        pool.inject(
            "redis.smembers",
            kv::smembers(client.clone(), deps.handle.clone()),
        )?;
    }

    if let Some(clients) = &deps.sql {
        if !clients.is_empty() {
            pool.inject("mysql.query", sql::query(clients.clone(), deps.handle.clone()))?;
            pool.inject("mysql.exec", sql::exec(clients.clone(), deps.handle.clone()))?;
            pool.inject(
                "mysql.queryRow",
                sql::query_row(clients.clone(), deps.handle.clone()),
            )?;
            pool.inject(
                "mysql.transaction",
                sql::transaction(clients.clone(), deps.handle.clone()),
            )?;
        }
    }

    pool.inject("net.fetch", net::fetch(deps.http.clone(), deps.handle.clone()))?;
    pool.inject("sys.command", sys::command())?;

    tracing::info!("script pool initialized with injected capabilities");
    Ok(())
}
