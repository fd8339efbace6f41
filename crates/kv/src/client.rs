//! Async Redis client facade.
//!
//! Wraps a [`ConnectionManager`] (auto-reconnecting, cheap to clone) and
//! exposes the handful of string, hash, and set operations the service
//! needs. Hash operations with an empty group name fall back to
//! [`DEFAULT_HASH_GROUP`].

use std::collections::HashMap;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Hash group used when a script passes an empty group name.
pub const DEFAULT_HASH_GROUP: &str = "taskforge";

/// Shared Redis handle. Clones share the underlying connection.
#[derive(Clone)]
pub struct KvClient {
    conn: ConnectionManager,
}

/// Build a Redis connection URL from address, password, and database index.
fn redis_url(addr: &str, password: &str, db: i64) -> String {
    if password.is_empty() {
        format!("redis://{addr}/{db}")
    } else {
        format!("redis://:{password}@{addr}/{db}")
    }
}

fn group_or_default(group: &str) -> &str {
    if group.is_empty() {
        DEFAULT_HASH_GROUP
    } else {
        group
    }
}

impl KvClient {
    /// Connect to `addr` (host:port), selecting database `db`.
    pub async fn connect(addr: &str, password: &str, db: i64) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url(addr, password, db))?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!(addr, db, "connected to redis");
        Ok(Self { conn })
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.get(key).await
    }

    pub async fn hset(&self, group: &str, key: &str, value: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(group_or_default(group), key, value)
            .await
    }

    pub async fn hget(&self, group: &str, key: &str) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.hget(group_or_default(group), key).await
    }

    pub async fn hkeys(&self, group: &str) -> Result<Vec<String>, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.hkeys(group_or_default(group)).await
    }

    pub async fn hdel(&self, group: &str, key: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.hdel::<_, _, ()>(group_or_default(group), key).await
    }

    pub async fn hexists(&self, group: &str, key: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.hexists(group_or_default(group), key).await
    }

    pub async fn hgetall(
        &self,
        group: &str,
    ) -> Result<HashMap<String, String>, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.hgetall(group_or_default(group)).await
    }

    pub async fn sadd(&self, key: &str, members: Vec<String>) -> Result<i64, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.sadd(key, members).await
    }

    pub async fn srem(&self, key: &str, members: Vec<String>) -> Result<i64, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.srem(key, members).await
    }

    pub async fn scard(&self, key: &str) -> Result<i64, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.scard(key).await
    }

    pub async fn smembers(&self, key: &str) -> Result<Vec<String>, redis::RedisError> {
        let mut conn = self.conn.clone();
        conn.smembers(key).await
    }
}
