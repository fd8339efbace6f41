//! Script store over one Redis hash.
//!
//! Every replica shares the same hash (keyed by the configured group name),
//! so the fleet shares a single script corpus. Field name = script name,
//! field value = source text.

use async_trait::async_trait;
use taskforge_core::error::CoreResult;
use taskforge_core::script::store::{LoadCallback, ScriptStore};
use taskforge_core::CoreError;

use crate::client::KvClient;

/// [`ScriptStore`] implementation over a Redis hash.
pub struct RedisScriptStore {
    group: String,
    kv: KvClient,
}

impl RedisScriptStore {
    pub fn new(group: impl Into<String>, kv: KvClient) -> Self {
        Self {
            group: group.into(),
            kv,
        }
    }
}

fn kv_error(err: redis::RedisError) -> CoreError {
    CoreError::Upstream(format!("kv: {err}"))
}

#[async_trait]
impl ScriptStore for RedisScriptStore {
    async fn load(&self, callback: LoadCallback<'_>) {
        let names = match self.kv.hkeys(&self.group).await {
            Ok(names) => names,
            Err(err) => {
                tracing::warn!(group = %self.group, error = %err, "failed to list scripts");
                return;
            }
        };

        for name in names {
            match self.kv.hget(&self.group, &name).await {
                Ok(Some(code)) => callback(name, code),
                Ok(None) => {
                    tracing::warn!(script = %name, "script vanished during load");
                }
                Err(err) => {
                    tracing::warn!(script = %name, error = %err, "failed to fetch script");
                }
            }
        }
    }

    async fn save(&self, name: &str, code: &str) -> CoreResult<()> {
        self.kv
            .hset(&self.group, name, code)
            .await
            .map_err(kv_error)
    }

    async fn get(&self, name: &str) -> CoreResult<String> {
        self.kv
            .hget(&self.group, name)
            .await
            .map_err(kv_error)?
            .ok_or_else(|| CoreError::NotFound(format!("script '{name}'")))
    }

    async fn delete(&self, name: &str) -> CoreResult<()> {
        self.kv.hdel(&self.group, name).await.map_err(kv_error)
    }

    async fn list(&self) -> CoreResult<Vec<String>> {
        self.kv.hkeys(&self.group).await.map_err(kv_error)
    }

    async fn exists(&self, name: &str) -> CoreResult<bool> {
        self.kv.hexists(&self.group, name).await.map_err(kv_error)
    }
}
