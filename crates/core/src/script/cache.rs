//! In-process script cache over a [`ScriptStore`].
//!
//! The cache is the first tier every lookup hits. It fills lazily on miss,
//! writes through to the store on mutation (store first, cache after the
//! acknowledgement, so a failed persist never pollutes the cache), and falls
//! back to the store for listings until it has been initialized.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{OnceCell, RwLock};

use crate::error::CoreResult;
use crate::script::store::ScriptStore;

/// A cached script with metadata.
#[derive(Debug, Clone)]
pub struct ScriptEntry {
    pub name: String,
    pub code: String,
    pub updated_at: DateTime<Utc>,
}

/// Two-tier script cache: concurrent in-process map backed by a shared store.
pub struct ScriptCache {
    scripts: RwLock<HashMap<String, ScriptEntry>>,
    store: Arc<dyn ScriptStore>,
    init: OnceCell<()>,
    initialized: AtomicBool,
}

impl ScriptCache {
    pub fn new(store: Arc<dyn ScriptStore>) -> Self {
        Self {
            scripts: RwLock::new(HashMap::new()),
            store,
            init: OnceCell::new(),
            initialized: AtomicBool::new(false),
        }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn ScriptStore> {
        &self.store
    }

    /// Load every stored script into the cache. Idempotent: only the first
    /// call scans the store, later calls return immediately.
    pub async fn initialize(&self) {
        self.init
            .get_or_init(|| async {
                let mut loaded = Vec::new();
                self.store
                    .load(&mut |name, code| loaded.push((name, code)))
                    .await;

                let mut scripts = self.scripts.write().await;
                let now = Utc::now();
                for (name, code) in loaded {
                    scripts.insert(
                        name.clone(),
                        ScriptEntry {
                            name,
                            code,
                            updated_at: now,
                        },
                    );
                }
                tracing::info!(count = scripts.len(), "script cache initialized");
                drop(scripts);
                self.initialized.store(true, Ordering::SeqCst);
            })
            .await;
    }

    /// Fetch a script's source, consulting the store on a cache miss and
    /// retaining the result.
    pub async fn get_script(&self, name: &str) -> CoreResult<String> {
        if let Some(entry) = self.scripts.read().await.get(name) {
            return Ok(entry.code.clone());
        }

        let code = self.store.get(name).await?;
        self.insert_entry(name, &code).await;
        Ok(code)
    }

    /// Persist a script, then update the cache.
    pub async fn store_script(&self, name: &str, code: &str) -> CoreResult<()> {
        self.store.save(name, code).await?;
        self.insert_entry(name, code).await;
        Ok(())
    }

    /// Delete a script from the store, then drop it from the cache.
    pub async fn delete_script(&self, name: &str) -> CoreResult<()> {
        self.store.delete(name).await?;
        self.scripts.write().await.remove(name);
        Ok(())
    }

    /// All known script names. Served from the cache once initialized,
    /// otherwise delegated to the store.
    pub async fn list_scripts(&self) -> CoreResult<Vec<String>> {
        if !self.initialized.load(Ordering::SeqCst) {
            return self.store.list().await;
        }
        Ok(self.scripts.read().await.keys().cloned().collect())
    }

    /// Whether a script exists in the cache or the store. A positive store
    /// hit triggers a best-effort cache fill; a fill failure never shadows
    /// the positive answer.
    pub async fn script_exists(&self, name: &str) -> CoreResult<bool> {
        if self.scripts.read().await.contains_key(name) {
            return Ok(true);
        }

        let exists = self.store.exists(name).await?;
        if exists {
            match self.store.get(name).await {
                Ok(code) => self.insert_entry(name, &code).await,
                Err(err) => {
                    tracing::warn!(script = name, error = %err, "cache fill after exists failed");
                }
            }
        }
        Ok(exists)
    }

    async fn insert_entry(&self, name: &str, code: &str) {
        self.scripts.write().await.insert(
            name.to_string(),
            ScriptEntry {
                name: name.to_string(),
                code: code.to_string(),
                updated_at: Utc::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::script::store::{LoadCallback, MemoryScriptStore};
    use crate::CoreError;

    /// Store whose saves always fail, for write-through ordering tests.
    struct FailingStore;

    #[async_trait]
    impl ScriptStore for FailingStore {
        async fn load(&self, _callback: LoadCallback<'_>) {}
        async fn save(&self, _name: &str, _code: &str) -> CoreResult<()> {
            Err(CoreError::BackendUnavailable("kv".to_string()))
        }
        async fn get(&self, name: &str) -> CoreResult<String> {
            Err(CoreError::NotFound(format!("script '{name}'")))
        }
        async fn delete(&self, _name: &str) -> CoreResult<()> {
            Err(CoreError::BackendUnavailable("kv".to_string()))
        }
        async fn list(&self) -> CoreResult<Vec<String>> {
            Ok(Vec::new())
        }
        async fn exists(&self, _name: &str) -> CoreResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn initialize_fills_from_store_once() {
        let store = Arc::new(MemoryScriptStore::new());
        store.save("a", "1").await.unwrap();
        store.save("b", "2").await.unwrap();

        let cache = ScriptCache::new(store.clone());
        cache.initialize().await;
        cache.initialize().await; // second call is a no-op

        let mut names = cache.list_scripts().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn miss_fills_from_store() {
        let store = Arc::new(MemoryScriptStore::new());
        let cache = ScriptCache::new(store.clone());
        cache.initialize().await;

        // Written behind the cache's back, as another replica would.
        store.save("late", "40 + 2").await.unwrap();

        assert_eq!(cache.get_script("late").await.unwrap(), "40 + 2");
        // Now cached: delete from the store and read again.
        store.delete("late").await.unwrap();
        assert_eq!(cache.get_script("late").await.unwrap(), "40 + 2");
    }

    #[tokio::test]
    async fn store_script_writes_through() {
        let store = Arc::new(MemoryScriptStore::new());
        let cache = ScriptCache::new(store.clone());
        cache.initialize().await;

        cache.store_script("job", "1").await.unwrap();
        assert_eq!(store.get("job").await.unwrap(), "1");
        assert_eq!(cache.get_script("job").await.unwrap(), "1");

        cache.delete_script("job").await.unwrap();
        assert!(store.get("job").await.is_err());
        assert!(cache.get_script("job").await.is_err());
    }

    #[tokio::test]
    async fn failed_persist_does_not_pollute_cache() {
        let cache = ScriptCache::new(Arc::new(FailingStore));
        assert!(cache.store_script("job", "1").await.is_err());
        assert!(cache.get_script("job").await.is_err());
    }

    #[tokio::test]
    async fn list_falls_back_to_store_before_initialize() {
        let store = Arc::new(MemoryScriptStore::new());
        store.save("only", "1").await.unwrap();

        let cache = ScriptCache::new(store);
        // Not initialized: the store is authoritative.
        assert_eq!(cache.list_scripts().await.unwrap(), vec!["only"]);
    }

    #[tokio::test]
    async fn exists_consults_store_and_backfills() {
        let store = Arc::new(MemoryScriptStore::new());
        let cache = ScriptCache::new(store.clone());
        cache.initialize().await;

        store.save("ghost", "7").await.unwrap();
        assert!(cache.script_exists("ghost").await.unwrap());

        // Backfilled: visible even after the store entry is gone.
        store.delete("ghost").await.unwrap();
        assert!(cache.script_exists("ghost").await.unwrap());
    }
}
