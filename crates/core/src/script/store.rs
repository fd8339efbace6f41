//! Script persistence contract.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CoreResult;

/// Callback invoked once per stored script during a bulk load.
pub type LoadCallback<'a> = &'a mut (dyn FnMut(String, String) + Send);

/// Persistence backend for script source, keyed by name.
///
/// The production implementation lives in the KV adapter crate and maps each
/// operation onto one hash under the configured group.
#[async_trait]
pub trait ScriptStore: Send + Sync {
    /// Enumerate all scripts and invoke `callback` with each `(name, code)`
    /// pair. Failures fetching an individual entry are logged and skipped; a
    /// failure to enumerate aborts the load without raising.
    async fn load(&self, callback: LoadCallback<'_>);

    /// Persist `code` under `name`, overwriting any previous source.
    async fn save(&self, name: &str, code: &str) -> CoreResult<()>;

    /// Fetch the source for `name`.
    async fn get(&self, name: &str) -> CoreResult<String>;

    /// Remove the script named `name`.
    async fn delete(&self, name: &str) -> CoreResult<()>;

    /// List all stored script names (unordered).
    async fn list(&self) -> CoreResult<Vec<String>>;

    /// Whether a script named `name` is stored.
    async fn exists(&self, name: &str) -> CoreResult<bool>;
}

/// In-memory store used by tests and single-process setups without a shared
/// KV backend.
#[derive(Default)]
pub struct MemoryScriptStore {
    scripts: RwLock<HashMap<String, String>>,
}

impl MemoryScriptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScriptStore for MemoryScriptStore {
    async fn load(&self, callback: LoadCallback<'_>) {
        let scripts = self.scripts.read().await;
        for (name, code) in scripts.iter() {
            callback(name.clone(), code.clone());
        }
    }

    async fn save(&self, name: &str, code: &str) -> CoreResult<()> {
        self.scripts
            .write()
            .await
            .insert(name.to_string(), code.to_string());
        Ok(())
    }

    async fn get(&self, name: &str) -> CoreResult<String> {
        self.scripts
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| crate::CoreError::NotFound(format!("script '{name}'")))
    }

    async fn delete(&self, name: &str) -> CoreResult<()> {
        self.scripts.write().await.remove(name);
        Ok(())
    }

    async fn list(&self) -> CoreResult<Vec<String>> {
        Ok(self.scripts.read().await.keys().cloned().collect())
    }

    async fn exists(&self, name: &str) -> CoreResult<bool> {
        Ok(self.scripts.read().await.contains_key(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_get_delete_cycle() {
        let store = MemoryScriptStore::new();
        store.save("job", "1 + 1").await.unwrap();
        assert_eq!(store.get("job").await.unwrap(), "1 + 1");
        assert!(store.exists("job").await.unwrap());

        store.delete("job").await.unwrap();
        assert!(!store.exists("job").await.unwrap());
        assert!(store.get("job").await.is_err());
    }

    #[tokio::test]
    async fn load_visits_every_entry() {
        let store = MemoryScriptStore::new();
        store.save("a", "1").await.unwrap();
        store.save("b", "2").await.unwrap();

        let mut seen = Vec::new();
        store.load(&mut |name, code| seen.push((name, code))).await;
        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );
    }
}
