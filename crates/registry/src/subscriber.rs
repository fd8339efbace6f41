//! Two-level config subscription.
//!
//! Startup data ids whose name ends in `-root.json` are roots: their payload
//! is a JSON array of leaf data ids. The subscriber keeps one listener task
//! per listened data id and reconciles the leaf set whenever a root payload
//! changes. All reconciliation for all roots is serialized under one lock,
//! so the subscribed set is always a coherent snapshot of the latest root
//! payload.
//!
//! Dispatch failures are logged and suppressed: a bad payload never costs a
//! subscription.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taskforge_core::error::CoreResult;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::client::{content_fingerprint, RegistryClient};

/// Suffix that marks a root data id.
pub const ROOT_CONFIG_SUFFIX: &str = "-root.json";

pub const DATA_ID_DEVICE_CONFIG: &str = "device-root.json";
pub const DATA_ID_DEVICE_TYPE_CONFIG: &str = "device-types.json";
pub const DATA_ID_PROTOCOL_CONFIG: &str = "protocol-root.json";
pub const DATA_ID_DICT_CONFIG: &str = "dict-root.json";

/// Data ids fetched and subscribed at startup, in order.
pub const STARTUP_DATA_IDS: [&str; 4] = [
    DATA_ID_DEVICE_CONFIG,
    DATA_ID_DEVICE_TYPE_CONFIG,
    DATA_ID_PROTOCOL_CONFIG,
    DATA_ID_DICT_CONFIG,
];

/// Whether `data_id` is a root whose payload lists leaf data ids.
pub fn is_root_data_id(data_id: &str) -> bool {
    data_id.ends_with(ROOT_CONFIG_SUFFIX)
}

/// Invoked with `(data_id, content, parent_id)` on initial fetch and on
/// every change. `parent_id` is empty for top-level leaves.
pub type ChangeCallback = Arc<dyn Fn(&str, &str, &str) + Send + Sync>;

/// Owns the registry subscription tree and fans changes out to the callback.
pub struct ConfigSubscriber {
    client: Arc<dyn RegistryClient>,
    callback: ChangeCallback,
    /// root data id → (leaf data id → listener cancellation token).
    subscriptions: Mutex<HashMap<String, HashMap<String, CancellationToken>>>,
    ready: AtomicBool,
}

impl ConfigSubscriber {
    pub fn new(client: Arc<dyn RegistryClient>, callback: ChangeCallback) -> Arc<Self> {
        Arc::new(Self {
            client,
            callback,
            subscriptions: Mutex::new(HashMap::new()),
            ready: AtomicBool::new(false),
        })
    }

    /// Fetch, dispatch, and subscribe every startup data id. Fails if any
    /// startup id cannot be fetched; flips the ready flag once all initial
    /// loads completed.
    pub async fn start(self: &Arc<Self>) -> CoreResult<()> {
        for data_id in STARTUP_DATA_IDS {
            let content = self.client.get_config(data_id).await?;

            if is_root_data_id(data_id) {
                tracing::debug!(root = data_id, "processing root config");
                self.process_root(data_id, &content).await;
                self.spawn_root_listener(data_id.to_string(), content);
            } else {
                (self.callback.as_ref())(data_id, &content, "");
                self.spawn_leaf_listener(
                    data_id.to_string(),
                    String::new(),
                    content,
                    CancellationToken::new(),
                );
            }
        }

        tracing::info!("config subscriber initialized");
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// True once every startup data id has completed its initial load.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Currently subscribed leaves under `root` (unordered).
    pub async fn subscribed_leaves(&self, root: &str) -> Vec<String> {
        self.subscriptions
            .lock()
            .await
            .get(root)
            .map(|leaves| leaves.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Reconcile the leaf set for a root payload: cancel listeners for
    /// vanished leaves, then fetch + dispatch + listen for new ones.
    async fn process_root(self: &Arc<Self>, root_id: &str, payload: &str) {
        let leaf_ids: Vec<String> = if payload.trim().is_empty() {
            tracing::warn!(root = root_id, "root configuration is empty");
            Vec::new()
        } else {
            match serde_json::from_str(payload) {
                Ok(ids) => ids,
                Err(err) => {
                    tracing::warn!(root = root_id, error = %err, "cannot parse leaf list");
                    return;
                }
            }
        };
        if leaf_ids.is_empty() {
            tracing::info!(root = root_id, "root configuration lists no leaf data ids");
        }

        let mut subscriptions = self.subscriptions.lock().await;
        let subscribed = subscriptions.entry(root_id.to_string()).or_default();

        let new_set: HashSet<&str> = leaf_ids.iter().map(String::as_str).collect();
        let to_unsubscribe: Vec<String> = subscribed
            .keys()
            .filter(|leaf| !new_set.contains(leaf.as_str()))
            .cloned()
            .collect();
        let to_subscribe: Vec<String> = leaf_ids
            .iter()
            .filter(|leaf| !subscribed.contains_key(*leaf))
            .cloned()
            .collect();

        for leaf in to_unsubscribe {
            if let Some(token) = subscribed.remove(&leaf) {
                token.cancel();
                tracing::info!(leaf = %leaf, root = root_id, "cancelled listener");
            }
        }

        for leaf in to_subscribe {
            let content = match self.client.get_config(&leaf).await {
                Ok(content) => content,
                Err(err) => {
                    tracing::warn!(leaf = %leaf, error = %err, "failed to fetch initial config");
                    continue;
                }
            };
            (self.callback.as_ref())(&leaf, &content, root_id);

            let token = CancellationToken::new();
            self.spawn_leaf_listener(leaf.clone(), root_id.to_string(), content, token.clone());
            subscribed.insert(leaf, token);
        }
    }

    /// Background long-poll loop for one leaf data id.
    fn spawn_leaf_listener(
        self: &Arc<Self>,
        data_id: String,
        parent: String,
        initial: String,
        token: CancellationToken,
    ) {
        let subscriber = Arc::clone(self);
        tokio::spawn(async move {
            let mut fingerprint = content_fingerprint(&initial);
            loop {
                tokio::select! {
                    // Cancellation wins over a simultaneously ready change.
                    biased;
                    _ = token.cancelled() => break,
                    changed = subscriber.client.await_change(&data_id, &fingerprint) => {
                        match changed {
                            Ok(Some(content)) => {
                                fingerprint = content_fingerprint(&content);
                                (subscriber.callback.as_ref())(&data_id, &content, &parent);
                            }
                            Ok(None) => {}
                            Err(err) => {
                                tracing::warn!(data_id = %data_id, error = %err, "listener poll failed");
                                tokio::time::sleep(Duration::from_secs(1)).await;
                            }
                        }
                    }
                }
            }
        });
    }

    /// Background long-poll loop for a root data id; changes re-enter
    /// reconciliation instead of the user callback.
    fn spawn_root_listener(self: &Arc<Self>, data_id: String, initial: String) {
        let subscriber = Arc::clone(self);
        tokio::spawn(async move {
            let mut fingerprint = content_fingerprint(&initial);
            loop {
                match subscriber.client.await_change(&data_id, &fingerprint).await {
                    Ok(Some(content)) => {
                        fingerprint = content_fingerprint(&content);
                        subscriber.process_root(&data_id, &content).await;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(root = %data_id, error = %err, "root listener poll failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });
    }
}
