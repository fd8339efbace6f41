//! Remote config registry clients.
//!
//! The production client speaks the registry's HTTP API: plain GET for
//! content, and a long-poll listener that takes an MD5 fingerprint of the
//! last-seen content and returns when the server's copy differs. The
//! in-memory client backs tests with watch channels.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use taskforge_core::error::CoreResult;
use taskforge_core::CoreError;
use tokio::sync::watch;

/// MD5 fingerprint of a config payload, as the listener protocol expects.
pub fn content_fingerprint(content: &str) -> String {
    format!("{:x}", md5::compute(content))
}

/// Access to the remote config registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch the current content of `data_id`.
    async fn get_config(&self, data_id: &str) -> CoreResult<String>;

    /// Block for one long-poll round. Returns the new content when the
    /// server's copy no longer matches `fingerprint`, `None` when the round
    /// timed out without a change.
    async fn await_change(&self, data_id: &str, fingerprint: &str) -> CoreResult<Option<String>>;
}

/// Connection settings for the registry.
#[derive(Debug, Clone, Default)]
pub struct RegistrySettings {
    pub server_addr: String,
    pub port: u16,
    pub namespace: String,
    pub group: String,
    pub log_dir: String,
}

/// HTTP client for a nacos-style config registry.
pub struct HttpRegistryClient {
    http: reqwest::Client,
    base_url: String,
    namespace: String,
    group: String,
}

/// Field separator inside one listening entry.
const WORD_SEPARATOR: char = '\u{2}';
/// Entry terminator.
const LINE_SEPARATOR: char = '\u{1}';

impl HttpRegistryClient {
    pub fn new(settings: &RegistrySettings) -> CoreResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| CoreError::Upstream(format!("registry client: {err}")))?;
        Ok(Self {
            http,
            base_url: format!("http://{}:{}", settings.server_addr, settings.port),
            namespace: settings.namespace.clone(),
            group: settings.group.clone(),
        })
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn get_config(&self, data_id: &str) -> CoreResult<String> {
        let url = format!("{}/nacos/v1/cs/configs", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("dataId", data_id),
                ("group", &self.group),
                ("tenant", &self.namespace),
            ])
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|err| CoreError::Upstream(format!("registry get: {err}")))?;

        match response.status().as_u16() {
            200 => response
                .text()
                .await
                .map_err(|err| CoreError::Upstream(format!("registry get: {err}"))),
            404 => Err(CoreError::NotFound(format!("data id '{data_id}'"))),
            status => Err(CoreError::Upstream(format!(
                "registry get '{data_id}': status {status}"
            ))),
        }
    }

    async fn await_change(&self, data_id: &str, fingerprint: &str) -> CoreResult<Option<String>> {
        let listening = format!(
            "{data_id}{WORD_SEPARATOR}{}{WORD_SEPARATOR}{fingerprint}{WORD_SEPARATOR}{}{LINE_SEPARATOR}",
            self.group, self.namespace
        );
        let url = format!("{}/nacos/v1/cs/configs/listener", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("Long-Pulling-Timeout", "30000")
            .form(&[("Listening-Configs", listening)])
            .timeout(Duration::from_secs(40))
            .send()
            .await
            .map_err(|err| CoreError::Upstream(format!("registry listen: {err}")))?;

        if !response.status().is_success() {
            return Err(CoreError::Upstream(format!(
                "registry listen '{data_id}': status {}",
                response.status().as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|err| CoreError::Upstream(format!("registry listen: {err}")))?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        self.get_config(data_id).await.map(Some)
    }
}

/// In-memory registry for tests: publish content, and every listener sees
/// the change on its next poll.
#[derive(Default)]
pub struct MemoryRegistry {
    entries: Mutex<HashMap<String, watch::Sender<String>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace the content of `data_id`.
    pub fn publish(&self, data_id: &str, content: &str) {
        let mut entries = self.entries.lock().expect("registry entries poisoned");
        match entries.get(data_id) {
            Some(sender) => {
                sender.send_replace(content.to_string());
            }
            None => {
                let (sender, _receiver) = watch::channel(content.to_string());
                entries.insert(data_id.to_string(), sender);
            }
        }
    }
}

#[async_trait]
impl RegistryClient for MemoryRegistry {
    async fn get_config(&self, data_id: &str) -> CoreResult<String> {
        self.entries
            .lock()
            .expect("registry entries poisoned")
            .get(data_id)
            .map(|sender| sender.borrow().clone())
            .ok_or_else(|| CoreError::NotFound(format!("data id '{data_id}'")))
    }

    async fn await_change(&self, data_id: &str, fingerprint: &str) -> CoreResult<Option<String>> {
        let mut receiver = {
            self.entries
                .lock()
                .expect("registry entries poisoned")
                .get(data_id)
                .map(|sender| sender.subscribe())
                .ok_or_else(|| CoreError::NotFound(format!("data id '{data_id}'")))?
        };

        loop {
            let current = receiver.borrow_and_update().clone();
            if content_fingerprint(&current) != fingerprint {
                return Ok(Some(current));
            }
            if receiver.changed().await.is_err() {
                return Ok(None);
            }
        }
    }
}
