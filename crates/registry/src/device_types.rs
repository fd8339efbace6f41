//! Device type configuration store.
//!
//! Device types arrive as one JSON document mapping type name to settings.
//! Updates are coarse by design: the whole snapshot is replaced atomically
//! and the update handler fires for every entry, with no per-entry diffing.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use taskforge_core::error::CoreResult;
use taskforge_core::properties::property_value;
use taskforge_core::CoreError;

use crate::devices::DeviceConfig;
use crate::handlers::ChangeHandlers;

/// Settings for one device type. `config` and `tags` are property strings
/// (`"k1=v1,k2=v2,…"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DeviceTypeConfig {
    /// Backfilled from the map key after parsing.
    #[serde(skip)]
    pub type_name: String,
    #[serde(default)]
    pub interval: i64,
    #[serde(default)]
    pub timeout: i64,
    #[serde(default)]
    pub retries: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bucket: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub config: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tags: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub params: String,
}

/// Wire shape of the device-types document.
#[derive(Debug, Deserialize)]
struct DeviceTypesDocument {
    #[serde(default)]
    device_types: HashMap<String, DeviceTypeConfig>,
}

/// Atomic snapshot of all device types.
pub struct DeviceTypeStore {
    snapshot: RwLock<Arc<HashMap<String, DeviceTypeConfig>>>,
    handlers: ChangeHandlers,
}

impl DeviceTypeStore {
    pub fn new(handlers: ChangeHandlers) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(HashMap::new())),
            handlers,
        }
    }

    /// Parse and publish a new snapshot, firing the update handler once per
    /// entry.
    pub fn update(&self, data_id: &str, payload: &str) -> CoreResult<()> {
        let document: DeviceTypesDocument = serde_json::from_str(payload).map_err(|err| {
            CoreError::Serialization(format!("device type config '{data_id}': {err}"))
        })?;

        let mut types = document.device_types;
        for (name, config) in types.iter_mut() {
            config.type_name = name.clone();
        }

        let snapshot = Arc::new(types);
        *self.snapshot.write().expect("device type snapshot poisoned") = snapshot.clone();

        if let Some(handler) = self.handlers.on_device_type_update.as_deref() {
            for config in snapshot.values() {
                handler(config);
            }
        }
        Ok(())
    }

    pub fn get(&self, type_name: &str) -> Option<DeviceTypeConfig> {
        self.snapshot
            .read()
            .expect("device type snapshot poisoned")
            .get(type_name)
            .cloned()
    }

    pub fn all(&self) -> Vec<DeviceTypeConfig> {
        self.snapshot
            .read()
            .expect("device type snapshot poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Look up `key` in a type's `config` property string.
    pub fn config_value(&self, type_name: &str, key: &str, default: &str) -> String {
        match self.get(type_name) {
            Some(config) => property_value(&config.config, key, default),
            None => default.to_string(),
        }
    }

    /// Look up `key` in a type's `tags` property string.
    pub fn tag_value(&self, type_name: &str, key: &str, default: &str) -> String {
        match self.get(type_name) {
            Some(config) => property_value(&config.tags, key, default),
            None => default.to_string(),
        }
    }

    /// Overlay type-level settings onto a device config (currently the poll
    /// interval).
    pub fn apply(&self, device: &mut DeviceConfig) {
        if let Some(type_config) = self.get(&device.device_type) {
            device.interval = Some(type_config.interval);
        }
    }
}
