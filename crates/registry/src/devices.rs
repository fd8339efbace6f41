//! Device configuration store.
//!
//! Each data id publishes a JSON array of device configs. Device names are
//! unique across all data ids, so the store keeps two maps: raw payload by
//! data id (for diffing) and config by device name (for lookup). Updates
//! fire before removals so reconcilers see the new state before tearing
//! down the old.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use taskforge_core::error::CoreResult;
use taskforge_core::CoreError;

use crate::handlers::ChangeHandlers;

/// One device, keyed by its unique `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DeviceConfig {
    pub name: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub port: u16,
    #[serde(rename = "type", default)]
    pub device_type: String,
    #[serde(rename = "slave_id", default, skip_serializing_if = "Option::is_none")]
    pub slave_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
}

/// The part of a device name before the first `_`, used to group devices
/// into per-type hashes in the KV store.
pub fn real_device_type(name: &str) -> &str {
    name.split('_').next().unwrap_or(name)
}

/// Concurrent device config store with per-data-id diffing.
pub struct DeviceStore {
    raw_by_data_id: RwLock<HashMap<String, String>>,
    by_name: RwLock<HashMap<String, DeviceConfig>>,
    handlers: ChangeHandlers,
}

impl DeviceStore {
    pub fn new(handlers: ChangeHandlers) -> Self {
        Self {
            raw_by_data_id: RwLock::new(HashMap::new()),
            by_name: RwLock::new(HashMap::new()),
            handlers,
        }
    }

    fn parse(data_id: &str, payload: &str) -> CoreResult<Vec<DeviceConfig>> {
        if payload.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(payload).map_err(|err| {
            CoreError::Serialization(format!("device config '{data_id}': {err}"))
        })
    }

    /// Apply a new payload for `data_id`: upsert every listed device (firing
    /// the update handler), then remove devices present in the previous
    /// payload but absent from this one (firing the remove handler), then
    /// retain the payload for the next diff.
    pub fn update(&self, data_id: &str, payload: &str) -> CoreResult<()> {
        let configs = Self::parse(data_id, payload)?;

        let new_names: HashSet<String> = configs.iter().map(|cfg| cfg.name.clone()).collect();
        {
            let mut by_name = self.by_name.write().expect("device map poisoned");
            for config in &configs {
                by_name.insert(config.name.clone(), config.clone());
            }
        }
        if let Some(handler) = self.handlers.on_device_update.as_deref() {
            for config in &configs {
                handler(config);
            }
        }

        let previous = self
            .raw_by_data_id
            .read()
            .expect("device raw map poisoned")
            .get(data_id)
            .cloned();
        if let Some(previous) = previous {
            if let Ok(previous_configs) = Self::parse(data_id, &previous) {
                for old in previous_configs {
                    if !new_names.contains(&old.name) {
                        self.by_name
                            .write()
                            .expect("device map poisoned")
                            .remove(&old.name);
                        if let Some(handler) = self.handlers.on_device_remove.as_deref() {
                            handler(&old.name);
                        }
                    }
                }
            }
        }

        self.raw_by_data_id
            .write()
            .expect("device raw map poisoned")
            .insert(data_id.to_string(), payload.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<DeviceConfig> {
        self.by_name
            .read()
            .expect("device map poisoned")
            .get(name)
            .cloned()
    }

    pub fn all(&self) -> Vec<DeviceConfig> {
        self.by_name
            .read()
            .expect("device map poisoned")
            .values()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn device_json(names: &[&str]) -> String {
        let entries: Vec<serde_json::Value> = names
            .iter()
            .map(|name| {
                serde_json::json!({
                    "name": name,
                    "ip": "10.0.0.1",
                    "port": 502,
                    "type": "meter",
                })
            })
            .collect();
        serde_json::to_string(&entries).unwrap()
    }

    fn recording_store() -> (DeviceStore, Arc<Mutex<Vec<String>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let updates = events.clone();
        let removes = events.clone();
        let handlers = ChangeHandlers {
            on_device_update: Some(Arc::new(move |cfg: &DeviceConfig| {
                updates.lock().unwrap().push(format!("update:{}", cfg.name));
            })),
            on_device_remove: Some(Arc::new(move |name: &str| {
                removes.lock().unwrap().push(format!("remove:{name}"));
            })),
            ..Default::default()
        };
        (DeviceStore::new(handlers), events)
    }

    #[test]
    fn update_then_diff_fires_exactly_one_remove() {
        let (store, events) = recording_store();

        store.update("d", &device_json(&["A", "B"])).unwrap();
        assert_eq!(
            *events.lock().unwrap(),
            vec!["update:A".to_string(), "update:B".to_string()]
        );

        events.lock().unwrap().clear();
        store.update("d", &device_json(&["B", "C"])).unwrap();
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "update:B".to_string(),
                "update:C".to_string(),
                "remove:A".to_string()
            ]
        );

        assert!(store.get("A").is_none());
        assert!(store.get("B").is_some());
        assert!(store.get("C").is_some());
    }

    #[test]
    fn empty_payload_clears_via_diff() {
        let (store, events) = recording_store();
        store.update("d", &device_json(&["A"])).unwrap();
        events.lock().unwrap().clear();

        store.update("d", "").unwrap();
        assert_eq!(*events.lock().unwrap(), vec!["remove:A".to_string()]);
        assert!(store.all().is_empty());
    }

    #[test]
    fn invalid_payload_is_rejected_and_state_kept() {
        let (store, _events) = recording_store();
        store.update("d", &device_json(&["A"])).unwrap();

        let err = store.update("d", "{not json").unwrap_err();
        assert!(matches!(err, CoreError::Serialization(_)));
        assert!(store.get("A").is_some());
    }

    #[test]
    fn names_are_unique_across_data_ids() {
        let (store, _events) = recording_store();
        store.update("d1", &device_json(&["A"])).unwrap();
        store.update("d2", &device_json(&["B"])).unwrap();
        assert_eq!(store.all().len(), 2);

        // Removing from one data id leaves the other's devices alone.
        store.update("d1", "").unwrap();
        assert!(store.get("A").is_none());
        assert!(store.get("B").is_some());
    }

    #[test]
    fn derived_type_is_name_prefix() {
        assert_eq!(real_device_type("meter_42"), "meter");
        assert_eq!(real_device_type("plain"), "plain");
    }
}
