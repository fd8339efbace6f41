//! Write-back handlers: mirror domain config changes into the data KV store
//! so scripts (and other consumers) can read them.
//!
//! Handlers fire inside subscriber tasks; the actual writes are spawned so
//! dispatch never blocks on the KV round-trip.

use std::sync::Arc;

use taskforge_kv::KvClient;
use taskforge_registry::{real_device_type, ChangeHandlers};

const DEVICE_TYPE_HASH: &str = "DEVICE_TYPE";
const PROTOCOL_HASH: &str = "DEVICE_PROTOCOL";
const DICT_HASH: &str = "DICT";

/// Hash that holds devices of the given device's derived type.
fn device_hash(device_name: &str) -> String {
    format!("device_{}", real_device_type(device_name))
}

fn spawn_hset(client: &KvClient, group: String, key: String, value: String) {
    let client = client.clone();
    tokio::spawn(async move {
        if let Err(err) = client.hset(&group, &key, &value).await {
            tracing::warn!(group = %group, key = %key, error = %err, "config write-back failed");
        }
    });
}

/// Build the KV write-back handler set. With no KV client configured the
/// handlers are all absent and config changes stay in-process.
pub fn write_back_handlers(kv: Option<KvClient>) -> ChangeHandlers {
    let Some(kv) = kv else {
        return ChangeHandlers::default();
    };

    let on_device_update = {
        let kv = kv.clone();
        Arc::new(move |config: &taskforge_registry::DeviceConfig| {
            tracing::info!(device = %config.name, "device updated");
            match serde_json::to_string(config) {
                Ok(json) => spawn_hset(&kv, device_hash(&config.name), config.name.clone(), json),
                Err(err) => tracing::warn!(error = %err, "failed to serialize device config"),
            }
        }) as Arc<dyn Fn(&taskforge_registry::DeviceConfig) + Send + Sync>
    };

    let on_device_remove = {
        let kv = kv.clone();
        Arc::new(move |name: &str| {
            tracing::info!(device = name, "device removed");
            let kv = kv.clone();
            let group = device_hash(name);
            let key = name.to_string();
            tokio::spawn(async move {
                if let Err(err) = kv.hdel(&group, &key).await {
                    tracing::warn!(group = %group, key = %key, error = %err, "device removal write-back failed");
                }
            });
        }) as Arc<dyn Fn(&str) + Send + Sync>
    };

    let on_device_type_update = {
        let kv = kv.clone();
        Arc::new(move |config: &taskforge_registry::DeviceTypeConfig| {
            tracing::info!(device_type = %config.type_name, "device type updated");
            match serde_json::to_string(config) {
                Ok(json) => spawn_hset(
                    &kv,
                    DEVICE_TYPE_HASH.to_string(),
                    config.type_name.clone(),
                    json,
                ),
                Err(err) => tracing::warn!(error = %err, "failed to serialize device type config"),
            }
        }) as Arc<dyn Fn(&taskforge_registry::DeviceTypeConfig) + Send + Sync>
    };

    let on_protocol_update = {
        let kv = kv.clone();
        Arc::new(move |csv_name: &str, data: &str| {
            tracing::info!(protocol = csv_name, "protocol updated");
            spawn_hset(
                &kv,
                PROTOCOL_HASH.to_string(),
                csv_name.to_string(),
                data.to_string(),
            );
        }) as Arc<dyn Fn(&str, &str) + Send + Sync>
    };

    let on_dictionary_update = {
        let kv = kv.clone();
        Arc::new(move |csv_name: &str, data: &str| {
            tracing::info!(dictionary = csv_name, "dictionary updated");
            spawn_hset(
                &kv,
                DICT_HASH.to_string(),
                csv_name.to_string(),
                data.to_string(),
            );
        }) as Arc<dyn Fn(&str, &str) + Send + Sync>
    };

    ChangeHandlers {
        on_device_update: Some(on_device_update),
        on_device_remove: Some(on_device_remove),
        on_device_type_update: Some(on_device_type_update),
        on_protocol_update: Some(on_protocol_update),
        on_dictionary_update: Some(on_dictionary_update),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_hash_uses_derived_type() {
        assert_eq!(device_hash("meter_42"), "device_meter");
        assert_eq!(device_hash("plain"), "device_plain");
    }

    #[test]
    fn no_client_means_no_handlers() {
        let handlers = write_back_handlers(None);
        assert!(handlers.on_device_update.is_none());
        assert!(handlers.on_dictionary_update.is_none());
    }
}
