//! Config change dispatch.
//!
//! Routes subscriber events by `(parent_id, data_id)` to the domain stores.
//! Failures are logged and suppressed here so a bad payload never costs a
//! subscription.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use taskforge_registry::subscriber::{
    DATA_ID_DEVICE_CONFIG, DATA_ID_DEVICE_TYPE_CONFIG, DATA_ID_DICT_CONFIG,
    DATA_ID_PROTOCOL_CONFIG,
};
use taskforge_registry::{ChangeCallback, ConfigStores};

/// Build the subscriber callback over the domain stores. `ready` gates the
/// device-configuration apply pass until startup loading has finished.
pub fn build_change_callback(stores: Arc<ConfigStores>, ready: Arc<AtomicBool>) -> ChangeCallback {
    Arc::new(move |data_id, content, parent_id| {
        tracing::info!(data_id, parent = parent_id, "config update");

        if parent_id == DATA_ID_DEVICE_CONFIG {
            match stores.devices.update(data_id, content) {
                Ok(()) => apply_device_configuration(&stores, &ready),
                Err(err) => {
                    tracing::warn!(data_id, error = %err, "failed to update device config");
                }
            }
        } else if data_id == DATA_ID_DEVICE_TYPE_CONFIG {
            match stores.device_types.update(data_id, content) {
                Ok(()) => apply_device_configuration(&stores, &ready),
                Err(err) => {
                    tracing::warn!(data_id, error = %err, "failed to update device type config");
                }
            }
        } else if parent_id == DATA_ID_PROTOCOL_CONFIG {
            if let Err(err) = stores.protocols.update(data_id, content) {
                tracing::warn!(data_id, error = %err, "failed to update protocol config");
            }
        } else if parent_id == DATA_ID_DICT_CONFIG {
            stores.dictionaries.update(data_id, content);
        }
    })
}

fn apply_device_configuration(stores: &ConfigStores, ready: &AtomicBool) {
    if !ready.load(Ordering::SeqCst) {
        return;
    }
    match stores.apply_device_configuration() {
        Ok(configs) => {
            tracing::info!(count = configs.len(), "applied device configuration");
        }
        Err(err) => tracing::warn!(error = %err, "failed to apply device configuration"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskforge_registry::ChangeHandlers;

    fn setup() -> (Arc<ConfigStores>, ChangeCallback) {
        let stores = Arc::new(ConfigStores::new(ChangeHandlers::default()));
        let ready = Arc::new(AtomicBool::new(true));
        let callback = build_change_callback(stores.clone(), ready);
        (stores, callback)
    }

    #[test]
    fn device_payloads_route_by_parent() {
        let (stores, callback) = setup();
        callback.as_ref()(
            "device-meters.json",
            r#"[{"name":"meter_1","type":"meter"}]"#,
            DATA_ID_DEVICE_CONFIG,
        );
        assert!(stores.devices.get("meter_1").is_some());
    }

    #[test]
    fn device_types_route_by_data_id() {
        let (stores, callback) = setup();
        callback.as_ref()(
            DATA_ID_DEVICE_TYPE_CONFIG,
            r#"{"device_types":{"meter":{"interval":30}}}"#,
            "",
        );
        assert_eq!(stores.device_types.get("meter").unwrap().interval, 30);
    }

    #[test]
    fn protocols_and_dictionaries_route_by_parent() {
        let (stores, callback) = setup();
        callback.as_ref()(
            "meter.csv",
            "name,key,address,length\nVolt,v,1,2\n",
            DATA_ID_PROTOCOL_CONFIG,
        );
        callback.as_ref()("units.csv", "code,label\n", DATA_ID_DICT_CONFIG);

        assert!(stores.protocols.registers("meter.csv").is_ok());
        assert_eq!(
            stores.dictionaries.raw("units.csv").as_deref(),
            Some("code,label\n")
        );
    }

    #[test]
    fn bad_payload_is_suppressed() {
        let (stores, callback) = setup();
        callback.as_ref()("device-meters.json", "{broken", DATA_ID_DEVICE_CONFIG);
        assert!(stores.devices.all().is_empty());
    }
}
