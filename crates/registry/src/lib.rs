//! Dynamic configuration: remote registry client, two-level subscriber, and
//! the domain config stores it feeds.

pub mod client;
pub mod devices;
pub mod device_types;
pub mod dictionaries;
pub mod handlers;
pub mod protocols;
pub mod subscriber;

pub use client::{content_fingerprint, HttpRegistryClient, MemoryRegistry, RegistryClient,
    RegistrySettings};
pub use devices::{real_device_type, DeviceConfig, DeviceStore};
pub use device_types::{DeviceTypeConfig, DeviceTypeStore};
pub use dictionaries::DictionaryStore;
pub use handlers::ChangeHandlers;
pub use protocols::ProtocolStore;
pub use subscriber::{ChangeCallback, ConfigSubscriber, DATA_ID_DEVICE_CONFIG,
    DATA_ID_DEVICE_TYPE_CONFIG, DATA_ID_DICT_CONFIG, DATA_ID_PROTOCOL_CONFIG,
    STARTUP_DATA_IDS};

use taskforge_core::error::CoreResult;

/// The set of domain config stores fed by the subscriber.
pub struct ConfigStores {
    pub devices: DeviceStore,
    pub device_types: DeviceTypeStore,
    pub protocols: ProtocolStore,
    pub dictionaries: DictionaryStore,
}

impl ConfigStores {
    pub fn new(handlers: ChangeHandlers) -> Self {
        Self {
            devices: DeviceStore::new(handlers.clone()),
            device_types: DeviceTypeStore::new(handlers.clone()),
            protocols: ProtocolStore::new(handlers.clone()),
            dictionaries: DictionaryStore::new(handlers),
        }
    }

    /// Re-derive the effective device set: drop devices whose type is not
    /// configured, then overlay each survivor with its type's interval.
    pub fn apply_device_configuration(&self) -> CoreResult<Vec<DeviceConfig>> {
        let mut configs = self.devices.all();
        configs.retain(|cfg| {
            let known = self.device_types.get(&cfg.device_type).is_some();
            if !known {
                tracing::info!(device = %cfg.name, kind = %cfg.device_type, "ignoring device with unknown type");
            }
            known
        });
        for cfg in &mut configs {
            self.device_types.apply(cfg);
        }
        Ok(configs)
    }
}
