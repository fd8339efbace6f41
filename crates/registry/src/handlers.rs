//! Change-handler callbacks fired by the domain config stores.

use std::sync::Arc;

use crate::devices::DeviceConfig;
use crate::device_types::DeviceTypeConfig;

/// Optional callbacks invoked when a domain config changes. Set once at
/// startup; every store holds its own clone.
#[derive(Clone, Default)]
pub struct ChangeHandlers {
    pub on_device_update: Option<Arc<dyn Fn(&DeviceConfig) + Send + Sync>>,
    pub on_device_remove: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    pub on_device_type_update: Option<Arc<dyn Fn(&DeviceTypeConfig) + Send + Sync>>,
    pub on_protocol_update: Option<Arc<dyn Fn(&str, &str) + Send + Sync>>,
    pub on_dictionary_update: Option<Arc<dyn Fn(&str, &str) + Send + Sync>>,
}
