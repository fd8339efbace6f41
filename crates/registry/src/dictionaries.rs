//! Dictionary configuration store: raw CSV by name, no parsing.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::handlers::ChangeHandlers;

pub struct DictionaryStore {
    raw: RwLock<HashMap<String, String>>,
    handlers: ChangeHandlers,
}

impl DictionaryStore {
    pub fn new(handlers: ChangeHandlers) -> Self {
        Self {
            raw: RwLock::new(HashMap::new()),
            handlers,
        }
    }

    pub fn update(&self, csv_name: &str, payload: &str) {
        self.raw
            .write()
            .expect("dictionary map poisoned")
            .insert(csv_name.to_string(), payload.to_string());
        if let Some(handler) = self.handlers.on_dictionary_update.as_deref() {
            handler(csv_name, payload);
        }
    }

    pub fn raw(&self, csv_name: &str) -> Option<String> {
        self.raw
            .read()
            .expect("dictionary map poisoned")
            .get(csv_name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_raw_content() {
        let store = DictionaryStore::new(ChangeHandlers::default());
        store.update("units.csv", "code,label\n1,kWh\n");
        assert_eq!(
            store.raw("units.csv").as_deref(),
            Some("code,label\n1,kWh\n")
        );
        assert!(store.raw("other.csv").is_none());
    }
}
