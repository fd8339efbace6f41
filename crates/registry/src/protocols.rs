//! Protocol configuration store.
//!
//! Protocol payloads are Modbus CSV documents. The CSV is parsed before
//! anything is stored: a parse failure stores neither the raw text nor the
//! registers, keeping the two maps consistent.

use std::collections::HashMap;
use std::sync::RwLock;

use taskforge_core::error::CoreResult;
use taskforge_core::modbus::{parse_modbus_csv, ModbusRegister};
use taskforge_core::CoreError;

use crate::handlers::ChangeHandlers;

/// Raw CSV plus parsed registers, keyed by csv name.
pub struct ProtocolStore {
    raw: RwLock<HashMap<String, String>>,
    registers: RwLock<HashMap<String, Vec<ModbusRegister>>>,
    handlers: ChangeHandlers,
}

impl ProtocolStore {
    pub fn new(handlers: ChangeHandlers) -> Self {
        Self {
            raw: RwLock::new(HashMap::new()),
            registers: RwLock::new(HashMap::new()),
            handlers,
        }
    }

    /// Parse and store a protocol document, firing the update handler on
    /// success.
    pub fn update(&self, csv_name: &str, payload: &str) -> CoreResult<()> {
        let registers = parse_modbus_csv(payload)?;

        self.raw
            .write()
            .expect("protocol raw map poisoned")
            .insert(csv_name.to_string(), payload.to_string());
        self.registers
            .write()
            .expect("protocol register map poisoned")
            .insert(csv_name.to_string(), registers);

        if let Some(handler) = self.handlers.on_protocol_update.as_deref() {
            handler(csv_name, payload);
        }
        Ok(())
    }

    pub fn raw(&self, csv_name: &str) -> Option<String> {
        self.raw
            .read()
            .expect("protocol raw map poisoned")
            .get(csv_name)
            .cloned()
    }

    /// Parsed registers for `csv_name`, or `NotFound` when the protocol has
    /// not been loaded.
    pub fn registers(&self, csv_name: &str) -> CoreResult<Vec<ModbusRegister>> {
        self.registers
            .read()
            .expect("protocol register map poisoned")
            .get(csv_name)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("protocol '{csv_name}'")))
    }
}
