//! Property-string helpers.
//!
//! Device and device-type configs carry free-form settings as
//! `"k1=v1,k2=v2,…"` strings. A bare `k` with no `=` is read as `k=true`.

use std::collections::HashMap;

/// Parse a property string into a map. Whitespace around keys and values is
/// trimmed; empty input yields an empty map.
pub fn property_map(property_string: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if property_string.is_empty() {
        return map;
    }

    for pair in property_string.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        match pair.split_once('=') {
            Some((key, value)) => {
                map.insert(key.trim().to_string(), value.trim().to_string());
            }
            None => {
                map.insert(pair.to_string(), "true".to_string());
            }
        }
    }
    map
}

/// Look up `key` in a property string, falling back to `default` when the
/// string is empty or the key is absent.
pub fn property_value(property_string: &str, key: &str, default: &str) -> String {
    if property_string.is_empty() {
        return default.to_string();
    }
    property_map(property_string)
        .remove(key)
        .unwrap_or_else(|| default.to_string())
}
