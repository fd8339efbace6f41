//! `redis.*` capabilities over the shared KV client.
//!
//! Read failures degrade to neutral values (unit, zero, empty collections)
//! rather than raising, so a flaky KV backend does not abort scripts that
//! can live without the answer.

use std::sync::Arc;

use rhai::Dynamic;
use taskforge_core::script::host::{arg_string, arg_to_string, HostFunc};
use tokio::runtime::Handle;

use taskforge_kv::KvClient;

/// `redis.set(key, value)` for a flat set, `redis.set(group, key, value)`
/// for a hash field set (empty group selects the default group).
pub fn set(client: KvClient, handle: Handle) -> HostFunc {
    Arc::new(move |_ctx, args| {
        if args.len() < 2 {
            return Ok(Dynamic::UNIT);
        }
        let outcome = if args.len() == 2 {
            let key = arg_to_string(args[0]);
            let value = arg_to_string(args[1]);
            handle.block_on(client.set(&key, &value))
        } else {
            let group = arg_to_string(args[0]);
            let key = arg_to_string(args[1]);
            let value = arg_to_string(args[2]);
            handle.block_on(client.hset(&group, &key, &value))
        };
        if let Err(err) = outcome {
            tracing::warn!(error = %err, "redis.set failed");
        }
        Ok(Dynamic::UNIT)
    })
}

/// `redis.get(key)` for a flat get, `redis.get(group, key)` for a hash
/// field get. A missing key yields unit, not an error.
pub fn get(client: KvClient, handle: Handle) -> HostFunc {
    Arc::new(move |_ctx, args| {
        let value = match args.len() {
            0 => return Ok(Dynamic::UNIT),
            1 => {
                let key = arg_to_string(args[0]);
                handle.block_on(client.get(&key))
            }
            _ => {
                let group = arg_to_string(args[0]);
                let key = arg_to_string(args[1]);
                handle.block_on(client.hget(&group, &key))
            }
        };
        match value {
            Ok(Some(value)) => Ok(Dynamic::from(value)),
            Ok(None) | Err(_) => Ok(Dynamic::UNIT),
        }
    })
}

/// `redis.keys(group)`: hash field names; an empty string on error.
pub fn keys(client: KvClient, handle: Handle) -> HostFunc {
    Arc::new(move |_ctx, args| {
        let Some(group) = arg_string(args, 0) else {
            return Ok(Dynamic::UNIT);
        };
        match handle.block_on(client.hkeys(&group)) {
            Ok(keys) => Ok(string_array(keys)),
            Err(_) => Ok(Dynamic::from("")),
        }
    })
}

/// `redis.hgetall(group)`: all fields of a hash as a map.
pub fn hgetall(client: KvClient, handle: Handle) -> HostFunc {
    Arc::new(move |_ctx, args| {
        let Some(group) = arg_string(args, 0) else {
            return Ok(Dynamic::UNIT);
        };
        match handle.block_on(client.hgetall(&group)) {
            Ok(fields) => {
                let mut map = rhai::Map::new();
                for (key, value) in fields {
                    map.insert(key.into(), Dynamic::from(value));
                }
                Ok(Dynamic::from_map(map))
            }
            Err(_) => Ok(Dynamic::from("")),
        }
    })
}

/// `redis.sadd(key, member, …)`: members are stringified first.
pub fn sadd(client: KvClient, handle: Handle) -> HostFunc {
    Arc::new(move |_ctx, args| {
        if args.len() < 2 {
            return Ok(Dynamic::UNIT);
        }
        let key = arg_to_string(args[0]);
        let members = args[1..].iter().map(|arg| arg_to_string(arg)).collect();
        let count = handle.block_on(client.sadd(&key, members)).unwrap_or(0);
        Ok(Dynamic::from(count))
    })
}

/// `redis.srem(key, member, …)`.
pub fn srem(client: KvClient, handle: Handle) -> HostFunc {
    Arc::new(move |_ctx, args| {
        if args.len() < 2 {
            return Ok(Dynamic::UNIT);
        }
        let key = arg_to_string(args[0]);
        let members = args[1..].iter().map(|arg| arg_to_string(arg)).collect();
        let count = handle.block_on(client.srem(&key, members)).unwrap_or(0);
        Ok(Dynamic::from(count))
    })
}

/// `redis.scard(key)`.
pub fn scard(client: KvClient, handle: Handle) -> HostFunc {
    Arc::new(move |_ctx, args| {
        let Some(key) = arg_string(args, 0) else {
            return Ok(Dynamic::UNIT);
        };
        let count = handle.block_on(client.scard(&key)).unwrap_or(0);
        Ok(Dynamic::from(count))
    })
}

/// `redis.smembers(key)`: an empty array on error.
pub fn smembers(client: KvClient, handle: Handle) -> HostFunc {
    Arc::new(move |_ctx, args| {
        let Some(key) = arg_string(args, 0) else {
            return Ok(Dynamic::UNIT);
        };
        let members = handle.block_on(client.smembers(&key)).unwrap_or_default();
        Ok(string_array(members))
    })
}

fn string_array(values: Vec<String>) -> Dynamic {
    Dynamic::from_array(values.into_iter().map(Dynamic::from).collect())
}
