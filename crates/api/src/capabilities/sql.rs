//! `mysql.*` capabilities over the named connection pools.

use std::sync::Arc;

use rhai::{Dynamic, FnPtr};
use serde_json::Value;
use taskforge_core::script::host::{arg_json, arg_string, HostFunc};
use taskforge_core::CoreError;
use tokio::runtime::Handle;

use taskforge_db::{split_bracket_prefix, SqlClient, SqlClients};

/// Pull the optional `[args]` array out of the second call argument.
fn query_args(args: &[&mut Dynamic]) -> Result<Vec<Value>, CoreError> {
    if args.len() < 2 || args[1].is_unit() {
        return Ok(Vec::new());
    }
    match arg_json(args, 1) {
        Some(Value::Array(values)) => Ok(values),
        _ => Err(CoreError::InvalidArgument(
            "second argument must be an array of query parameters".to_string(),
        )),
    }
}

fn client_named<'a>(clients: &'a SqlClients, name: &str) -> Result<&'a SqlClient, CoreError> {
    clients.get(name).ok_or_else(|| {
        CoreError::BackendUnavailable(if name.is_empty() {
            "mysql client is not initialized".to_string()
        } else {
            format!("mysql client '{name}' is not initialized")
        })
    })
}

fn rows_to_dynamic(rows: Vec<serde_json::Map<String, Value>>) -> Result<Dynamic, CoreError> {
    rhai::serde::to_dynamic(&rows)
        .map_err(|err| CoreError::Serialization(format!("mysql rows: {err}")))
}

/// `mysql.query(sql, [args])`: the query may carry a `[name]` prefix that
/// selects a named connection; rows come back as an array of column→value
/// maps.
pub fn query(clients: Arc<SqlClients>, handle: Handle) -> HostFunc {
    Arc::new(move |_ctx, args| {
        let Some(raw) = arg_string(args, 0) else {
            return Err(CoreError::InvalidArgument(
                "mysql.query requires at least a query string".to_string(),
            ));
        };
        let (name, sql) = split_bracket_prefix(&raw);
        let client = client_named(&clients, name)?;
        let params = query_args(args)?;

        let rows = handle.block_on(client.query_to_rows(sql, &params))?;
        rows_to_dynamic(rows)
    })
}

/// `mysql.exec(sql, [args])` → `{lastInsertId, rowsAffected}`.
pub fn exec(clients: Arc<SqlClients>, handle: Handle) -> HostFunc {
    Arc::new(move |_ctx, args| {
        let Some(sql) = arg_string(args, 0) else {
            return Err(CoreError::InvalidArgument(
                "mysql.exec requires at least a query string".to_string(),
            ));
        };
        let client = client_named(&clients, "")?;
        let params = query_args(args)?;

        let (last_insert_id, rows_affected) = handle.block_on(client.exec(&sql, &params))?;
        let mut map = rhai::Map::new();
        map.insert("lastInsertId".into(), Dynamic::from(last_insert_id as i64));
        map.insert("rowsAffected".into(), Dynamic::from(rows_affected as i64));
        Ok(Dynamic::from_map(map))
    })
}

/// `mysql.queryRow(sql, [args])` → first row or unit.
pub fn query_row(clients: Arc<SqlClients>, handle: Handle) -> HostFunc {
    Arc::new(move |_ctx, args| {
        let Some(sql) = arg_string(args, 0) else {
            return Err(CoreError::InvalidArgument(
                "mysql.queryRow requires at least a query string".to_string(),
            ));
        };
        let client = client_named(&clients, "")?;
        let params = query_args(args)?;

        match handle.block_on(client.query_row(&sql, &params))? {
            Some(row) => rhai::serde::to_dynamic(&row)
                .map_err(|err| CoreError::Serialization(format!("mysql row: {err}"))),
            None => Ok(Dynamic::UNIT),
        }
    })
}

/// `mysql.transaction(fn)`: begin, invoke the callback, commit on normal
/// return (yielding `true`), roll back and re-raise on a thrown exception.
/// Statements inside the callback still run through their own capability
/// calls; nested transactions are not supported.
pub fn transaction(clients: Arc<SqlClients>, handle: Handle) -> HostFunc {
    Arc::new(move |ctx, args| {
        let Some(fn_ptr) = args
            .first()
            .and_then(|arg| (**arg).clone().try_cast::<FnPtr>())
        else {
            return Err(CoreError::InvalidArgument(
                "mysql.transaction requires a callback function".to_string(),
            ));
        };
        let client = client_named(&clients, "")?;

        let tx = handle.block_on(client.begin())?;
        match fn_ptr.call_within_context::<Dynamic>(ctx, ()) {
            Ok(_) => {
                handle
                    .block_on(tx.commit())
                    .map_err(|err| CoreError::Upstream(format!("mysql commit: {err}")))?;
                Ok(Dynamic::from(true))
            }
            Err(err) => {
                if let Err(rollback_err) = handle.block_on(tx.rollback()) {
                    tracing::warn!(error = %rollback_err, "mysql rollback failed");
                }
                Err(CoreError::Runtime(format!("transaction aborted: {err}")))
            }
        }
    })
}
