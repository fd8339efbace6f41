//! Named MySQL connection pools for script capabilities.
//!
//! Scripts reach SQL through `mysql.*` host functions; a query string may
//! carry a `[name]` bracket prefix selecting one of the configured named
//! connections. Rows come back as dynamic column→value maps since scripts
//! have no compile-time schema.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Map, Value};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, MySqlPool, Row};
use taskforge_core::CoreError;

/// Name that selects the default connection.
pub const DEFAULT_CLIENT_NAME: &str = "default";

/// Connection settings parsed from a `user:pass@tcp(host:port)/db?timeout=10s`
/// style connection string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MySqlSettings {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub timeout_secs: u64,
}

impl MySqlSettings {
    /// Parse a connection string. Unspecified parts keep their defaults
    /// (port 3306, timeout 10s).
    pub fn parse(name: &str, conn_string: &str) -> Self {
        let mut settings = Self {
            name: name.to_string(),
            port: 3306,
            timeout_secs: 10,
            ..Self::default()
        };
        let Some((credentials, rest)) = conn_string.split_once('@') else {
            return settings;
        };

        let (user, password) = match credentials.split_once(':') {
            Some((user, password)) => (user, password),
            None => (credentials, ""),
        };
        settings.user = user.to_string();
        settings.password = password.to_string();

        let Some((_, after_proto)) = rest.split_once('(') else {
            return settings;
        };
        let Some((addr, tail)) = after_proto.split_once(')') else {
            return settings;
        };
        match addr.split_once(':') {
            Some((host, port)) => {
                settings.host = host.to_string();
                settings.port = port.parse().unwrap_or(3306);
            }
            None => settings.host = addr.to_string(),
        }

        let (database, params) = match tail.split_once('?') {
            Some((database, params)) => (database, Some(params)),
            None => (tail, None),
        };
        settings.database = database.trim_start_matches('/').to_string();

        if let Some(params) = params {
            for pair in params.split('&') {
                if let Some(("timeout", value)) = pair.split_once('=') {
                    let value = value.trim_end_matches('s');
                    if let Ok(secs) = value.parse() {
                        settings.timeout_secs = secs;
                    }
                }
            }
        }
        settings
    }
}

/// One named pool plus its per-query deadline.
#[derive(Clone)]
pub struct SqlClient {
    pool: MySqlPool,
    timeout: Duration,
}

/// The set of named MySQL pools configured at startup.
pub struct SqlClients {
    clients: HashMap<String, SqlClient>,
    default_name: String,
}

impl SqlClients {
    /// Connect every configured client. Entries without a connection string
    /// or that fail to connect are logged and skipped; the client named
    /// `default` (or the first that connects) becomes the default.
    pub async fn connect(settings: &[MySqlSettings]) -> Self {
        let mut clients = HashMap::new();
        let mut default_name = String::new();

        for entry in settings {
            if entry.host.is_empty() {
                tracing::warn!(name = %entry.name, "mysql client has no address, skipping");
                continue;
            }
            let timeout = Duration::from_secs(entry.timeout_secs);
            let options = MySqlConnectOptions::new()
                .host(&entry.host)
                .port(entry.port)
                .username(&entry.user)
                .password(&entry.password)
                .database(&entry.database);

            match MySqlPoolOptions::new()
                .max_connections(25)
                .acquire_timeout(timeout)
                .connect_with(options)
                .await
            {
                Ok(pool) => {
                    tracing::info!(name = %entry.name, host = %entry.host, db = %entry.database, "mysql client connected");
                    if default_name.is_empty() || entry.name == DEFAULT_CLIENT_NAME {
                        default_name = entry.name.clone();
                    }
                    clients.insert(entry.name.clone(), SqlClient { pool, timeout });
                }
                Err(err) => {
                    tracing::warn!(name = %entry.name, error = %err, "failed to connect mysql client");
                }
            }
        }

        Self {
            clients,
            default_name,
        }
    }

    /// Whether any client connected.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Look up a client by name; an empty name selects the default.
    pub fn get(&self, name: &str) -> Option<&SqlClient> {
        let name = if name.is_empty() {
            self.default_name.as_str()
        } else {
            name
        };
        self.clients.get(name)
    }
}

impl SqlClient {
    /// Run a query and decode every row into a column→value map.
    pub async fn query_to_rows(
        &self,
        sql: &str,
        args: &[Value],
    ) -> Result<Vec<Map<String, Value>>, CoreError> {
        let rows = self
            .with_timeout(bind_args(sqlx::query(sql), args).fetch_all(&self.pool))
            .await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    /// Run a query and decode the first row, if any.
    pub async fn query_row(
        &self,
        sql: &str,
        args: &[Value],
    ) -> Result<Option<Map<String, Value>>, CoreError> {
        let row = self
            .with_timeout(bind_args(sqlx::query(sql), args).fetch_optional(&self.pool))
            .await?;
        Ok(row.as_ref().map(decode_row))
    }

    /// Run a statement; returns `(last_insert_id, rows_affected)`.
    pub async fn exec(&self, sql: &str, args: &[Value]) -> Result<(u64, u64), CoreError> {
        let done = self
            .with_timeout(bind_args(sqlx::query(sql), args).execute(&self.pool))
            .await?;
        Ok((done.last_insert_id(), done.rows_affected()))
    }

    /// Begin a transaction on this client's pool.
    pub async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::MySql>, CoreError> {
        self.pool
            .begin()
            .await
            .map_err(|err| CoreError::Upstream(format!("mysql begin: {err}")))
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, sqlx::Error>>,
    ) -> Result<T, CoreError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(CoreError::Upstream(format!("mysql: {err}"))),
            Err(_) => Err(CoreError::Timeout(format!(
                "mysql query exceeded {:?}",
                self.timeout
            ))),
        }
    }
}

type MySqlQuery<'q> = sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>;

/// Bind JSON argument values positionally.
fn bind_args<'q>(mut query: MySqlQuery<'q>, args: &'q [Value]) -> MySqlQuery<'q> {
    for arg in args {
        query = match arg {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    query.bind(i)
                } else {
                    query.bind(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => query.bind(s.as_str()),
            other => query.bind(other.to_string()),
        };
    }
    query
}

/// Decode one row into a column→value map.
fn decode_row(row: &MySqlRow) -> Map<String, Value> {
    let mut map = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), decode_column(row, i));
    }
    map
}

/// Decode a single column without schema knowledge: try the common types in
/// order, decoding raw bytes as text the way the scripts expect.
fn decode_column(row: &MySqlRow, i: usize) -> Value {
    if let Ok(value) = row.try_get::<Option<i64>, _>(i) {
        return value.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<u64>, _>(i) {
        return value.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(i) {
        return value.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<bool>, _>(i) {
        return value.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<String>, _>(i) {
        return value.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i) {
        return value
            .map(|v| Value::from(v.to_rfc3339()))
            .unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<chrono::NaiveDateTime>, _>(i) {
        return value
            .map(|v| Value::from(v.to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<Vec<u8>>, _>(i) {
        return value
            .map(|v| Value::from(String::from_utf8_lossy(&v).into_owned()))
            .unwrap_or(Value::Null);
    }
    Value::Null
}

/// Split an optional `[name]` prefix off a query string. Returns the client
/// name (empty selects the default) and the query proper.
pub fn split_bracket_prefix(sql: &str) -> (&str, &str) {
    if let Some(rest) = sql.strip_prefix('[') {
        if let Some((name, query)) = rest.split_once(']') {
            return (name, query);
        }
    }
    ("", sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_connection_string() {
        let settings =
            MySqlSettings::parse("default", "root:secret@tcp(db.local:3307)/metrics?parseTime=true&timeout=5s");
        assert_eq!(settings.user, "root");
        assert_eq!(settings.password, "secret");
        assert_eq!(settings.host, "db.local");
        assert_eq!(settings.port, 3307);
        assert_eq!(settings.database, "metrics");
        assert_eq!(settings.timeout_secs, 5);
    }

    #[test]
    fn parse_defaults_port_and_timeout() {
        let settings = MySqlSettings::parse("a", "user@tcp(localhost)/app");
        assert_eq!(settings.user, "user");
        assert_eq!(settings.password, "");
        assert_eq!(settings.host, "localhost");
        assert_eq!(settings.port, 3306);
        assert_eq!(settings.database, "app");
        assert_eq!(settings.timeout_secs, 10);
    }

    #[test]
    fn parse_tolerates_garbage() {
        let settings = MySqlSettings::parse("x", "not-a-dsn");
        assert_eq!(settings.host, "");
        assert_eq!(settings.port, 3306);
    }

    #[test]
    fn bracket_prefix_selects_client() {
        assert_eq!(
            split_bracket_prefix("[reports]SELECT 1"),
            ("reports", "SELECT 1")
        );
        assert_eq!(split_bracket_prefix("SELECT 1"), ("", "SELECT 1"));
        assert_eq!(split_bracket_prefix("[]SELECT 1"), ("", "SELECT 1"));
        // Unterminated bracket is treated as part of the query.
        assert_eq!(split_bracket_prefix("[oops"), ("", "[oops"));
    }
}
