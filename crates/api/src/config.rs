//! YAML file configuration.
//!
//! Loaded once at startup from `config.yaml` in the working directory (or a
//! directory passed on the command line). Every section has defaults
//! suitable for local development; a missing file is a startup error.

use serde::Deserialize;
use taskforge_core::CoreError;
use taskforge_registry::RegistrySettings;

/// Script group used when the config does not name one.
pub const DEFAULT_SCRIPT_GROUP_NAME: &str = "default_scripts";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Display title for the service.
    pub title: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Taskforge".to_string(),
        }
    }
}

/// Remote config registry connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NacosConfig {
    pub server_addr: String,
    pub port: u16,
    pub namespace: String,
    pub group: String,
    pub log_dir: String,
}

impl Default for NacosConfig {
    fn default() -> Self {
        Self {
            server_addr: String::new(),
            port: 8848,
            namespace: String::new(),
            group: "DEFAULT_GROUP".to_string(),
            log_dir: "./nacos".to_string(),
        }
    }
}

impl NacosConfig {
    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            server_addr: self.server_addr.clone(),
            port: self.port,
            namespace: self.namespace.clone(),
            group: self.group.clone(),
            log_dir: self.log_dir.clone(),
        }
    }
}

/// One named MySQL connection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MySqlEntry {
    pub name: String,
    #[serde(rename = "connString")]
    pub conn_string: String,
}

/// Redis connection; `db` holds runtime data, `dbConfig` holds script source.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub addr: String,
    pub password: String,
    pub db: i64,
    #[serde(rename = "dbConfig")]
    pub db_config: i64,
    pub enable: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: "localhost:6379".to_string(),
            password: String::new(),
            db: 0,
            db_config: 10,
            enable: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub mysql: Vec<MySqlEntry>,
    pub redis: RedisConfig,
}

/// Embedded web server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub port: u16,
    #[serde(rename = "static")]
    pub static_dir: String,
    pub enable: bool,
    /// Allowed CORS origins. Empty means permissive (no browser admin UI is
    /// pinned to an origin by default).
    #[serde(rename = "corsOrigins")]
    pub cors_origins: Vec<String>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            static_dir: "static".to_string(),
            enable: true,
            cors_origins: Vec::new(),
        }
    }
}

/// Script persistence group and execute-route prefix.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    #[serde(rename = "groupName")]
    pub group_name: String,
    pub endpoint: String,
    pub dir: String,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            group_name: DEFAULT_SCRIPT_GROUP_NAME.to_string(),
            endpoint: String::new(),
            dir: "scripts".to_string(),
        }
    }
}

/// Full file configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub app: AppConfig,
    pub nacos: NacosConfig,
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub script: ScriptConfig,
}

impl FileConfig {
    /// Parse a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, CoreError> {
        let mut config: Self = serde_yaml::from_str(content)
            .map_err(|err| CoreError::Serialization(format!("config file: {err}")))?;
        config.normalize();
        Ok(config)
    }

    /// Load `config.yaml` from `dir`.
    pub fn load(dir: &str) -> Result<Self, CoreError> {
        let path = std::path::Path::new(dir).join("config.yaml");
        let content = std::fs::read_to_string(&path).map_err(|err| {
            CoreError::InvalidArgument(format!("cannot read {}: {err}", path.display()))
        })?;
        let config = Self::from_yaml(&content)?;
        tracing::info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Name unnamed MySQL entries and make the first one the default.
    fn normalize(&mut self) {
        for (i, entry) in self.database.mysql.iter_mut().enumerate() {
            if entry.name.is_empty() {
                entry.name = if i == 0 {
                    "default".to_string()
                } else {
                    format!("mysql_{i}")
                };
            }
        }
    }

    /// Parsed settings for every MySQL entry with a connection string.
    pub fn mysql_settings(&self) -> Vec<taskforge_db::MySqlSettings> {
        self.database
            .mysql
            .iter()
            .filter(|entry| !entry.conn_string.is_empty())
            .map(|entry| taskforge_db::MySqlSettings::parse(&entry.name, &entry.conn_string))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
app:
  title: "Collector"
nacos:
  server_addr: "nacos.local"
  port: 8848
  namespace: "prod"
  group: "COLLECTOR"
  log_dir: "/var/log/nacos"
database:
  mysql:
    - name: default
      connString: "root:pw@tcp(db.local:3306)/app?timeout=5s"
    - connString: "ro:pw@tcp(replica.local:3306)/app"
  redis:
    addr: "redis.local:6379"
    password: "s3cret"
    db: 1
    dbConfig: 11
    enable: true
web:
  port: 9090
  static: "public"
  enable: true
  corsOrigins:
    - "http://admin.local:5173"
script:
  groupName: "collector_scripts"
  endpoint: "task"
  dir: "scripts"
"#;

    #[test]
    fn parses_full_document() {
        let config = FileConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.app.title, "Collector");
        assert_eq!(config.nacos.server_addr, "nacos.local");
        assert_eq!(config.nacos.group, "COLLECTOR");
        assert_eq!(config.database.redis.db_config, 11);
        assert!(config.database.redis.enable);
        assert_eq!(config.web.port, 9090);
        assert_eq!(config.web.cors_origins, vec!["http://admin.local:5173"]);
        assert_eq!(config.script.group_name, "collector_scripts");
        assert_eq!(config.script.endpoint, "task");
    }

    #[test]
    fn unnamed_mysql_entries_get_generated_names() {
        let config = FileConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.database.mysql[0].name, "default");
        assert_eq!(config.database.mysql[1].name, "mysql_1");

        let settings = config.mysql_settings();
        assert_eq!(settings.len(), 2);
        assert_eq!(settings[0].host, "db.local");
        assert_eq!(settings[0].timeout_secs, 5);
    }

    #[test]
    fn defaults_apply_for_missing_sections() {
        let config = FileConfig::from_yaml("app:\n  title: X\n").unwrap();
        assert_eq!(config.nacos.port, 8848);
        assert_eq!(config.database.redis.addr, "localhost:6379");
        assert_eq!(config.database.redis.db_config, 10);
        assert_eq!(config.web.port, 8080);
        assert!(config.web.cors_origins.is_empty());
        assert_eq!(config.script.group_name, DEFAULT_SCRIPT_GROUP_NAME);
        assert!(config.script.endpoint.is_empty());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(FileConfig::from_yaml(": not yaml").is_err());
    }
}
