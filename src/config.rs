//! Connection and logging configuration.
//!
//! Resolution order, lowest to highest precedence: built-in defaults, the JSON
//! file `<dir>/pgsqlConfig.json`, then environment variables. A non-blank
//! `pgConnectionString` replaces the discrete host/port/user/password/db
//! fields entirely.

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_CONFIG_DIR: &str = "./Config";
pub const CONFIG_FILE_NAME: &str = "pgsqlConfig.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid connection string: {0}")]
    ConnectionString(#[source] sqlx::Error),

    #[error("Failed to connect to PostgreSQL: {0}")]
    Connect(#[source] sqlx::Error),
}

/// Effective PostgreSQL settings. Field names on disk and in the environment
/// are the `pg*` names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgConfig {
    #[serde(rename = "pgAddress")]
    pub address: String,
    #[serde(rename = "pgPort")]
    pub port: u16,
    #[serde(rename = "pgUsername")]
    pub username: String,
    #[serde(rename = "pgPassword")]
    pub password: String,
    #[serde(rename = "pgDbName")]
    pub db_name: String,
    #[serde(rename = "pgConnectionString")]
    pub connection_string: String,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: "localdb".to_string(),
            db_name: "mmorpg_kit".to_string(),
            connection_string: String::new(),
        }
    }
}

impl PgConfig {
    fn uses_connection_string(&self) -> bool {
        !self.connection_string.trim().is_empty()
    }

    /// sqlx connect options: the connection string (a `postgres://` URL) when
    /// set, otherwise built from the discrete fields.
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        if self.uses_connection_string() {
            return PgConnectOptions::from_str(self.connection_string.trim())
                .map_err(ConfigError::ConnectionString);
        }
        let mut options = PgConnectOptions::new()
            .host(&self.address)
            .port(self.port)
            .username(&self.username)
            .database(&self.db_name);
        if !self.password.is_empty() {
            options = options.password(&self.password);
        }
        Ok(options)
    }

    /// Connection target for logs, without credentials.
    pub fn describe(&self) -> String {
        if self.uses_connection_string() {
            "<connection string>".to_string()
        } else {
            format!(
                "{}@{}:{}/{}",
                self.username, self.address, self.port, self.db_name
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
            log_file: "account_store.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
        }
    }
}

/// What resolution did. Loading runs before the subscriber exists, so the
/// caller logs this once logging is up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub path: PathBuf,
    pub wrote_defaults: bool,
    /// Environment variables that were set but unusable, with their values.
    pub ignored_env: Vec<(&'static str, String)>,
}

impl LoadReport {
    pub fn log(&self) {
        if self.wrote_defaults {
            tracing::info!(path = %self.path.display(), "Config file not found, wrote defaults");
        } else {
            tracing::info!(path = %self.path.display(), "Config file read");
        }
        for (name, value) in &self.ignored_env {
            tracing::warn!(variable = name, value = %value, "Ignoring unparsable environment override");
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub postgres: PgConfig,
    pub log: LogConfig,
}

/// On-disk shape: any field may be missing or null and then keeps its default.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(rename = "pgAddress")]
    address: Option<String>,
    #[serde(rename = "pgPort")]
    port: Option<u16>,
    #[serde(rename = "pgUsername")]
    username: Option<String>,
    #[serde(rename = "pgPassword")]
    password: Option<String>,
    #[serde(rename = "pgDbName")]
    db_name: Option<String>,
    #[serde(rename = "pgConnectionString")]
    connection_string: Option<String>,
    log: Option<LogConfig>,
}

impl AppConfig {
    /// Resolve from `<dir>/pgsqlConfig.json` and the process environment.
    pub fn load(dir: impl AsRef<Path>) -> Result<(Self, LoadReport), ConfigError> {
        Self::load_with_env(dir, |name| std::env::var(name).ok())
    }

    /// Resolve with an explicit environment lookup.
    ///
    /// If the file does not exist, the configuration resolved from defaults
    /// alone is written there (creating `dir`) before environment overrides
    /// are applied, so secrets from the environment never land on disk.
    pub fn load_with_env<F>(
        dir: impl AsRef<Path>,
        env: F,
    ) -> Result<(Self, LoadReport), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dir = dir.as_ref();
        let path = dir.join(CONFIG_FILE_NAME);
        let mut config = AppConfig::default();
        let mut report = LoadReport {
            path: path.clone(),
            ..LoadReport::default()
        };

        if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            let file: ConfigFile =
                serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?;
            config.apply_file(file);
        } else {
            config.write_to(dir, &path)?;
            report.wrote_defaults = true;
        }

        report.ignored_env = config.apply_env(env);
        Ok((config, report))
    }

    fn apply_file(&mut self, file: ConfigFile) {
        let pg = &mut self.postgres;
        if let Some(v) = file.address {
            pg.address = v;
        }
        if let Some(v) = file.port {
            pg.port = v;
        }
        if let Some(v) = file.username {
            pg.username = v;
        }
        if let Some(v) = file.password {
            pg.password = v;
        }
        if let Some(v) = file.db_name {
            pg.db_name = v;
        }
        if let Some(v) = file.connection_string {
            pg.connection_string = v;
        }
        if let Some(log) = file.log {
            self.log = log;
        }
    }

    /// Empty variables are ignored; `pgPort` only applies if it parses.
    /// Returns the variables that were set but could not be used.
    fn apply_env<F>(&mut self, env: F) -> Vec<(&'static str, String)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| env(name).filter(|v| !v.is_empty());
        let mut ignored = Vec::new();
        let pg = &mut self.postgres;
        if let Some(v) = lookup("pgAddress") {
            pg.address = v;
        }
        if let Some(v) = lookup("pgPort") {
            match v.parse() {
                Ok(port) => pg.port = port,
                Err(_) => ignored.push(("pgPort", v)),
            }
        }
        if let Some(v) = lookup("pgUsername") {
            pg.username = v;
        }
        if let Some(v) = lookup("pgPassword") {
            pg.password = v;
        }
        if let Some(v) = lookup("pgDbName") {
            pg.db_name = v;
        }
        if let Some(v) = lookup("pgConnectionString") {
            pg.connection_string = v;
        }
        ignored
    }

    fn write_to(&self, dir: &Path, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        fs::create_dir_all(dir).map_err(io_err)?;
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(io_err)
    }
}
