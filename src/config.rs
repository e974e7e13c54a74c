//! Service configuration.
//!
//! Values come from an optional TOML file (`PORTAL_CONFIG`, default `portal.toml`) and are then
//! overridden by environment variables. A missing file is not an error, every field has a default.

use std::env::var;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "portal.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Could not parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub application_name: String,
    /// Origins allowed by CORS. `"*"` allows any origin.
    pub cors_origins: Vec<String>,
    pub log_level: String,
    /// TLS is enabled only when both the certificate and the key are set
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            application_name: "Assignment Management System".into(),
            cors_origins: vec![
                "http://localhost:5173".into(),
                "http://localhost:5174".into(),
            ],
            log_level: "info".into(),
            tls_cert: None,
            tls_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full connection string. Takes precedence over the individual parts below.
    pub url: Option<String>,
    pub user: String,
    pub password: String,
    pub host: String,
    pub name: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            user: "postgres".into(),
            password: String::new(),
            host: "localhost".into(),
            name: "portal".into(),
            max_connections: 10,
        }
    }
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!(
                "postgres://{}:{}@{}/{}",
                self.user, self.password, self.host, self.name
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub upload_dir: String,
    /// Maximum size of a single uploaded PDF, in bytes
    pub max_file_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: "./uploads".into(),
            max_file_size: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_ttl_hours: i64,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 24,
            google_client_id: None,
            google_client_secret: None,
        }
    }
}

impl Config {
    /// Loads the config file (if present) and applies environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let path = var("PORTAL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|key| var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Applies overrides from `lookup`, which maps an environment variable name to its value
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(user) = lookup("PSQL_NAME") {
            self.database.user = user;
        }
        if let Some(pass) = lookup("PSQL_PASS") {
            self.database.password = pass;
        }
        if let Some(host) = lookup("PSQL_HOST") {
            self.database.host = host;
        }
        if let Some(name) = lookup("PSQL_DB") {
            self.database.name = name;
        }
        if let Some(host) = lookup("PORTAL_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORTAL_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORTAL_PORT",
                value: port,
            })?;
        }
        if let Some(dir) = lookup("UPLOAD_DIR") {
            self.storage.upload_dir = dir;
        }
        if let Some(id) = lookup("GOOGLE_CLIENT_ID") {
            self.auth.google_client_id = Some(id);
        }
        if let Some(secret) = lookup("GOOGLE_CLIENT_SECRET") {
            self.auth.google_client_secret = Some(secret);
        }
        if let Some(cert) = lookup("TLS_CERT") {
            self.server.tls_cert = Some(cert);
        }
        if let Some(key) = lookup("TLS_KEY") {
            self.server.tls_key = Some(key);
        }

        Ok(())
    }
}
