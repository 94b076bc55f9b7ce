//! Client configuration.
//!
//! Settings come from three layers, first match wins:
//!
//! 1. a TOML file ([`ConfigFile`], default location from [`default_config_path`]),
//! 2. environment variables (`BASE_URL`, `REALM`, `REST_TIMEOUT`, ...),
//! 3. built-in defaults.
//!
//! Empty strings in the file count as unset. Environment values that fail to
//! parse are ignored.
//!
//! ```toml
//! base_url = "https://eda.example.com"
//! client_secret = "..."
//! tls_skip_verify = true
//! rest_timeout_secs = 30
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::secret::Secret;
use crate::transport::TransportSettings;

pub const ENV_BASE_URL: &str = "BASE_URL";
pub const ENV_KEYCLOAK_MASTER_REALM: &str = "KEYCLOAK_MASTER_REALM";
pub const ENV_KEYCLOAK_ADMIN_CLIENT_ID: &str = "KEYCLOAK_ADMIN_CLIENT_ID";
pub const ENV_KEYCLOAK_ADMIN_USERNAME: &str = "KEYCLOAK_ADMIN_USERNAME";
pub const ENV_KEYCLOAK_ADMIN_PASSWORD: &str = "KEYCLOAK_ADMIN_PASSWORD";
pub const ENV_REALM: &str = "REALM";
pub const ENV_CLIENT_ID: &str = "CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "CLIENT_SECRET";
pub const ENV_USERNAME: &str = "USERNAME";
pub const ENV_PASSWORD: &str = "PASSWORD";
pub const ENV_TLS_SKIP_VERIFY: &str = "TLS_SKIP_VERIFY";
pub const ENV_REST_DEBUG: &str = "REST_DEBUG";
pub const ENV_REST_TIMEOUT: &str = "REST_TIMEOUT";
pub const ENV_REST_RETRIES: &str = "REST_RETRIES";
pub const ENV_REST_RETRY_INTERVAL: &str = "REST_RETRY_INTERVAL";

const DEFAULT_MASTER_REALM: &str = "master";
const DEFAULT_ADMIN_CLIENT_ID: &str = "admin-cli";
const DEFAULT_REALM: &str = "eda";
const DEFAULT_CLIENT_ID: &str = "eda";
const DEFAULT_USERNAME: &str = "admin";
const DEFAULT_PASSWORD: &str = "admin";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config from {path:?}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("failed to parse config from {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("base URL is not configured (set base_url or BASE_URL)")]
    MissingBaseUrl,

    #[error("invalid base URL '{url}': {message}")]
    InvalidBaseUrl { url: String, message: String },

    #[error("invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Contents of a configuration file. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub base_url: Option<String>,
    pub keycloak_master_realm: Option<String>,
    pub keycloak_admin_client_id: Option<String>,
    pub keycloak_admin_username: Option<String>,
    pub keycloak_admin_password: Option<Secret>,
    pub realm: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<Secret>,
    pub username: Option<String>,
    pub password: Option<Secret>,
    pub tls_skip_verify: Option<bool>,
    pub rest_debug: Option<bool>,
    pub rest_timeout_secs: Option<u64>,
    pub rest_retries: Option<u32>,
    pub rest_retry_interval_secs: Option<u64>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Fully resolved client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    /// Realm of the identity-provider admin account.
    pub keycloak_master_realm: String,
    pub keycloak_admin_client_id: String,
    pub keycloak_admin_username: String,
    pub keycloak_admin_password: Secret,
    /// Realm of the API client.
    pub realm: String,
    pub client_id: String,
    /// Empty means: resolve through the identity provider.
    pub client_secret: Secret,
    pub username: String,
    pub password: Secret,
    pub tls_skip_verify: bool,
    pub rest_debug: bool,
    pub rest_timeout: Duration,
    pub rest_retries: u32,
    pub rest_retry_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            keycloak_master_realm: DEFAULT_MASTER_REALM.to_string(),
            keycloak_admin_client_id: DEFAULT_ADMIN_CLIENT_ID.to_string(),
            keycloak_admin_username: DEFAULT_USERNAME.to_string(),
            keycloak_admin_password: Secret::new(DEFAULT_PASSWORD),
            realm: DEFAULT_REALM.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            client_secret: Secret::default(),
            username: DEFAULT_USERNAME.to_string(),
            password: Secret::new(DEFAULT_PASSWORD),
            tls_skip_verify: false,
            rest_debug: false,
            rest_timeout: DEFAULT_TIMEOUT,
            rest_retries: DEFAULT_RETRIES,
            rest_retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl ClientConfig {
    /// Load from `path`, or from the default location when it exists, with
    /// process environment fallback.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => ConfigFile::load(path)?,
            None => {
                let path = default_config_path();
                if path.exists() {
                    ConfigFile::load(&path)?
                } else {
                    tracing::debug!(?path, "no config file, using environment and defaults");
                    ConfigFile::default()
                }
            }
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Merge a config file with an environment lookup and defaults.
    pub fn resolve<F>(file: ConfigFile, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.is_empty());
        let text = |value: Option<String>, key: &str, default: &str| {
            value
                .filter(|v| !v.is_empty())
                .or_else(|| env(key))
                .unwrap_or_else(|| default.to_string())
        };
        let secret = |value: Option<Secret>, key: &str, default: &str| {
            value
                .filter(|v| !v.is_empty())
                .or_else(|| env(key).map(Secret::from))
                .unwrap_or_else(|| Secret::new(default))
        };
        let flag = |value: Option<bool>, key: &str| {
            value
                .or_else(|| env(key).and_then(|v| parse_bool(&v)))
                .unwrap_or(false)
        };
        let duration = |value: Option<u64>, key: &str, default: Duration| {
            value
                .map(Duration::from_secs)
                .or_else(|| env(key).and_then(|v| parse_duration(&v)))
                .unwrap_or(default)
        };

        let config = Self {
            base_url: text(file.base_url, ENV_BASE_URL, ""),
            keycloak_master_realm: text(
                file.keycloak_master_realm,
                ENV_KEYCLOAK_MASTER_REALM,
                DEFAULT_MASTER_REALM,
            ),
            keycloak_admin_client_id: text(
                file.keycloak_admin_client_id,
                ENV_KEYCLOAK_ADMIN_CLIENT_ID,
                DEFAULT_ADMIN_CLIENT_ID,
            ),
            keycloak_admin_username: text(
                file.keycloak_admin_username,
                ENV_KEYCLOAK_ADMIN_USERNAME,
                DEFAULT_USERNAME,
            ),
            keycloak_admin_password: secret(
                file.keycloak_admin_password,
                ENV_KEYCLOAK_ADMIN_PASSWORD,
                DEFAULT_PASSWORD,
            ),
            realm: text(file.realm, ENV_REALM, DEFAULT_REALM),
            client_id: text(file.client_id, ENV_CLIENT_ID, DEFAULT_CLIENT_ID),
            client_secret: secret(file.client_secret, ENV_CLIENT_SECRET, ""),
            username: text(file.username, ENV_USERNAME, DEFAULT_USERNAME),
            password: secret(file.password, ENV_PASSWORD, DEFAULT_PASSWORD),
            tls_skip_verify: flag(file.tls_skip_verify, ENV_TLS_SKIP_VERIFY),
            rest_debug: flag(file.rest_debug, ENV_REST_DEBUG),
            rest_timeout: duration(file.rest_timeout_secs, ENV_REST_TIMEOUT, DEFAULT_TIMEOUT),
            rest_retries: file
                .rest_retries
                .or_else(|| env(ENV_REST_RETRIES).and_then(|v| v.parse().ok()))
                .unwrap_or(DEFAULT_RETRIES),
            rest_retry_interval: duration(
                file.rest_retry_interval_secs,
                ENV_REST_RETRY_INTERVAL,
                DEFAULT_RETRY_INTERVAL,
            ),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parsed_base_url()?;
        if self.rest_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "rest_timeout",
                message: "must be greater than zero".to_string(),
            });
        }
        for (field, value) in [
            ("realm", &self.realm),
            ("client_id", &self.client_id),
            ("keycloak_master_realm", &self.keycloak_master_realm),
            ("keycloak_admin_client_id", &self.keycloak_admin_client_id),
        ] {
            if value.contains('/') {
                return Err(ConfigError::Invalid {
                    field,
                    message: format!("'{value}' must not contain '/'"),
                });
            }
        }
        Ok(())
    }

    fn parsed_base_url(&self) -> Result<Url, ConfigError> {
        if self.base_url.is_empty() {
            return Err(ConfigError::MissingBaseUrl);
        }
        let url = Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            message: e.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
                message: "not a hierarchical URL".to_string(),
            });
        }
        Ok(url)
    }

    /// HTTP transport settings derived from this configuration.
    pub fn transport_settings(&self) -> Result<TransportSettings, ConfigError> {
        Ok(TransportSettings {
            base_url: self.parsed_base_url()?,
            timeout: self.rest_timeout,
            tls_skip_verify: self.tls_skip_verify,
            debug: self.rest_debug,
            retries: self.rest_retries,
            retry_interval: self.rest_retry_interval,
        })
    }
}

/// Default configuration file location.
pub fn default_config_path() -> PathBuf {
    ProjectDirs::from("com", "raibid-labs", "attrforge")
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("attrforge.toml"))
}

/// Boolean in the spellings accepted by `TLS_SKIP_VERIFY` and `REST_DEBUG`.
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Duration such as `15`, `15s`, `500ms`, `2m` or `1h`; bare numbers are seconds.
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (amount, unit) = value.split_at(split);
    let amount: u64 = amount.parse().ok()?;
    match unit {
        "" | "s" => Some(Duration::from_secs(amount)),
        "ms" => Some(Duration::from_millis(amount)),
        "m" => Some(Duration::from_secs(amount.checked_mul(60)?)),
        "h" => Some(Duration::from_secs(amount.checked_mul(3600)?)),
        _ => None,
    }
}
