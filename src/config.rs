//! Service configuration.
//!
//! One TOML file per environment, `config/<environment>.toml`, where the
//! environment comes from `API_ENVIRONMENT`. A handful of secrets can be
//! overridden from the environment: `API_` prefix, `__` between nested keys.
//!
//! Validation collects every violation rather than stopping at the first.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::middleware::{BasicAuth, Cors};
use crate::params::ParamConfig;

pub const ENVIRONMENT_KEY: &str = "API_ENVIRONMENT";
pub const CONFIG_PATH_KEY: &str = "API_CONFIG_PATH";

pub const ENVIRONMENT_DEVELOPMENT: &str = "development";
pub const ENVIRONMENT_STAGING: &str = "staging";
pub const ENVIRONMENT_PRODUCTION: &str = "production";
pub const ENVIRONMENTS: [&str; 3] = [ENVIRONMENT_DEVELOPMENT, ENVIRONMENT_STAGING, ENVIRONMENT_PRODUCTION];

pub const SERVICE_MODE_API: &str = "api";

/// Directory searched for `<environment>.toml` when `API_CONFIG_PATH` is unset.
const DEFAULT_CONFIG_DIR: &str = "config";

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment var: API_ENVIRONMENT")]
    MissingEnvironment,

    #[error("invalid environment var: API_ENVIRONMENT value: {0}")]
    InvalidEnvironment(String),

    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("override {key}: {message}")]
    Override { key: &'static str, message: String },

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<Violation>),
}

/// One failed configuration rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join(violations: &[Violation]) -> String {
    violations.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

// ── Schema ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub environment: String,
    pub server_port: String,
    #[serde(default = "default_service_mode")]
    pub service_mode: String,
    pub unauthorized_error: String,
    pub basic_auth: BasicAuth,
    #[serde(default)]
    pub cors: Cors,
    #[serde(default)]
    pub skip_logging_paths: Vec<String>,
    #[serde(default)]
    pub params: ParamConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub email: EmailConfig,
}

fn default_service_mode() -> String {
    SERVICE_MODE_API.to_owned()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true, ttl_secs: 60 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Capacity of the background work queue.
    pub queue_capacity: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { queue_capacity: 64 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub from_name: String,
    pub from_username: String,
    pub from_domain: String,
}

impl EmailConfig {
    /// `username@domain`.
    pub fn from_address(&self) -> String {
        format!("{}@{}", self.from_username, self.from_domain)
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Loads the configuration for the current process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Like [`load`](Self::load), reading variables through `lookup`.
    pub fn load_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup(ENVIRONMENT_KEY) {
            Some(env) if env.is_empty() => return Err(ConfigError::MissingEnvironment),
            Some(env) => env,
            None => return Err(ConfigError::MissingEnvironment),
        };
        if !ENVIRONMENTS.contains(&environment.as_str()) {
            return Err(ConfigError::InvalidEnvironment(environment));
        }

        let dir = lookup(CONFIG_PATH_KEY).unwrap_or_else(|| DEFAULT_CONFIG_DIR.to_owned());
        let path = Path::new(&dir).join(format!("{environment}.toml"));
        let content = std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::Io { path: path.clone(), source })?;

        let config = Self::from_toml(&content, lookup)?;
        info!(environment = %config.environment, path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parses `content`, applies overrides from `lookup` and validates.
    pub fn from_toml<F>(content: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: AppConfig = toml::from_str(content)?;
        config.apply_overrides(lookup)?;
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("API_SERVER_PORT") {
            self.server_port = port;
        }
        if let Some(user) = lookup("API_BASIC_AUTH__USER") {
            self.basic_auth.user = user;
        }
        if let Some(password) = lookup("API_BASIC_AUTH__PASSWORD") {
            self.basic_auth.password = password;
        }
        if let Some(error) = lookup("API_UNAUTHORIZED_ERROR") {
            self.unauthorized_error = error;
        }
        if let Some(enabled) = lookup("API_CACHE__ENABLED") {
            self.cache.enabled = enabled.parse().map_err(|e: std::str::ParseBoolError| {
                ConfigError::Override { key: "API_CACHE__ENABLED", message: e.to_string() }
            })?;
        }
        Ok(())
    }

    /// Checks every rule and returns all violations.
    pub fn validate(&self) -> Result<(), Vec<Violation>> {
        let mut violations = Vec::new();
        let mut fail = |field: &'static str, message: &str| {
            violations.push(Violation { field, message: message.to_owned() });
        };

        if !ENVIRONMENTS.contains(&self.environment.as_str()) {
            fail("environment", "must be a valid value");
        }

        if self.server_port.is_empty() {
            fail("server_port", "cannot be blank");
        } else if !self.server_port.bytes().all(|b| b.is_ascii_digit()) {
            fail("server_port", "must contain digits only");
        } else if !(2..=6).contains(&self.server_port.len()) {
            fail("server_port", "the length must be between 2 and 6");
        }

        if self.service_mode != SERVICE_MODE_API {
            fail("service_mode", "must be a valid value");
        }

        if self.unauthorized_error.chars().count() < 2 {
            fail("unauthorized_error", "the length must be no less than 2");
        }

        let user = &self.basic_auth.user;
        if !user.chars().all(|c| c.is_ascii_alphanumeric()) {
            fail("basic_auth.user", "must contain English letters and digits only");
        }
        if !(3..=100).contains(&user.chars().count()) {
            fail("basic_auth.user", "the length must be between 3 and 100");
        }
        if !(3..=100).contains(&self.basic_auth.password.chars().count()) {
            fail("basic_auth.password", "the length must be between 3 and 100");
        }

        for (field, value) in [
            ("email.from_domain", &self.email.from_domain),
            ("email.from_name", &self.email.from_name),
            ("email.from_username", &self.email.from_username),
        ] {
            if !(1..=100).contains(&value.chars().count()) {
                fail(field, "the length must be between 1 and 100");
            }
        }

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// The port as a number. Validation guarantees it parses.
    pub fn port(&self) -> u16 {
        self.server_port.parse().unwrap_or(3000)
    }
}
