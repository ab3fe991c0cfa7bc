//! Engine configuration.
//!
//! Loaded from TOML, then overridden from the environment:
//!
//! ```toml
//! mode = "hybrid"
//! rules = "rules.toml"          # optional; built-in table otherwise
//!
//! [remote]
//! base_url = "http://hos.internal"
//! api_key = "..."
//! timeout_ms = 1500
//! retries = 1
//!
//! [worlds]
//! enabled = ["marketplace"]
//! disabled = ["messaging", "social"]
//!
//! [worlds.subjects]
//! reservation = "marketplace"
//! ```
//!
//! | variable                          | overrides           |
//! |-----------------------------------|---------------------|
//! | `CONTRACTGATE_MODE`               | `mode`              |
//! | `CONTRACTGATE_REMOTE_BASE_URL`    | `remote.base_url`   |
//! | `CONTRACTGATE_REMOTE_API_KEY`     | `remote.api_key`    |
//! | `CONTRACTGATE_REMOTE_TIMEOUT_MS`  | `remote.timeout_ms` |
//! | `CONTRACTGATE_REMOTE_RETRIES`     | `remote.retries`    |

use std::path::{Path, PathBuf};

use contractgate_core::{AuthorityMode, RuleError, RuleTable, WorldRegistry};
use serde::{Deserialize, Serialize};

use crate::remote::RemoteConfig;

pub const ENV_MODE: &str = "CONTRACTGATE_MODE";
pub const ENV_REMOTE_BASE_URL: &str = "CONTRACTGATE_REMOTE_BASE_URL";
pub const ENV_REMOTE_API_KEY: &str = "CONTRACTGATE_REMOTE_API_KEY";
pub const ENV_REMOTE_TIMEOUT_MS: &str = "CONTRACTGATE_REMOTE_TIMEOUT_MS";
pub const ENV_REMOTE_RETRIES: &str = "CONTRACTGATE_REMOTE_RETRIES";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid rule table: {0}")]
    Rules(#[from] RuleError),

    #[error("invalid value '{value}' for {var}: {message}")]
    InvalidEnv {
        var: String,
        value: String,
        message: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mode: AuthorityMode,
    /// Rule table file. Relative paths are resolved against the
    /// configuration file's directory by [`EngineConfig::load`].
    pub rules: Option<PathBuf>,
    pub remote: RemoteConfig,
    pub worlds: WorldRegistry,
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Read a configuration file. Environment overrides are not applied.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        if let (Some(rules), Some(dir)) = (config.rules.as_ref(), path.parent()) {
            if rules.is_relative() {
                config.rules = Some(dir.join(rules));
            }
        }
        Ok(config)
    }

    /// File (when given) or defaults, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => EngineConfig::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from `lookup` (variable name -> value). Empty values
    /// are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(value) = get(ENV_MODE) {
            self.mode = value.parse().map_err(|e: contractgate_core::mode::ParseModeError| {
                ConfigError::InvalidEnv {
                    var: ENV_MODE.to_string(),
                    value: value.clone(),
                    message: e.to_string(),
                }
            })?;
        }
        if let Some(value) = get(ENV_REMOTE_BASE_URL) {
            self.remote.base_url = value;
        }
        if let Some(value) = get(ENV_REMOTE_API_KEY) {
            self.remote.api_key = Some(value);
        }
        if let Some(value) = get(ENV_REMOTE_TIMEOUT_MS) {
            self.remote.timeout_ms = parse_number(ENV_REMOTE_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = get(ENV_REMOTE_RETRIES) {
            self.remote.retries = parse_number(ENV_REMOTE_RETRIES, &value)?;
        }
        Ok(())
    }

    /// The configured rule table, or the built-in one.
    pub fn rule_table(&self) -> Result<RuleTable, ConfigError> {
        match &self.rules {
            Some(path) => Ok(RuleTable::from_toml_file(path)?),
            None => Ok(RuleTable::builtin()),
        }
    }
}

fn parse_number<T>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidEnv {
            var: var.to_string(),
            value: value.to_string(),
            message: e.to_string(),
        })
}
