use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::plan_cache::DEFAULT_PLAN_CACHE_CAPACITY;
use crate::privilege::UserIdentity;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "SLUICE_CONFIG";

/// Session defaults loaded from TOML.
///
/// ```toml
/// [planner]
/// enable_cascades_planner = false
/// enable_plan_cache = true
/// plan_cache_capacity = 100
///
/// [session]
/// default_database = "shop"
/// user = "app"
/// host = "10.0.0.%"
///
/// [logging]
/// level = "sluice=debug"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Planner switches.
    #[serde(default)]
    pub planner: PlannerSection,
    /// Connection defaults.
    #[serde(default)]
    pub session: SessionSection,
    /// Log filter.
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(skip)]
    path: Option<PathBuf>,
}

/// `[planner]`
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlannerSection {
    /// Initial value of `enable_cascades_planner`.
    pub enable_cascades_planner: bool,
    /// Initial value of `enable_plan_cache`.
    pub enable_plan_cache: bool,
    /// Plans kept per session; zero disables the cache.
    pub plan_cache_capacity: usize,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            enable_cascades_planner: false,
            enable_plan_cache: true,
            plan_cache_capacity: DEFAULT_PLAN_CACHE_CAPACITY,
        }
    }
}

/// `[session]`
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSection {
    /// Database selected when the session opens.
    pub default_database: Option<String>,
    /// User name; `root` when absent.
    pub user: Option<String>,
    /// Client host; `%` when absent.
    pub host: Option<String>,
}

/// `[logging]`
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// `EnvFilter` directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

impl SessionConfig {
    /// Loads the config from `explicit`, then `$SLUICE_CONFIG`, then the
    /// per-user config directory. A missing file yields the defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .or_else(default_config_path);
        let mut config = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            _ => SessionConfig::default(),
        };
        config.path = path;
        config.validate()?;
        Ok(config)
    }

    /// Parses a config from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig =
            toml::from_str(contents).map_err(|source| ConfigError::ParseStr { source })?;
        config.validate()?;
        Ok(config)
    }

    /// Path the config was looked up at.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Identity sessions created from this config run as.
    pub fn user_identity(&self) -> UserIdentity {
        let defaults = UserIdentity::default();
        UserIdentity::new(
            self.session.user.clone().unwrap_or(defaults.user),
            self.session.host.clone().unwrap_or(defaults.host),
        )
    }

    /// Renders the config back to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|source| ConfigError::Serialize { source })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "logging.level",
                reason: "must not be empty",
            });
        }
        if matches!(self.session.user.as_deref(), Some("")) {
            return Err(ConfigError::Invalid {
                key: "session.user",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<SessionConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Errors raised while loading a [`SessionConfig`].
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to parse config: {source}")]
    ParseStr { source: toml::de::Error },
    #[error("failed to serialize config: {source}")]
    Serialize { source: toml::ser::Error },
    #[error("config key {key} {reason}")]
    Invalid {
        key: &'static str,
        reason: &'static str,
    },
}

/// `<config dir>/sluice/sluice.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("sluice").join("sluice.toml"))
}
