//! Service Settings
//!
//! Layered as: built-in defaults, then an optional `alarm-api.{toml,yaml,json}`
//! file (or the file named by `ALARM_API_CONFIG`), then `ALARM_*`
//! environment variables with `__` between nested keys, e.g.
//! `ALARM_ALARM__USER_ALARM_QUOTA=10`.

use alarm_lifecycle::LifecycleConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use notifier::MqttConfig;
use serde::{Deserialize, Serialize};

use crate::policy::PolicyConfig;
use crate::rate_limit::RateLimitConfig;

/// Environment variable naming an explicit settings file
pub const CONFIG_PATH_VAR: &str = "ALARM_API_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: String,
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8042".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite URL such as `sqlite://alarms.db`; in-memory store when unset
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    #[default]
    Log,
    Mqtt,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierSettings {
    pub kind: NotifierKind,
    pub mqtt: MqttConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub alarm: LifecycleConfig,
    pub storage: StorageSettings,
    pub notifier: NotifierSettings,
    pub policy: PolicyConfig,
    pub rate_limit: RateLimitConfig,
}

impl Settings {
    /// Load settings from the standard locations and the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_VAR).ok();
        Self::load_from(path.as_deref())
    }

    /// Load settings, reading `path` instead of the default file name
    pub fn load_from(path: Option<&str>) -> Result<Self> {
        let file = match path {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name("alarm-api").required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix("ALARM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(settings)
    }
}
