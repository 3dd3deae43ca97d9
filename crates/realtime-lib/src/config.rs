// ============================
// realtime-lib/src/config.rs
// ============================
//! Configuration management.
use crate::channel::ChannelConfig;
use crate::error::RealtimeError;
use crate::reconnect::{Backoff, ReconnectPolicy};
use crate::store::GYM_ID_KEY;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment overrides, e.g. `GYMPULSE_RECONNECT__INTERVAL_MS`
pub const ENV_PREFIX: &str = "GYMPULSE_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// REST base URL the socket host is derived from
    pub api_base_url: String,
    /// Connect with `wss` rather than `ws`
    pub secure: bool,
    /// Heartbeat cadence in milliseconds
    pub keepalive_interval_ms: u64,
    /// Reconnection pacing
    pub reconnect: ReconnectSettings,
    /// Location of the persisted key-value file
    pub store_path: PathBuf,
    /// Key the gym identifier is stored under
    pub gym_id_key: String,
    /// Log level
    pub log_level: String,
}

/// Reconnection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    /// Base delay between attempts
    pub interval_ms: u64,
    /// Attempt cap; 0 retries forever
    pub max_attempts: u32,
    /// Double the delay on each attempt
    pub exponential: bool,
    /// Ceiling for exponential backoff
    pub max_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.gympulse.app".to_string(),
            secure: true,
            keepalive_interval_ms: 20_000,
            reconnect: ReconnectSettings::default(),
            store_path: PathBuf::from("data/session.json"),
            gym_id_key: GYM_ID_KEY.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            interval_ms: 1500,
            max_attempts: 999,
            exponential: false,
            max_interval_ms: 30_000,
        }
    }
}

impl Settings {
    /// Load settings: defaults, then `config.{toml,yaml,json}` in the working
    /// directory, then `GYMPULSE_*` environment variables.
    pub fn load() -> Result<Self, RealtimeError> {
        let settings: Settings = Self::base_figment()
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from an explicit file; environment variables still win.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, RealtimeError> {
        let path = path.as_ref();
        let figment = Figment::from(Serialized::defaults(Settings::default()));
        let figment = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
            Some("json") => figment.merge(Json::file(path)),
            _ => figment.merge(Toml::file(path)),
        };
        let settings: Settings = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    fn base_figment() -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"))
            .merge(Yaml::file("config.yaml"))
            .merge(Json::file("config.json"))
    }

    /// Reject settings the channel cannot run with
    pub fn validate(&self) -> Result<(), RealtimeError> {
        if self.api_base_url.trim().is_empty() {
            return Err(RealtimeError::Config("api_base_url must not be empty".to_string()));
        }
        if self.keepalive_interval_ms == 0 {
            return Err(RealtimeError::Config(
                "keepalive_interval_ms must be positive".to_string(),
            ));
        }
        if self.reconnect.interval_ms == 0 {
            return Err(RealtimeError::Config(
                "reconnect.interval_ms must be positive".to_string(),
            ));
        }
        if self.reconnect.exponential && self.reconnect.max_interval_ms < self.reconnect.interval_ms {
            return Err(RealtimeError::Config(
                "reconnect.max_interval_ms must be at least reconnect.interval_ms".to_string(),
            ));
        }
        if self.gym_id_key.trim().is_empty() {
            return Err(RealtimeError::Config("gym_id_key must not be empty".to_string()));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(RealtimeError::Config(format!(
                "unknown log level: {}",
                self.log_level
            )));
        }
        Ok(())
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let interval = Duration::from_millis(self.reconnect.interval_ms);
        let max_attempts = match self.reconnect.max_attempts {
            0 => None,
            n => Some(n),
        };
        let backoff = if self.reconnect.exponential {
            Backoff::Exponential {
                max_delay: Duration::from_millis(self.reconnect.max_interval_ms),
            }
        } else {
            Backoff::Fixed
        };
        ReconnectPolicy {
            interval,
            max_attempts,
            backoff,
        }
    }

    /// Connection settings for channels built from this configuration
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            api_base_url: self.api_base_url.clone(),
            secure: self.secure,
            keepalive_interval: Duration::from_millis(self.keepalive_interval_ms),
            reconnect: self.reconnect_policy(),
        }
    }
}

#[cfg(test)]
mod config_tests;
