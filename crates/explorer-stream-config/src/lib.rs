//! Configuration for explorer event-stream clients.
//!
//! Layers built-in defaults, a TOML file, and `EXPLORER_STREAM_*`
//! environment variables, then validates the result and turns it into an
//! [`explorer_stream::StreamConfig`]. Option names are accepted in
//! snake_case or in the camelCase spelling the desktop app uses
//! (`autoReconnect`, `eventDebounceMs`, ...).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use explorer_stream::{MAX_WAIT, StreamConfig};

/// Prefix of environment variables that override `[stream]` keys.
pub const ENV_PREFIX: &str = "EXPLORER_STREAM_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("unknown profile '{profile}'")]
    UnknownProfile { profile: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn too_long(field: &str, ms: u64) -> Option<ConfigError> {
    (u128::from(ms) > MAX_WAIT.as_millis()).then(|| {
        invalid(
            field,
            format!("{ms} exceeds the maximum of {}ms", MAX_WAIT.as_millis()),
        )
    })
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named explicitly.
    #[serde(default, alias = "defaultProfile")]
    pub default_profile: Option<String>,

    /// Stream behaviour shared by every profile.
    #[serde(default)]
    pub stream: StreamSettings,

    /// Named servers.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

/// Stream options. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamSettings {
    #[serde(alias = "baseUrl")]
    pub base_url: String,

    #[serde(alias = "eventsPath")]
    pub events_path: String,

    #[serde(alias = "autoReconnect")]
    pub auto_reconnect: bool,

    #[serde(alias = "maxReconnectAttempts")]
    pub max_reconnect_attempts: u32,

    #[serde(alias = "initialReconnectDelay")]
    pub initial_reconnect_delay_ms: u64,

    #[serde(alias = "maxReconnectDelay")]
    pub max_reconnect_delay_ms: u64,

    #[serde(alias = "eventDebounceMs")]
    pub event_debounce_ms: u64,

    #[serde(alias = "connectTimeout")]
    pub connect_timeout_ms: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self::from(&StreamConfig::default())
    }
}

impl From<&StreamConfig> for StreamSettings {
    fn from(config: &StreamConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            events_path: config.events_path.clone(),
            auto_reconnect: config.auto_reconnect,
            max_reconnect_attempts: config.max_reconnect_attempts,
            initial_reconnect_delay_ms: millis(config.initial_reconnect_delay),
            max_reconnect_delay_ms: millis(config.max_reconnect_delay),
            event_debounce_ms: millis(config.event_debounce),
            connect_timeout_ms: millis(config.connect_timeout),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// A named server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Server base URL (e.g., "http://127.0.0.1:8080").
    #[serde(alias = "baseUrl")]
    pub base_url: String,

    /// Override of the stream path for this server.
    #[serde(default, alias = "eventsPath")]
    pub events_path: Option<String>,
}

// ── Validation & conversion ─────────────────────────────────────────

impl StreamSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(invalid("base_url", "must not be empty"));
        }
        let url = url::Url::parse(&self.base_url)
            .map_err(|e| invalid("base_url", format!("{e}: {}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(
                "base_url",
                format!("expected http or https, got '{}'", url.scheme()),
            ));
        }
        if self.initial_reconnect_delay_ms == 0 {
            return Err(invalid("initial_reconnect_delay_ms", "must be greater than 0"));
        }
        if self.initial_reconnect_delay_ms > self.max_reconnect_delay_ms {
            return Err(invalid(
                "max_reconnect_delay_ms",
                format!(
                    "{} is below initial_reconnect_delay_ms ({})",
                    self.max_reconnect_delay_ms, self.initial_reconnect_delay_ms
                ),
            ));
        }
        if self.event_debounce_ms == 0 {
            return Err(invalid("event_debounce_ms", "must be greater than 0"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(invalid("connect_timeout_ms", "must be greater than 0"));
        }
        for (field, ms) in [
            ("max_reconnect_delay_ms", self.max_reconnect_delay_ms),
            ("event_debounce_ms", self.event_debounce_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
        ] {
            if let Some(err) = too_long(field, ms) {
                return Err(err);
            }
        }
        Ok(())
    }

    /// Validate and convert into the client's runtime configuration.
    pub fn to_stream_config(&self) -> Result<StreamConfig, ConfigError> {
        self.validate()?;
        Ok(StreamConfig {
            base_url: self.base_url.clone(),
            events_path: self.events_path.clone(),
            auto_reconnect: self.auto_reconnect,
            max_reconnect_attempts: self.max_reconnect_attempts,
            initial_reconnect_delay: Duration::from_millis(self.initial_reconnect_delay_ms),
            max_reconnect_delay: Duration::from_millis(self.max_reconnect_delay_ms),
            event_debounce: Duration::from_millis(self.event_debounce_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        })
    }
}

impl Config {
    /// Stream settings with the selected profile's server applied.
    ///
    /// `profile` wins over `default_profile`. Naming a profile that does not
    /// exist is an error; a dangling `default_profile` is ignored.
    pub fn settings(&self, profile: Option<&str>) -> Result<StreamSettings, ConfigError> {
        let mut settings = self.stream.clone();

        let selected = match profile {
            Some(name) => Some((
                name,
                self.profiles
                    .get(name)
                    .ok_or_else(|| ConfigError::UnknownProfile {
                        profile: name.into(),
                    })?,
            )),
            None => self
                .default_profile
                .as_deref()
                .and_then(|name| self.profiles.get(name).map(|p| (name, p))),
        };

        if let Some((_, profile)) = selected {
            settings.base_url.clone_from(&profile.base_url);
            if let Some(ref path) = profile.events_path {
                settings.events_path.clone_from(path);
            }
        }
        Ok(settings)
    }

    /// Shorthand for [`settings`](Self::settings) + conversion.
    pub fn stream_config(&self, profile: Option<&str>) -> Result<StreamConfig, ConfigError> {
        self.settings(profile)?.to_stream_config()
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "explorer", "explorer-stream").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("explorer-stream");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// The provider stack: TOML file, then environment. A missing file is
/// treated as empty.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).map(|key| format!("stream.{key}").into()))
}

/// Load from the platform config path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file + environment.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    Ok(figment(path).extract()?)
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn defaults_convert_to_client_defaults() {
        let config = StreamSettings::default().to_stream_config().unwrap();
        assert_eq!(config, StreamConfig::default());
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_| {
            let dir = tempfile::tempdir().unwrap();
            let config = load_config_from(&dir.path().join("nope/config.toml")).unwrap();
            assert_eq!(config.stream, StreamSettings::default());
            assert!(config.profiles.is_empty());
            Ok(())
        });
    }

    #[test]
    fn reads_snake_case_keys() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [stream]
                base_url = "http://files.local:9000"
                max_reconnect_attempts = 4
                event_debounce_ms = 150
                "#,
            )?;
            let config = load_config_from(Path::new("config.toml")).unwrap();
            let stream = config.stream_config(None).unwrap();
            assert_eq!(stream.base_url, "http://files.local:9000");
            assert_eq!(stream.max_reconnect_attempts, 4);
            assert_eq!(stream.event_debounce, Duration::from_millis(150));
            assert!(stream.auto_reconnect);
            Ok(())
        });
    }

    #[test]
    fn reads_camel_case_option_names() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [stream]
                autoReconnect = false
                maxReconnectAttempts = 2
                initialReconnectDelay = 250
                maxReconnectDelay = 4000
                eventDebounceMs = 500
                connectTimeout = 3000
                "#,
            )?;
            let settings = load_config_from(Path::new("config.toml"))
                .unwrap()
                .settings(None)
                .unwrap();
            assert!(!settings.auto_reconnect);
            assert_eq!(settings.max_reconnect_attempts, 2);
            assert_eq!(settings.initial_reconnect_delay_ms, 250);
            assert_eq!(settings.max_reconnect_delay_ms, 4000);
            assert_eq!(settings.event_debounce_ms, 500);
            assert_eq!(settings.connect_timeout_ms, 3000);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [stream]
                base_url = "http://from-file:8080"
                auto_reconnect = true
                "#,
            )?;
            jail.set_env("EXPLORER_STREAM_BASE_URL", "http://from-env:9090");
            jail.set_env("EXPLORER_STREAM_AUTO_RECONNECT", "false");

            let config = load_config_from(Path::new("config.toml")).unwrap();
            assert_eq!(config.stream.base_url, "http://from-env:9090");
            assert!(!config.stream.auto_reconnect);
            Ok(())
        });
    }

    #[test]
    fn profile_selects_server() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                default_profile = "local"

                [profiles.local]
                base_url = "http://127.0.0.1:3000"

                [profiles.staging]
                baseUrl = "https://staging.example.com/app"
                eventsPath = "/events"
                "#,
            )?;
            let config = load_config_from(Path::new("config.toml")).unwrap();

            assert_eq!(config.settings(None).unwrap().base_url, "http://127.0.0.1:3000");

            let staging = config.settings(Some("staging")).unwrap();
            assert_eq!(staging.base_url, "https://staging.example.com/app");
            assert_eq!(staging.events_path, "/events");

            assert!(matches!(
                config.settings(Some("prod")),
                Err(ConfigError::UnknownProfile { .. })
            ));
            Ok(())
        });
    }

    #[test]
    fn dangling_default_profile_is_ignored() {
        let config = Config {
            default_profile: Some("gone".into()),
            ..Config::default()
        };
        assert_eq!(config.settings(None).unwrap(), StreamSettings::default());
    }

    #[test]
    fn rejects_inverted_delays() {
        let settings = StreamSettings {
            initial_reconnect_delay_ms: 5000,
            max_reconnect_delay_ms: 1000,
            ..StreamSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation { ref field, .. } if field == "max_reconnect_delay_ms"),
            "{err}"
        );
    }

    #[test]
    fn rejects_bad_urls_and_zero_windows() {
        for settings in [
            StreamSettings {
                base_url: String::new(),
                ..StreamSettings::default()
            },
            StreamSettings {
                base_url: "ws://host".into(),
                ..StreamSettings::default()
            },
            StreamSettings {
                event_debounce_ms: 0,
                ..StreamSettings::default()
            },
            StreamSettings {
                connect_timeout_ms: 0,
                ..StreamSettings::default()
            },
        ] {
            assert!(settings.validate().is_err(), "{settings:?}");
        }
    }

    #[test]
    fn rejects_windows_beyond_timer_range() {
        let settings = StreamSettings {
            event_debounce_ms: 100_000_000_000,
            ..StreamSettings::default()
        };
        let err = settings.to_stream_config().unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation { ref field, .. } if field == "event_debounce_ms"),
            "{err}"
        );

        let settings = StreamSettings {
            max_reconnect_delay_ms: u64::MAX,
            ..StreamSettings::default()
        };
        assert!(settings.validate().is_err());

        let at_limit = StreamSettings {
            event_debounce_ms: 86_400_000,
            ..StreamSettings::default()
        };
        assert!(at_limit.validate().is_ok());
    }
}
