use crate::worker::WorkerStatus;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const MIN_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);
const MIN_EXEC_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("poll_interval must be between 5s and 5m, got {0:?}")]
    PollIntervalRange(Duration),
    #[error("exec_timeout must be between 2s and poll_interval ({poll_interval:?}), got {exec_timeout:?}")]
    ExecTimeoutRange {
        exec_timeout: Duration,
        poll_interval: Duration,
    },
    #[error("bell_on_states: {0}")]
    BellState(String),
}

/// Full configuration for slua. Loaded from YAML; every field has a default
/// and validation failures fall back to [`Config::default`] at the caller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detection: DetectionConfig,
    pub notifications: NotificationConfig,
}

/// Controls how workers are probed for state.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    #[serde(deserialize_with = "deserialize_duration")]
    pub poll_interval: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub exec_timeout: Duration,
    pub prompt_patterns: Vec<String>,
}

/// Controls how the operator is notified of state changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub terminal_bell: bool,
    #[serde(deserialize_with = "deserialize_duration")]
    pub bell_debounce: Duration,
    pub bell_on_states: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            exec_timeout: Duration::from_secs(5),
            prompt_patterns: [
                "Y/n",
                "y/N",
                r"\? ",
                "> $",
                "Permission",
                "Allow",
                "Deny",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            terminal_bell: true,
            bell_debounce: Duration::from_secs(30),
            bell_on_states: vec!["WAITING".to_string(), "ERROR".to_string()],
        }
    }
}

impl Config {
    /// Reads the config file from the standard location. A missing file is
    /// not an error; parse or validation failures are returned so the caller
    /// can warn and fall back to defaults.
    pub fn load() -> Result<Config, ConfigError> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Config::default());
            }
            Err(err) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        };

        let mut config: Config = serde_yaml::from_str(&data).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            source: err,
        })?;

        config.validate()?;
        config.detection.prompt_patterns = filter_valid_patterns(config.detection.prompt_patterns);
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let poll_interval = self.detection.poll_interval;
        if poll_interval < MIN_POLL_INTERVAL || poll_interval > MAX_POLL_INTERVAL {
            return Err(ConfigError::PollIntervalRange(poll_interval));
        }

        let exec_timeout = self.detection.exec_timeout;
        if exec_timeout < MIN_EXEC_TIMEOUT || exec_timeout > poll_interval {
            return Err(ConfigError::ExecTimeoutRange {
                exec_timeout,
                poll_interval,
            });
        }

        for state in &self.notifications.bell_on_states {
            state
                .parse::<WorkerStatus>()
                .map_err(ConfigError::BellState)?;
        }
        Ok(())
    }

    /// Bell trigger states as parsed values. Only valid after a successful
    /// [`Config::load`], which rejects unknown names.
    pub fn bell_states(&self) -> Vec<WorkerStatus> {
        self.notifications
            .bell_on_states
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect()
    }
}

/// Drops prompt patterns that do not compile as regular expressions. The
/// probe builder applies its own shell-safety allowlist on top.
fn filter_valid_patterns(patterns: Vec<String>) -> Vec<String> {
    patterns
        .into_iter()
        .filter(|p| match Regex::new(p) {
            Ok(_) => true,
            Err(err) => {
                debug!(pattern = %p, "dropping invalid prompt pattern: {err}");
                false
            }
        })
        .collect()
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(&s).map_err(serde::de::Error::custom)
}

/// `$XDG_CONFIG_HOME/slua/config.yml`, falling back to
/// `~/.config/slua/config.yml`.
fn config_path() -> PathBuf {
    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir().unwrap_or_default().join(".config"),
    };
    base.join("slua").join("config.yml")
}
