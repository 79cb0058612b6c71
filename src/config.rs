//! Configuration for the input gate.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How long the host has to answer a decision request
    #[serde(with = "millis_serde")]
    pub decision_timeout: Duration,

    /// Period of the window-query timer
    #[serde(with = "secs_serde")]
    pub window_poll_interval: Duration,

    /// How often the frontmost application is checked for changes
    #[serde(with = "millis_serde")]
    pub app_poll_interval: Duration,

    /// Which events wait for a host verdict
    pub blocking: BlockingPolicy,

    /// Which input sources to capture
    pub sources: SourceConfig,

    /// Follow each APPLICATION line with the new active window
    pub window_info_on_activation: bool,

    /// How many times a tap disabled by the OS is re-enabled before giving up
    pub max_tap_reenables: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            decision_timeout: Duration::from_millis(30),
            window_poll_interval: Duration::from_secs(10),
            app_poll_interval: Duration::from_millis(500),
            blocking: BlockingPolicy::default(),
            sources: SourceConfig::default(),
            window_info_on_activation: true,
            max_tap_reenables: 3,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("input-gate")
            .join("config.json")
    }

    /// Reject values that would stall input or spin the timers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.decision_timeout.is_zero() || self.decision_timeout > Duration::from_secs(1) {
            return Err(ConfigError::Invalid(format!(
                "decision_timeout must be between 1ms and 1000ms, got {}ms",
                self.decision_timeout.as_millis()
            )));
        }
        if self.window_poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "window_poll_interval must be non-zero".into(),
            ));
        }
        if self.app_poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "app_poll_interval must be non-zero".into(),
            ));
        }
        if !self.sources.any_enabled() {
            return Err(ConfigError::Invalid(
                "at least one source must be enabled (keyboard or mouse)".into(),
            ));
        }
        Ok(())
    }
}

/// Which event kinds wait for a host verdict before returning to the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingPolicy {
    pub pointer_buttons: bool,
    pub keys: bool,
}

impl Default for BlockingPolicy {
    fn default() -> Self {
        Self {
            pointer_buttons: true,
            keys: false,
        }
    }
}

/// Configuration for which input sources to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub keyboard: bool,
    pub mouse: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            keyboard: true,
            mouse: true,
        }
    }
}

impl SourceConfig {
    /// Parse source configuration from a comma-separated string.
    pub fn from_csv(s: &str) -> Self {
        let sources: Vec<String> = s.split(',').map(|s| s.trim().to_lowercase()).collect();

        Self {
            keyboard: sources.iter().any(|s| s == "keyboard" || s == "all"),
            mouse: sources.iter().any(|s| s == "mouse" || s == "all"),
        }
    }

    /// Check if at least one source is enabled.
    pub fn any_enabled(&self) -> bool {
        self.keyboard || self.mouse
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole seconds.
mod secs_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde support for Duration as milliseconds.
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_config_parsing() {
        let config = SourceConfig::from_csv("keyboard,mouse");
        assert!(config.keyboard);
        assert!(config.mouse);

        let config = SourceConfig::from_csv("keyboard");
        assert!(config.keyboard);
        assert!(!config.mouse);

        let config = SourceConfig::from_csv("all");
        assert!(config.keyboard);
        assert!(config.mouse);
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.decision_timeout, Duration::from_millis(30));
        assert_eq!(config.window_poll_interval, Duration::from_secs(10));
        assert!(config.blocking.pointer_buttons);
        assert!(!config.blocking.keys);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_uses_plain_numbers() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["decision_timeout"], 30);
        assert_eq!(json["window_poll_interval"], 10);
        assert_eq!(json["app_poll_interval"], 500);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"decision_timeout": 50}"#).unwrap();
        assert_eq!(config.decision_timeout, Duration::from_millis(50));
        assert_eq!(config.max_tap_reenables, 3);
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = Config {
            decision_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
