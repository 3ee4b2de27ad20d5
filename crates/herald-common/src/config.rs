//! Configuration for Herald

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Gateway credentials and pacing settings
    #[serde(default)]
    pub dispatch: DispatchSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Gateway credentials plus pacing configuration for one campaign.
///
/// Loaded once per campaign and immutable for the campaign's duration.
/// Configured delays can only lengthen the gateway's minimum inter-message
/// interval, never shorten it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Base URL of the messaging gateway
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Gateway API key
    #[serde(default)]
    pub api_key: String,

    /// Base delay between consecutive messages in milliseconds
    #[serde(default = "default_delay_between_messages")]
    pub delay_between_messages_ms: u64,

    /// Upper bound added to the base delay at random; 0 derives a bounded
    /// jitter automatically
    #[serde(default)]
    pub jitter_ms: u64,

    /// Number of messages sent before a longer cool-down pause
    #[serde(default = "default_messages_before_break")]
    pub messages_before_break: u32,

    /// Duration of the cool-down pause in milliseconds
    #[serde(default = "default_break_duration")]
    pub break_duration_ms: u64,

    /// Country code used to normalize national phone numbers
    #[serde(default = "default_country_code")]
    pub default_country_code: String,

    /// Per-call HTTP timeout for gateway requests in milliseconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_ms: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            delay_between_messages_ms: default_delay_between_messages(),
            jitter_ms: 0,
            messages_before_break: default_messages_before_break(),
            break_duration_ms: default_break_duration(),
            default_country_code: default_country_code(),
            http_timeout_ms: default_http_timeout(),
        }
    }
}

fn default_api_url() -> String {
    "http://localhost:8866".to_string()
}

fn default_delay_between_messages() -> u64 {
    6000
}

fn default_messages_before_break() -> u32 {
    20
}

fn default_break_duration() -> u64 {
    30_000
}

fn default_country_code() -> String {
    "62".to_string()
}

fn default_http_timeout() -> u64 {
    15_000
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./herald.toml"),
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/herald/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let settings = DispatchSettings::default();
        assert_eq!(settings.delay_between_messages_ms, 6000);
        assert_eq!(settings.jitter_ms, 0);
        assert_eq!(settings.messages_before_break, 20);
        assert_eq!(settings.default_country_code, "62");
        assert_eq!(settings.http_timeout_ms, 15_000);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[dispatch]
api_url = "https://gateway.example.com"
api_key = "secret"
delay_between_messages_ms = 5200
jitter_ms = 800
messages_before_break = 2
break_duration_ms = 10000

[logging]
level = "debug"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.dispatch.api_url, "https://gateway.example.com");
        assert_eq!(config.dispatch.api_key, "secret");
        assert_eq!(config.dispatch.delay_between_messages_ms, 5200);
        assert_eq!(config.dispatch.messages_before_break, 2);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
[dispatch]
api_key = "secret"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.dispatch.delay_between_messages_ms, 6000);
        assert_eq!(config.dispatch.break_duration_ms, 30_000);
        assert_eq!(config.logging.level, "info");
    }
}
