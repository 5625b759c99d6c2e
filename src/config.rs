//! # Configuration Management
//!
//! Centralized configuration for a live timing client.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides (`LIVE_TIMING_*`)
//!
//! ## Defaults
//! The stream defaults reproduce the reference client: poll every 100ms and
//! send a keep-alive byte after 10 empty polls, i.e. about one second of
//! silence.

use crate::core::packet::MAX_FRAME_LEN;
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default live timing host
pub const DEFAULT_HOST: &str = "live-timing.formula1.com";

/// Default live timing port
pub const DEFAULT_PORT: u16 = 4321;

/// Byte written to keep an idle connection alive
pub const PING_BYTE: u8 = 0x10;

/// Default number of packets a session keeps for later decryption
pub const DEFAULT_MAX_CACHED_PACKETS: usize = 65_536;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TimingConfig {
    /// Stream connection configuration
    #[serde(default)]
    pub stream: StreamConfig,

    /// Per-connection session configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TimingConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults overridden by `LIVE_TIMING_*` environment variables.
    ///
    /// Unparseable numeric values are reported rather than ignored.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("LIVE_TIMING_HOST") {
            config.stream.host = host;
        }

        if let Some(port) = env_number::<u16>("LIVE_TIMING_PORT")? {
            config.stream.port = port;
        }

        if let Some(millis) = env_number::<u64>("LIVE_TIMING_POLL_INTERVAL_MS")? {
            config.stream.poll_interval = Duration::from_millis(millis);
        }

        if let Some(polls) = env_number::<u32>("LIVE_TIMING_IDLE_POLLS")? {
            config.stream.idle_polls_before_ping = polls;
        }

        if let Some(limit) = env_number::<usize>("LIVE_TIMING_MAX_CACHED_PACKETS")? {
            config.session.max_cached_packets = limit;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = self.stream.validate();
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ProtocolError::ConfigError(format!("Invalid value for {name}: '{raw}'"))),
        Err(_) => Ok(None),
    }
}

/// Connection and polling parameters for the stream driver
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Timing server host name
    pub host: String,

    /// Timing server port
    pub port: u16,

    /// Longest wait for data in a single poll
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,

    /// Empty polls tolerated before a keep-alive byte is sent
    pub idle_polls_before_ping: u32,

    /// Keep-alive byte
    pub ping_byte: u8,

    /// Size of the socket read buffer
    pub read_buffer_size: usize,

    /// Timeout for each connect attempt
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: String::from(DEFAULT_HOST),
            port: DEFAULT_PORT,
            poll_interval: Duration::from_millis(100),
            idle_polls_before_ping: 10,
            ping_byte: PING_BYTE,
            read_buffer_size: 512,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl StreamConfig {
    /// `host:port` form accepted by the resolver
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate stream configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.trim().is_empty() {
            errors.push("Stream host cannot be empty".to_string());
        }

        if self.port == 0 {
            errors.push("Stream port must be greater than 0".to_string());
        }

        if self.poll_interval.as_millis() < 10 {
            errors.push("Poll interval too short (minimum: 10ms)".to_string());
        } else if self.poll_interval > Duration::from_secs(10) {
            errors.push("Poll interval too long (maximum: 10s)".to_string());
        }

        if self.idle_polls_before_ping == 0 {
            errors.push("Idle polls before ping must be greater than 0".to_string());
        }

        if self.read_buffer_size < MAX_FRAME_LEN {
            errors.push(format!(
                "Read buffer too small: {} bytes (minimum: {MAX_FRAME_LEN})",
                self.read_buffer_size
            ));
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        }

        errors
    }
}

/// Session configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Packets kept for decryption once the key is known; 0 disables the cache.
    /// Packets arriving after the cache is full are forwarded but not kept.
    pub max_cached_packets: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_cached_packets: DEFAULT_MAX_CACHED_PACKETS,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("live-timing"),
            log_level: Level::INFO,
            log_to_console: true,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
