//! Configuration for the exporter.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Serial link to the RAVEn stick.
    #[serde(default)]
    pub serial: SerialConfig,

    /// Prometheus endpoint settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial link configuration.
///
/// The RAVEn stick talks 115200 8N1; only the port and, for unusual
/// setups, the baud rate are configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial port the stick is attached to, e.g. `/dev/ttyUSB0` or `COM4`.
    #[serde(default)]
    pub port: String,

    /// Baud rate (default: 115200).
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    115_200
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_baud_rate(),
        }
    }
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:2112").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for the metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_listen() -> String {
    "0.0.0.0:2112".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Called after CLI overrides have been applied, so a port supplied
    /// only on the command line still passes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.port.is_empty() {
            return Err(ConfigError::Validation(
                "No serial port configured; set serial.port or pass --serial-port".to_string(),
            ));
        }

        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Validation("baud_rate must be > 0".to_string()));
        }

        if self
            .prometheus
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            )));
        }

        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = ExporterConfig::parse("{}").unwrap();

        assert_eq!(config.serial.port, "");
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.prometheus.listen, "0.0.0.0:2112");
        assert_eq!(config.prometheus.path, "/metrics");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            serial: {
                port: "/dev/ttyUSB0",
                baud_rate: 115200
            },
            prometheus: {
                listen: "127.0.0.1:9300",
                path: "/raven/metrics"
            },
            logging: {
                level: "debug"
            }
        }"#;

        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.prometheus.listen, "127.0.0.1:9300");
        assert_eq!(config.prometheus.path, "/raven/metrics");
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_missing_port() {
        let config = ExporterConfig::parse("{}").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("serial port"));
    }

    #[test]
    fn test_validate_invalid_listen() {
        let json = r#"{
            serial: { port: "/dev/ttyUSB0" },
            prometheus: { listen: "not-an-address" }
        }"#;

        let config = ExporterConfig::parse(json).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid listen address"));
    }

    #[test]
    fn test_validate_invalid_path() {
        let json = r#"{
            serial: { port: "/dev/ttyUSB0" },
            prometheus: { path: "no-leading-slash" }
        }"#;

        let config = ExporterConfig::parse(json).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must start with /"));
    }

    #[test]
    fn test_validate_zero_baud_rate() {
        let json = r#"{
            serial: { port: "/dev/ttyUSB0", baud_rate: 0 }
        }"#;

        let config = ExporterConfig::parse(json).unwrap();
        assert!(config.validate().is_err());
    }
}
