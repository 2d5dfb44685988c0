//! Configuration for the gateway daemon.
//!
//! TOML with sensible defaults; the two ports are either named explicitly
//! or found through the USB serial number of the adapter carrying both
//! UARTs.

use autoterm_link::{PortLocator, SerialConfig, DEFAULT_BAUD};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Serial link parameters.
    pub link: LinkSection,
    /// Log sink parameters.
    pub log: LogSection,
}

/// Serial link parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSection {
    /// Device path of the first port.
    pub port_a: Option<String>,
    /// Baud rate of the first port.
    pub baud_a: u32,
    /// Device path of the second port.
    pub port_b: Option<String>,
    /// Baud rate of the second port.
    pub baud_b: u32,
    /// USB serial number resolving both ports, overriding explicit paths.
    pub usb_serial: Option<String>,
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            port_a: None,
            baud_a: DEFAULT_BAUD,
            port_b: None,
            baud_b: DEFAULT_BAUD,
            usb_serial: None,
        }
    }
}

/// Log sink parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log file path (required to run the daemon).
    pub path: Option<PathBuf>,
    /// Log level: trace, debug, info, warn, or error.
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            path: None,
            level: "info".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Resolve the link section into serial parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when neither a USB serial number
    /// nor both port paths are given.
    pub fn serial_config(&self) -> Result<SerialConfig, ConfigError> {
        let link = &self.link;
        let locator = if let Some(serial_num) = &link.usb_serial {
            PortLocator::UsbSerial(serial_num.clone())
        } else {
            match (&link.port_a, &link.port_b) {
                (Some(a), Some(b)) => PortLocator::Paths {
                    a: a.clone(),
                    b: b.clone(),
                },
                _ => {
                    return Err(ConfigError::Invalid(
                        "either usb_serial or both port_a and port_b must be set".into(),
                    ))
                }
            }
        };
        Ok(SerialConfig {
            locator,
            baud_a: link.baud_a,
            baud_b: link.baud_b,
        })
    }
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Inconsistent or incomplete options.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.link.baud_a, DEFAULT_BAUD);
        assert_eq!(config.link.baud_b, DEFAULT_BAUD);
        assert_eq!(config.log.level, "info");
        assert!(config.log.path.is_none());
    }

    #[test]
    fn test_parse_toml_with_paths() {
        let toml = r#"
            [link]
            port_a = "/dev/ttyUSB0"
            port_b = "/dev/ttyUSB1"

            [log]
            path = "/var/log/autoterm.log"
            level = "debug"
        "#;
        let config = GatewayConfig::from_toml(toml).unwrap();
        assert_eq!(config.link.port_a.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.log.level, "debug");

        let serial = config.serial_config().unwrap();
        assert_eq!(
            serial.locator,
            PortLocator::Paths {
                a: "/dev/ttyUSB0".into(),
                b: "/dev/ttyUSB1".into(),
            }
        );
    }

    #[test]
    fn test_usb_serial_overrides_paths() {
        let toml = r#"
            [link]
            port_a = "/dev/ttyUSB0"
            port_b = "/dev/ttyUSB1"
            usb_serial = "A50285BI"
        "#;
        let config = GatewayConfig::from_toml(toml).unwrap();
        let serial = config.serial_config().unwrap();
        assert_eq!(serial.locator, PortLocator::UsbSerial("A50285BI".into()));
    }

    #[test]
    fn test_missing_ports_rejected() {
        let config = GatewayConfig::default();
        assert!(matches!(
            config.serial_config(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_roundtrip_toml() {
        let mut config = GatewayConfig::default();
        config.link.usb_serial = Some("A50285BI".into());
        let toml = config.to_toml().unwrap();
        let parsed = GatewayConfig::from_toml(&toml).unwrap();
        assert_eq!(parsed.link.usb_serial.as_deref(), Some("A50285BI"));
    }
}
