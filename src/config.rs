//! Configuration file support.
//!
//! Supports both YAML and TOML configuration files, auto-detected by
//! extension. CLI flags override file values.
//!
//! # Example YAML configuration:
//! ```yaml
//! server:
//!   port: 5000
//!   bind: "127.0.0.1"
//!   max_upload_mb: 64
//!
//! toolchain:
//!   tensorflowjs_converter: tensorflowjs_converter
//!   tflite_convert: tflite_convert
//!
//! logging:
//!   level: info
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// External toolchain configuration
    pub toolchain: ToolchainConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Bind address
    pub bind: String,

    /// Maximum multipart upload size in MiB
    pub max_upload_mb: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            bind: "127.0.0.1".to_string(),
            max_upload_mb: 64,
        }
    }
}

impl ServerConfig {
    /// Upload cap in bytes, as enforced on the multipart body.
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb * 1024 * 1024
    }
}

/// External toolchain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Path to the `tensorflowjs_converter` binary (resolved via PATH when bare)
    pub tensorflowjs_converter: PathBuf,

    /// Path to the `tflite_convert` binary (resolved via PATH when bare)
    pub tflite_convert: PathBuf,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            tensorflowjs_converter: PathBuf::from("tensorflowjs_converter"),
            tflite_convert: PathBuf::from("tflite_convert"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file (YAML or TOML, auto-detected by extension)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "yaml" | "yml" => Self::from_yaml(&content),
            "toml" => Self::from_toml(&content),
            _ => {
                // Try YAML first, then TOML
                Self::from_yaml(&content).or_else(|_| Self::from_toml(&content))
            }
        }
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Create an example configuration
    pub fn example() -> Self {
        Self {
            server: ServerConfig {
                port: 5000,
                bind: "0.0.0.0".to_string(),
                max_upload_mb: 64,
            },
            toolchain: ToolchainConfig {
                tensorflowjs_converter: PathBuf::from("/usr/local/bin/tensorflowjs_converter"),
                tflite_convert: PathBuf::from("/usr/local/bin/tflite_convert"),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    /// Generate example YAML configuration
    pub fn example_yaml() -> String {
        serde_yaml::to_string(&Self::example()).unwrap_or_default()
    }

    /// Generate example TOML configuration
    pub fn example_toml() -> String {
        toml::to_string_pretty(&Self::example()).unwrap_or_default()
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    IoError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.server.max_upload_mb, 64);
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
server:
  port: 8080
  bind: "0.0.0.0"
toolchain:
  tflite_convert: /opt/tf/bin/tflite_convert
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(
            config.toolchain.tflite_convert,
            PathBuf::from("/opt/tf/bin/tflite_convert")
        );
        // Unset sections keep their defaults
        assert_eq!(
            config.toolchain.tensorflowjs_converter,
            PathBuf::from("tensorflowjs_converter")
        );
    }

    #[test]
    fn test_toml_parsing() {
        let toml = r#"
[server]
port = 9001
max_upload_mb = 8

[logging]
level = "debug"
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.server.max_upload_mb, 8);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(Config::from_yaml(": not yaml [").is_err());
    }

    #[test]
    fn test_example_roundtrip() {
        let yaml = Config::example_yaml();
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0");

        let toml = Config::example_toml();
        let config = Config::from_toml(&toml).unwrap();
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_upload_cap_in_bytes() {
        let server = ServerConfig {
            max_upload_mb: 2,
            ..Default::default()
        };
        assert_eq!(server.max_upload_bytes(), 2 * 1024 * 1024);
    }
}
