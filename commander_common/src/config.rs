//! Configuration loading traits and types.
//!
//! This module provides the TOML configuration of the commander process
//! and the generic [`ConfigLoader`] used to read it.
//!
//! # Usage
//!
//! ```rust,no_run
//! use commander_common::config::{CommanderConfig, ConfigLoader, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = CommanderConfig::load(Path::new("commander.toml"))?;
//!     config.validate()?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::component::ComponentKeyword;
use crate::consts::{DEFAULT_DEVICE, DEFAULT_DIRECTORY_PATH, OUTBOUND_QUEUE_CAPACITY};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "commander-bench-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: "commander".to_string(),
        }
    }
}

/// What a full outbound queue does to the poster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backpressure {
    /// Block the posting thread until the worker frees a slot.
    #[default]
    Block,
    /// Fail the post with `BusError::QueueFull`.
    Reject,
}

/// `[link]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkSection {
    /// Registered link driver name (`serial`, `memory`).
    #[serde(default = "default_driver")]
    pub driver: String,
    /// Serial device path.
    #[serde(default = "default_device")]
    pub device: String,
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            device: default_device(),
        }
    }
}

/// `[transport]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportSection {
    /// Outbound queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Full-queue policy.
    #[serde(default)]
    pub backpressure: Backpressure,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            backpressure: Backpressure::default(),
        }
    }
}

/// `[directory]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectorySection {
    /// Component directory JSON file.
    #[serde(default = "default_directory_path")]
    pub path: PathBuf,
    /// Wait after the link comes up before sending the address table.
    #[serde(default = "default_bootstrap_delay_ms")]
    pub bootstrap_delay_ms: u64,
}

impl Default for DirectorySection {
    fn default() -> Self {
        Self {
            path: default_directory_path(),
            bootstrap_delay_ms: default_bootstrap_delay_ms(),
        }
    }
}

/// A single-axis command inserted by the interlock stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterlockStep {
    /// Command name.
    pub name: String,
    /// Target component.
    pub axis: ComponentKeyword,
    /// Parameter values.
    #[serde(default)]
    pub params: Vec<String>,
    /// Blocking hint.
    #[serde(default = "default_true")]
    pub blocking: bool,
}

/// `[interlock]` section. Empty by default: no commands are inserted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterlockSection {
    /// Command names that must be preceded by `prefix`.
    #[serde(default)]
    pub guarded: Vec<String>,
    /// Commands emitted, in order, before every guarded command.
    #[serde(default)]
    pub prefix: Vec<InterlockStep>,
}

/// Complete commander configuration.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "commander"
///
/// [link]
/// device = "/dev/ttyUSB0"
///
/// [transport]
/// queue_capacity = 50
/// backpressure = "block"
///
/// [interlock]
/// guarded = ["move_rel", "move_abs", "to_point"]
/// prefix = [{ name = "z_up", axis = "z" }]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommanderConfig {
    /// Shared fields.
    pub shared: SharedConfig,
    /// Link selection.
    #[serde(default)]
    pub link: LinkSection,
    /// Outbound queue sizing.
    #[serde(default)]
    pub transport: TransportSection,
    /// Component directory.
    #[serde(default)]
    pub directory: DirectorySection,
    /// Safety interlock policy.
    #[serde(default)]
    pub interlock: InterlockSection,
}

impl Default for CommanderConfig {
    fn default() -> Self {
        Self {
            shared: SharedConfig::default(),
            link: LinkSection::default(),
            transport: TransportSection::default(),
            directory: DirectorySection::default(),
            interlock: InterlockSection::default(),
        }
    }
}

impl CommanderConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `service_name` is empty
    /// - `link.driver` or `link.device` is empty
    /// - `transport.queue_capacity` is zero
    /// - an interlock step has an empty name, or `guarded` is set without `prefix`
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        if self.link.driver.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "link.driver cannot be empty".to_string(),
            ));
        }
        if self.link.device.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "link.device cannot be empty".to_string(),
            ));
        }
        if self.transport.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "transport.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.interlock.prefix.iter().any(|s| s.name.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "interlock.prefix step with empty name".to_string(),
            ));
        }
        if !self.interlock.guarded.is_empty() && self.interlock.prefix.is_empty() {
            return Err(ConfigError::ValidationError(
                "interlock.guarded requires at least one prefix step".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_driver() -> String {
    "serial".to_string()
}

fn default_device() -> String {
    DEFAULT_DEVICE.to_string()
}

fn default_queue_capacity() -> usize {
    OUTBOUND_QUEUE_CAPACITY
}

fn default_directory_path() -> PathBuf {
    PathBuf::from(DEFAULT_DIRECTORY_PATH)
}

fn default_bootstrap_delay_ms() -> u64 {
    1500
}

fn default_true() -> bool {
    true
}

/// Trait for loading configuration from TOML files.
///
/// Blanket-implemented for every `serde::de::DeserializeOwned` type.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn minimal() -> CommanderConfig {
        toml::from_str("[shared]\nservice_name = \"commander\"\n").unwrap()
    }

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Warn.as_directive(), "warn");
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"trace\"")
                .unwrap()
                .level,
            LogLevel::Trace
        );
        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"error\"")
                .unwrap()
                .level,
            LogLevel::Error
        );
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = minimal();
        assert_eq!(config.shared.log_level, LogLevel::Info);
        assert_eq!(config.link.driver, "serial");
        assert_eq!(config.link.device, "/dev/serial0");
        assert_eq!(config.transport.queue_capacity, 50);
        assert_eq!(config.transport.backpressure, Backpressure::Block);
        assert_eq!(config.directory.path, PathBuf::from("componentIds.json"));
        assert_eq!(config.directory.bootstrap_delay_ms, 1500);
        assert!(config.interlock.guarded.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "".to_string(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = CommanderConfig::default();
        assert_eq!(config.shared.service_name, "commander");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let mut config = minimal();
        config.transport.queue_capacity = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_guarded_without_prefix_rejected() {
        let mut config = minimal();
        config.interlock.guarded = vec!["move_rel".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result = toml::from_str::<CommanderConfig>(
            "[shared]\nservice_name = \"c\"\n[link]\nbaud = 9600\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_config_loader_file_not_found() {
        let result = CommanderConfig::load(Path::new("/nonexistent/path/commander.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_config_loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();

        let result = CommanderConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_config_loader_success() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[shared]
log_level = "debug"
service_name = "bench"

[link]
driver = "memory"
device = "/dev/ttyUSB0"

[transport]
queue_capacity = 8
backpressure = "reject"

[interlock]
guarded = ["move_rel", "to_point"]
prefix = [{{ name = "z_up", axis = "z" }}]
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = CommanderConfig::load(file.path()).unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(config.link.driver, "memory");
        assert_eq!(config.transport.queue_capacity, 8);
        assert_eq!(config.transport.backpressure, Backpressure::Reject);
        assert_eq!(
            config.interlock.prefix,
            vec![InterlockStep {
                name: "z_up".to_string(),
                axis: ComponentKeyword::Z,
                params: vec![],
                blocking: true,
            }]
        );
        assert!(config.validate().is_ok());
    }
}
