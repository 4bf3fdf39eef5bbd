//! Configuration errors

use thiserror::Error;

/// Reading, writing or locating a configuration file failed
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The file could not be read
    #[error("Cannot read configuration {0}")]
    LoadError(String),

    /// The file could not be written
    #[error("Cannot write configuration {0}")]
    SaveError(String),

    /// The platform has no configuration directory
    #[error("No configuration directory: {0}")]
    ConfigDirectory(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("Invalid JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid TOML configuration: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Cannot encode configuration as TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    /// The content parsed but failed validation
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A configuration value was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required value is empty
    #[error("{0} must not be empty")]
    MissingKey(String),

    /// The file extension is neither `json` nor `toml`
    #[error("Configuration files must be .json or .toml, not '{0}'")]
    UnsupportedFormat(String),

    /// A value is outside what the gateway accepts
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Result of loading or saving configuration
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Result of validating configuration
pub type ConfigResult<T> = Result<T, ConfigError>;
