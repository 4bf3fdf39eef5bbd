//! Printhost Settings Crate
//!
//! Handles gateway configuration: file formats, validation and the default
//! configuration location.

pub mod config;
pub mod error;

pub use config::{
    default_config_path, FetchSettings, FlashSettings, GatewayConfig, LoggingSettings,
    RelaySettings, ServerSettings, TimingSettings,
};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
