//! Gateway configuration
//!
//! Configuration is read from a JSON or TOML file, chosen by extension.
//! Every section has defaults, so a partial file (or none at all) yields a
//! usable configuration.

use crate::error::{ConfigError, SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Printer-facing listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
        }
    }
}

impl ServerSettings {
    /// `host:port` string suitable for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Relay (control plane) link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Identifier stamped on every event this gateway publishes
    pub host_id: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            host_id: "printhost".to_string(),
        }
    }
}

/// G-code file store used by deployments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// REST store; files are read from `<base_url>/gcodefiles/<id>/content`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Bearer token for the REST store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Directory holding files as `<id>.gcode`, used when no base URL is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

/// Session timers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Liveness check period in milliseconds
    pub heartbeat_ms: u64,
    /// Job stall watchdog period in milliseconds
    pub stall_watchdog_ms: u64,
    /// SD listing poll period while idle, in milliseconds
    pub idle_poll_ms: u64,
    /// Delay between `start` and the init batch, in milliseconds
    pub init_delay_ms: u64,
    /// `M113` host keepalive interval in seconds
    pub keepalive_secs: u32,
    /// `M155` temperature auto-report interval in seconds
    pub temperature_interval_secs: u32,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            heartbeat_ms: 5000,
            stall_watchdog_ms: 500,
            idle_poll_ms: 30_000,
            init_delay_ms: 5000,
            keepalive_secs: 3,
            temperature_interval_secs: 1,
        }
    }
}

/// Firmware flashing tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlashSettings {
    /// Tool executable
    pub program: String,
    /// Target part
    pub part: String,
    /// Programmer type
    pub programmer: String,
    /// Intel hex image; flashing is disabled while unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hex_file: Option<PathBuf>,
    /// Delay between starting the tool and resetting the printer
    pub reset_delay_ms: u64,
    /// Kill the tool after this many seconds; 0 disables the limit
    pub timeout_secs: u64,
}

impl Default for FlashSettings {
    fn default() -> Self {
        Self {
            program: "avrdude".to_string(),
            part: "atmega2560".to_string(),
            programmer: "wiring".to_string(),
            hex_file: None,
            reset_delay_ms: 100,
            timeout_secs: 300,
        }
    }
}

impl FlashSettings {
    /// Whether a firmware image is configured
    pub fn enabled(&self) -> bool {
        self.hex_file.is_some()
    }

    /// Port string the tool uses to reach the gateway's own listener
    pub fn tool_port(&self, server: &ServerSettings) -> String {
        format!("net:localhost:{}", server.port)
    }
}

/// Logging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default level directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete gateway configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener
    pub server: ServerSettings,
    /// Relay
    pub relay: RelaySettings,
    /// File store
    pub fetch: FetchSettings,
    /// Session timers
    pub timing: TimingSettings,
    /// Flashing tool
    pub flash: FlashSettings,
    /// Logging
    pub logging: LoggingSettings,
}

impl GatewayConfig {
    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SettingsError::LoadError(format!("{}: {}", path.display(), e)))?;

        let config: Self = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            other => {
                return Err(
                    ConfigError::UnsupportedFormat(other.unwrap_or("").to_string()).into(),
                )
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string_pretty(self)?,
            other => {
                return Err(
                    ConfigError::UnsupportedFormat(other.unwrap_or("").to_string()).into(),
                )
            }
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Load from `path` if given, otherwise from the default location when
    /// a file exists there, otherwise defaults
    pub fn load_or_default(path: Option<&Path>) -> SettingsResult<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }
        match default_config_path() {
            Ok(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::MissingKey("server.host".to_string()));
        }
        if self.server.port == 0 {
            return Err(invalid("server.port", self.server.port));
        }
        if self.relay.host_id.trim().is_empty() {
            return Err(ConfigError::MissingKey("relay.host_id".to_string()));
        }

        let timers = [
            ("timing.heartbeat_ms", self.timing.heartbeat_ms),
            ("timing.stall_watchdog_ms", self.timing.stall_watchdog_ms),
            ("timing.idle_poll_ms", self.timing.idle_poll_ms),
        ];
        for (key, value) in timers {
            if value == 0 {
                return Err(invalid(key, value));
            }
        }
        if self.timing.keepalive_secs == 0 {
            return Err(invalid(
                "timing.keepalive_secs",
                self.timing.keepalive_secs,
            ));
        }

        if let Some(url) = &self.fetch.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid("fetch.base_url", url));
            }
        }

        if self.flash.enabled() && self.flash.program.trim().is_empty() {
            return Err(ConfigError::MissingKey("flash.program".to_string()));
        }
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Default configuration file, `<config dir>/printhost/config.toml`
pub fn default_config_path() -> SettingsResult<PathBuf> {
    let dir = dirs::config_dir().ok_or_else(|| {
        SettingsError::ConfigDirectory("could not determine config directory".to_string())
    })?;
    Ok(dir.join("printhost").join("config.toml"))
}
