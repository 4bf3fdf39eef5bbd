//! # Printhost
//!
//! A gateway between Marlin/Prusa G-code printers and a remote control
//! plane. Printers connect over TCP; each connection gets a session that
//! initializes the firmware, streams jobs and SD uploads under ok/Resend
//! flow control and reports status, temperatures and SD listings back to
//! the relay.
//!
//! ## Architecture
//!
//! 1. **printhost-core** - Status model, relay payloads, traits and errors
//! 2. **printhost-communication** - Protocol engine, sessions, TCP gateway
//! 3. **printhost-settings** - Configuration files and validation
//! 4. **printhost** - Binary wiring the gateway to a line-oriented relay

pub use printhost_communication::{
    ChannelRelay, DirectoryFetcher, FlashConfig, Flasher, GatewayServer, HttpFetcher,
    RelayDispatcher, SessionRegistry, SessionTimings, UnavailableFetcher,
};
pub use printhost_core::{Error, FetchError, GcodeFetcher, RelayEvent, Result};
pub use printhost_settings::GatewayConfig;

use printhost_settings::LoggingSettings;
use std::sync::Arc;
use std::time::Duration;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging
///
/// `RUST_LOG` overrides the configured level. Output goes to stderr, leaving
/// stdout to the relay event stream.
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.level)?,
    };

    if settings.json {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_current_span(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
            .with_line_number(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}

/// Session timers from configuration
pub fn session_timings(config: &GatewayConfig) -> SessionTimings {
    let timing = &config.timing;
    SessionTimings {
        heartbeat: Duration::from_millis(timing.heartbeat_ms),
        stall_watchdog: Duration::from_millis(timing.stall_watchdog_ms),
        idle_poll: Duration::from_millis(timing.idle_poll_ms),
        init_delay: Duration::from_millis(timing.init_delay_ms),
        flash_reset_delay: Duration::from_millis(config.flash.reset_delay_ms),
        keepalive_interval: timing.keepalive_secs,
        temperature_interval: timing.temperature_interval_secs,
    }
}

/// Flashing tool invocation, if a firmware image is configured
pub fn flash_config(config: &GatewayConfig) -> Option<FlashConfig> {
    let flash = &config.flash;
    let hex_file = flash.hex_file.clone()?;
    Some(FlashConfig {
        program: flash.program.clone(),
        part: flash.part.clone(),
        programmer: flash.programmer.clone(),
        port: flash.tool_port(&config.server),
        hex_file,
        timeout: (flash.timeout_secs > 0).then(|| Duration::from_secs(flash.timeout_secs)),
    })
}

/// File store for deployments
///
/// An HTTP store takes precedence over a local directory.
pub fn gcode_fetcher(
    config: &GatewayConfig,
) -> std::result::Result<Arc<dyn GcodeFetcher>, FetchError> {
    let fetch = &config.fetch;
    if let Some(url) = &fetch.base_url {
        return Ok(Arc::new(HttpFetcher::new(url.clone(), fetch.token.clone())?));
    }
    Ok(match &fetch.directory {
        Some(dir) => Arc::new(DirectoryFetcher::new(dir.clone())),
        None => {
            tracing::warn!("No file store configured; deploys will fail");
            Arc::new(UnavailableFetcher)
        }
    })
}

/// Encode a relay event as one JSON line, stamped with the host id
pub fn encode_event(host_id: &str, event: &RelayEvent) -> serde_json::Result<String> {
    let mut value = serde_json::to_value(event)?;
    if let serde_json::Value::Object(map) = &mut value {
        map.insert(
            "hostId".to_string(),
            serde_json::Value::String(host_id.to_string()),
        );
    }
    serde_json::to_string(&value)
}
