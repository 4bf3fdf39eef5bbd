//! Firmware protocol support
//!
//! Supported firmware:
//! - Marlin, with the Prusa extensions (`PRUSA RESET`, `NORMAL MODE:` progress,
//!   PINDA/ambient telemetry)

pub mod capabilities;
pub mod connection_watch;
pub mod marlin;

pub use capabilities::{FirmwareInfo, FirmwareValue};
pub use connection_watch::{ConnectionWatchState, ConnectionWatcher};
pub use marlin::{Command, CommandCreator, MarlinResponse, MarlinResponseParser};
