//! Relay interface
//!
//! Defines the notification trait the protocol engine reports through, and
//! the fetch trait used to pull G-code content from the file store.

use crate::data::{Alert, FileEntry, StatusReport, TemperatureSnapshot};
use crate::error::FetchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Notification emitted by a session towards the control plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum RelayEvent {
    /// Session status changed or progressed
    Status {
        /// Remote address of the printer
        remote_address: String,
        /// Status payload
        status: StatusReport,
    },
    /// Something the operator should know about
    Alert {
        /// Remote address of the printer
        remote_address: String,
        /// Alert payload
        alert: Alert,
    },
    /// A completed SD card listing
    FileList {
        /// Remote address of the printer
        remote_address: String,
        /// Files on the card
        file_list: Vec<FileEntry>,
    },
    /// A telemetry sample
    Temperature {
        /// Remote address of the printer
        remote_address: String,
        /// Temperature payload
        temperatures: TemperatureSnapshot,
    },
}

impl RelayEvent {
    /// Remote address the event concerns
    pub fn remote_address(&self) -> &str {
        match self {
            Self::Status { remote_address, .. }
            | Self::Alert { remote_address, .. }
            | Self::FileList { remote_address, .. }
            | Self::Temperature { remote_address, .. } => remote_address,
        }
    }
}

/// Listener trait for session notifications
///
/// Called synchronously from the protocol engine; implementations must not
/// block and should hand the payload off to their transport.
pub trait Relay: Send + Sync {
    /// Called when the session status changes or a job progresses
    fn notify_status(&self, _remote_address: &str, _status: &StatusReport) {}

    /// Called when an alert is raised
    fn notify_alert(&self, _remote_address: &str, _alert: &Alert) {}

    /// Called when an SD card listing completes
    fn notify_file_list(&self, _remote_address: &str, _files: &[FileEntry]) {}

    /// Called for every parsed temperature line
    fn notify_temperature(&self, _remote_address: &str, _snapshot: &TemperatureSnapshot) {}
}

/// Relay that drops every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpRelay;

impl Relay for NoOpRelay {}

/// Source of G-code file content
#[async_trait]
pub trait GcodeFetcher: Send + Sync {
    /// Download the content of the file with the given store id
    async fn fetch_gcode_file(&self, id: &str) -> Result<String, FetchError>;
}
