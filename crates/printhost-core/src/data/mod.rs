//! Data models shared between the protocol engine and the relay
//!
//! This module provides:
//! - Session lifecycle status
//! - Temperature telemetry snapshots
//! - Status, alert and file-list payloads sent to the control plane
//! - Deploy manifests received from the control plane

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a printer session
///
/// A session starts `Offline`, moves to `Initializing` when the firmware
/// announces `start`, and settles in `Idle` once the init batch has been
/// accepted. Bulk operations move it to `Printing`, `Uploading` or
/// `Processing` until they complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SessionStatus {
    /// No live firmware conversation
    #[default]
    Offline,
    /// Firmware booted, init sequence pending or running
    Initializing,
    /// Ready for commands
    Idle,
    /// Streaming a direct print
    Printing,
    /// Writing a file to the SD card
    Uploading,
    /// Orchestrating a deploy manifest
    Processing,
}

impl SessionStatus {
    /// Check if the session is running a bulk operation
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SessionStatus::Printing | SessionStatus::Uploading | SessionStatus::Processing
        )
    }

    /// Check if a transition from this status to `target` is valid.
    ///
    /// - Offline can only go to Initializing
    /// - Initializing completes to Idle
    /// - Idle can start any bulk operation
    /// - Processing hands over to Uploading, or back to Idle
    /// - Any status can drop to Offline
    pub fn can_transition_to(&self, target: SessionStatus) -> bool {
        use SessionStatus::*;
        if *self == target {
            return true;
        }
        match (self, target) {
            (_, Offline) => true,
            (_, Initializing) => true,
            (Offline, _) => false,
            (Initializing, Idle) => true,
            (Initializing, _) => false,
            (Idle, Printing | Uploading | Processing) => true,
            (Processing, Uploading | Idle) => true,
            (Uploading, Idle) => true,
            (Printing, Idle) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => write!(f, "Offline"),
            Self::Initializing => write!(f, "Initializing"),
            Self::Idle => write!(f, "Idle"),
            Self::Printing => write!(f, "Printing"),
            Self::Uploading => write!(f, "Uploading"),
            Self::Processing => write!(f, "Processing"),
        }
    }
}

/// Current and target temperature of one heater
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HeaterReading {
    /// Measured temperature in °C
    pub current: f64,
    /// Target temperature in °C
    pub target: f64,
}

/// A full temperature telemetry line from the firmware
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureSnapshot {
    /// Active hotend
    pub hot_end: HeaterReading,
    /// Heated bed
    pub heated_bed: HeaterReading,
    /// Hotend T0
    pub hot_end_t0: HeaterReading,
    /// Hotend heater power (PWM)
    pub hotend_power: u32,
    /// Bed heater power (PWM)
    pub bed_power: u32,
    /// PINDA sensor temperature
    pub pinda_temp: f64,
    /// Ambient temperature
    pub ambient_actual: f64,
}

/// Status notification payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Session status
    #[serde(rename = "type")]
    pub status: SessionStatus,
    /// Rounded completion percent, when a job is running
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
    /// Remaining minutes as reported by the firmware
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining: Option<u32>,
}

impl StatusReport {
    /// A report carrying only the status
    pub fn new(status: SessionStatus) -> Self {
        Self {
            status,
            percent: None,
            time_remaining: None,
        }
    }

    /// Attach a completion percent
    pub fn with_percent(mut self, percent: u8) -> Self {
        self.percent = Some(percent);
        self
    }

    /// Attach a remaining time in minutes
    pub fn with_time_remaining(mut self, minutes: u32) -> Self {
        self.time_remaining = Some(minutes);
        self
    }
}

/// Kinds of alerts raised towards the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    /// A direct print streamed its last line
    PrintFinished,
    /// The firmware confirmed an SD file save
    UploadFinished,
    /// The flashing tool completed successfully
    FirmwareFlashed,
    /// The flashing tool failed
    FirmwareFlashFailed,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrintFinished => write!(f, "Print Finished"),
            Self::UploadFinished => write!(f, "Upload Finished"),
            Self::FirmwareFlashed => write!(f, "Firmware Flashed"),
            Self::FirmwareFlashFailed => write!(f, "Firmware Flash Failed"),
        }
    }
}

/// Alert notification payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// What happened
    #[serde(rename = "type")]
    pub kind: AlertKind,
    /// Human readable detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// When the alert was raised
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    /// Create an alert without detail
    pub fn new(kind: AlertKind) -> Self {
        Self {
            kind,
            detail: None,
            raised_at: Utc::now(),
        }
    }

    /// Attach a detail message
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// One entry of an SD card listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Lowercased file name
    pub gcode_file_name: String,
    /// Size in bytes, when the firmware reported one
    pub size: Option<u64>,
}

/// Heater addressed by a set-temperature command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HeaterTarget {
    /// The hotend
    HotEnd,
    /// The heated bed
    HeatedBed,
}

/// Action of a deploy manifest entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestAction {
    /// Remove the file from the SD card
    Delete,
    /// Fetch the file and write it to the SD card
    Upload,
}

/// One entry of a deploy manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// What to do with the file
    pub action: ManifestAction,
    /// File store id (uploads only)
    #[serde(default)]
    pub id: Option<String>,
    /// File name on the SD card
    pub gcode_file_name: String,
}
