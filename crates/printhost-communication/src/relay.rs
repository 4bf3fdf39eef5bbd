//! Control-plane relay plumbing
//!
//! Inbound: relay messages are decoded into a closed [`RelayCommand`] set and
//! dispatched to the addressed session. Outbound: [`ChannelRelay`] turns
//! session notifications into [`RelayEvent`]s on a channel that the relay
//! transport drains.

use crate::registry::SessionRegistry;
use crate::session::{DeployError, SessionCommand};
use printhost_core::{
    Alert, Error, FileEntry, GcodeFetcher, HeaterTarget, ManifestEntry, Relay,
    RelayError, RelayEvent, SessionError, StatusReport, TemperatureSnapshot,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

/// Commands accepted from the relay
#[derive(Debug, Clone, PartialEq)]
pub enum RelayCommand {
    /// `homeAxis`
    HomeAxis {
        /// Axes to home
        axis: String,
    },
    /// `setTemperature`
    SetTemperature {
        /// Heater
        target: HeaterTarget,
        /// Target in °C
        value: f64,
    },
    /// `moveAxis`
    MoveAxis {
        /// Axis letter
        axis: String,
        /// Distance in mm
        position: f64,
        /// Feed rate
        rate: Option<f64>,
    },
    /// `levelBed`
    LevelBed,
    /// `changeFillament`
    ChangeFilament,
    /// `firmwareUpdate`
    FirmwareUpdate,
    /// `print`
    Print {
        /// Program text
        gcode: String,
    },
    /// `writeToSD`
    WriteToSd {
        /// Program text
        gcode: String,
        /// File name on the card
        filename: String,
    },
    /// `deploy`
    Deploy {
        /// Deletes and uploads to apply
        manifest: Vec<ManifestEntry>,
    },
}

impl RelayCommand {
    /// Relay event name of the command
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::HomeAxis { .. } => "homeAxis",
            Self::SetTemperature { .. } => "setTemperature",
            Self::MoveAxis { .. } => "moveAxis",
            Self::LevelBed => "levelBed",
            Self::ChangeFilament => "changeFillament",
            Self::FirmwareUpdate => "firmwareUpdate",
            Self::Print { .. } => "print",
            Self::WriteToSd { .. } => "writeToSD",
            Self::Deploy { .. } => "deploy",
        }
    }

    /// Whether dispatch waits on file fetches or the flashing tool
    ///
    /// Such commands are run off the relay input loop so that later
    /// commands for other printers are not held behind them.
    pub fn is_long_running(&self) -> bool {
        matches!(self, Self::Deploy { .. } | Self::FirmwareUpdate)
    }
}

/// A relay command addressed to one printer
#[derive(Debug, Clone, PartialEq)]
pub struct RelayEnvelope {
    /// Printer address
    pub remote_address: String,
    /// Command
    pub command: RelayCommand,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    remote_address: String,
    event: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    manifest: Option<Vec<ManifestEntry>>,
}

#[derive(Deserialize)]
struct AxisData {
    axis: String,
}

#[derive(Deserialize)]
struct TemperatureData {
    target: HeaterTarget,
    value: f64,
}

#[derive(Deserialize)]
struct MoveData {
    axis: String,
    #[serde(alias = "pos")]
    position: f64,
    #[serde(default)]
    rate: Option<f64>,
}

#[derive(Deserialize)]
struct PrintData {
    gcode: String,
}

#[derive(Deserialize)]
struct WriteToSdData {
    gcode: String,
    filename: String,
}

#[derive(Deserialize)]
struct DeployData {
    manifest: Vec<ManifestEntry>,
}

fn payload<T: for<'de> Deserialize<'de>>(event: &str, data: Value) -> Result<T, RelayError> {
    serde_json::from_value(data).map_err(|e| RelayError::Malformed {
        reason: format!("{}: {}", event, e),
    })
}

impl RelayEnvelope {
    /// Decode a relay message
    ///
    /// Messages carry `remoteAddress`, `event` and an event-specific `data`
    /// object; `deploy` carries its `manifest` at the top level.
    pub fn from_json(text: &str) -> Result<Self, RelayError> {
        let raw: RawEnvelope = serde_json::from_str(text).map_err(|e| RelayError::Malformed {
            reason: e.to_string(),
        })?;
        let event = raw.event.as_str();

        let command = match event {
            "homeAxis" => {
                let AxisData { axis } = payload(event, raw.data)?;
                RelayCommand::HomeAxis { axis }
            }
            "setTemperature" => {
                let TemperatureData { target, value } = payload(event, raw.data)?;
                RelayCommand::SetTemperature { target, value }
            }
            "moveAxis" => {
                let MoveData {
                    axis,
                    position,
                    rate,
                } = payload(event, raw.data)?;
                RelayCommand::MoveAxis {
                    axis,
                    position,
                    rate,
                }
            }
            "levelBed" => RelayCommand::LevelBed,
            "changeFillament" | "changeFilament" => RelayCommand::ChangeFilament,
            "firmwareUpdate" => RelayCommand::FirmwareUpdate,
            "print" => {
                let PrintData { gcode } = payload(event, raw.data)?;
                RelayCommand::Print { gcode }
            }
            "writeToSD" => {
                let WriteToSdData { gcode, filename } = payload(event, raw.data)?;
                RelayCommand::WriteToSd { gcode, filename }
            }
            "deploy" => {
                let manifest = match raw.manifest {
                    Some(manifest) => manifest,
                    None => payload::<DeployData>(event, raw.data)?.manifest,
                };
                RelayCommand::Deploy { manifest }
            }
            other => {
                return Err(RelayError::UnknownCommand {
                    event: other.to_string(),
                })
            }
        };

        Ok(Self {
            remote_address: raw.remote_address,
            command,
        })
    }
}

/// Routes relay commands to sessions
pub struct RelayDispatcher {
    registry: Arc<SessionRegistry>,
    fetcher: Arc<dyn GcodeFetcher>,
}

impl RelayDispatcher {
    /// Create a dispatcher
    pub fn new(registry: Arc<SessionRegistry>, fetcher: Arc<dyn GcodeFetcher>) -> Self {
        Self { registry, fetcher }
    }

    /// Decode and dispatch a relay message
    pub async fn dispatch_json(&self, text: &str) -> Result<(), Error> {
        let envelope = RelayEnvelope::from_json(text).map_err(|e| {
            tracing::warn!("Dropping relay message: {}", e);
            e
        })?;
        self.dispatch(envelope).await
    }

    /// Dispatch a command to its session
    pub async fn dispatch(&self, envelope: RelayEnvelope) -> Result<(), Error> {
        let RelayEnvelope {
            remote_address,
            command,
        } = envelope;
        tracing::debug!("Relay command {} for {}", command.event_name(), remote_address);

        let Some(handle) = self.registry.get(&remote_address) else {
            tracing::warn!(
                "Relay command {} for unknown printer {}",
                command.event_name(),
                remote_address
            );
            return Err(SessionError::UnknownSession {
                address: remote_address,
            }
            .into());
        };

        let session_command = match command {
            RelayCommand::HomeAxis { axis } => SessionCommand::HomeAxis(axis),
            RelayCommand::SetTemperature { target, value } => {
                SessionCommand::SetTemperature { target, value }
            }
            RelayCommand::MoveAxis {
                axis,
                position,
                rate,
            } => SessionCommand::MoveAxis {
                axis,
                position,
                rate,
            },
            RelayCommand::LevelBed => SessionCommand::LevelBed,
            RelayCommand::ChangeFilament => SessionCommand::ChangeFilament,
            RelayCommand::Print { gcode } => SessionCommand::Print(gcode),
            RelayCommand::WriteToSd { gcode, filename } => {
                SessionCommand::WriteToSd { gcode, filename }
            }
            RelayCommand::FirmwareUpdate => {
                return handle.firmware_update().await.map_err(Error::from);
            }
            RelayCommand::Deploy { manifest } => {
                return match handle.deploy(manifest, self.fetcher.as_ref()).await {
                    Ok(count) => {
                        tracing::info!("Deploy to {} queued {} upload(s)", remote_address, count);
                        Ok(())
                    }
                    Err(DeployError::Session(e)) => Err(e.into()),
                    Err(DeployError::Fetch { source, .. }) => Err(source.into()),
                };
            }
        };

        handle.command(session_command).await.map_err(Error::from)
    }

    /// Dispatch relay messages, one JSON object per line, until the input ends
    ///
    /// Deploys and firmware updates run on their own task; everything else is
    /// dispatched in arrival order.
    pub async fn serve_lines<R>(self: Arc<Self>, reader: R) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let envelope = match RelayEnvelope::from_json(&line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!("Dropping relay message: {}", e);
                    continue;
                }
            };

            if envelope.command.is_long_running() {
                let dispatcher = Arc::clone(&self);
                tokio::spawn(async move {
                    if let Err(e) = dispatcher.dispatch(envelope).await {
                        tracing::warn!("Relay command failed: {}", e);
                    }
                });
            } else if let Err(e) = self.dispatch(envelope).await {
                tracing::warn!("Relay command failed: {}", e);
            }
        }
        tracing::info!("Relay input closed");
        Ok(())
    }
}

/// Relay that publishes notifications as [`RelayEvent`]s on a channel
#[derive(Debug, Clone)]
pub struct ChannelRelay {
    tx: mpsc::UnboundedSender<RelayEvent>,
}

impl ChannelRelay {
    /// Create a relay and the receiver of its events
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RelayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn publish(&self, event: RelayEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Relay event dropped, no receiver");
        }
    }
}

impl Relay for ChannelRelay {
    fn notify_status(&self, remote_address: &str, status: &StatusReport) {
        self.publish(RelayEvent::Status {
            remote_address: remote_address.to_string(),
            status: status.clone(),
        });
    }

    fn notify_alert(&self, remote_address: &str, alert: &Alert) {
        self.publish(RelayEvent::Alert {
            remote_address: remote_address.to_string(),
            alert: alert.clone(),
        });
    }

    fn notify_file_list(&self, remote_address: &str, files: &[FileEntry]) {
        self.publish(RelayEvent::FileList {
            remote_address: remote_address.to_string(),
            file_list: files.to_vec(),
        });
    }

    fn notify_temperature(&self, remote_address: &str, snapshot: &TemperatureSnapshot) {
        self.publish(RelayEvent::Temperature {
            remote_address: remote_address.to_string(),
            temperatures: *snapshot,
        });
    }
}
