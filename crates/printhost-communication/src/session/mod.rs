//! Printer sessions
//!
//! A [`Session`] is the protocol state machine for one printer connection.
//! It is synchronous: bytes and timer ticks go in, encoded lines come out
//! through its [`PrinterLink`] and notifications through its [`Relay`].
//! [`task::SessionTask`] drives it from a socket and a set of timers.

pub mod deploy;
pub mod job;
pub mod task;

use crate::communication::{AckOutcome, FlowController, LineFramer, PrinterLink};
use crate::firmware::marlin::{
    parse_file_entry, parse_temperature, Command, MarlinResponse, MarlinResponseParser,
    DEFAULT_MOVE_RATE, FIRMWARE_RESTART, INIT_SENTINEL,
};
use crate::firmware::{ConnectionWatchState, ConnectionWatcher, FirmwareInfo};
use printhost_core::{
    Alert, AlertKind, FileEntry, FlashError, HeaterTarget, ManifestAction, ManifestEntry, Relay,
    SessionError, SessionStatus, StatusReport, TemperatureSnapshot,
};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub use deploy::{DeployError, UploadEntry};
pub use job::{Job, JobPlan, JobTarget};
pub use task::{SessionHandle, SessionRequest, SessionTask};

/// Timer periods and init parameters of a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTimings {
    /// Liveness check period
    pub heartbeat: Duration,
    /// Job stall watchdog period
    pub stall_watchdog: Duration,
    /// SD listing poll period while idle
    pub idle_poll: Duration,
    /// Delay between `start` and the init batch
    pub init_delay: Duration,
    /// Delay between spawning the flashing tool and resetting the printer
    pub flash_reset_delay: Duration,
    /// `M113` host keepalive interval in seconds
    pub keepalive_interval: u32,
    /// `M155` temperature auto-report interval in seconds
    pub temperature_interval: u32,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(5),
            stall_watchdog: Duration::from_millis(500),
            idle_poll: Duration::from_secs(30),
            init_delay: Duration::from_secs(5),
            flash_reset_delay: Duration::from_millis(100),
            keepalive_interval: 3,
            temperature_interval: 1,
        }
    }
}

/// Operations a relay (or any caller) can invoke on a session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// Home the given axes (`ALL`, `XY`, `Z`, ...)
    HomeAxis(String),
    /// Set a heater target
    SetTemperature {
        /// Heater
        target: HeaterTarget,
        /// Target in °C
        value: f64,
    },
    /// Relative move on one axis
    MoveAxis {
        /// Axis letter
        axis: String,
        /// Distance in mm
        position: f64,
        /// Feed rate; defaults to 100
        rate: Option<f64>,
    },
    /// Mesh bed leveling
    LevelBed,
    /// Filament change
    ChangeFilament,
    /// Stream a G-code program for immediate execution
    Print(String),
    /// Write a G-code program to the SD card
    WriteToSd {
        /// Program text
        gcode: String,
        /// File name on the card
        filename: String,
    },
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Session id
    pub id: Uuid,
    /// Remote address
    pub remote_address: String,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Job percent
    pub percent: u8,
    /// Remaining minutes reported by the firmware
    pub time_remaining: Option<u32>,
    /// Last temperature sample
    pub temperatures: Option<TemperatureSnapshot>,
    /// Firmware info and capabilities
    pub firmware_info: FirmwareInfo,
    /// Last complete SD listing
    pub file_list: Vec<FileEntry>,
    /// Commands queued, including the one on the wire
    pub queued_commands: usize,
    /// Job cursor and length, when a job streams
    pub job_progress: Option<(usize, usize)>,
    /// Uploads waiting behind the current one
    pub pending_uploads: usize,
    /// Firmware flashing in progress
    pub flashing: bool,
}

/// Protocol state machine for one printer
pub struct Session {
    id: Uuid,
    remote_address: String,
    link: Box<dyn PrinterLink>,
    relay: Arc<dyn Relay>,
    timings: SessionTimings,
    status: SessionStatus,
    framer: LineFramer,
    parser: MarlinResponseParser,
    flow: FlowController,
    job: Option<Job>,
    /// Job waiting for its line number reset to be acknowledged
    staged: Option<JobPlan>,
    /// SD write whose close was acknowledged before the firmware confirmed the save
    awaiting_save: Option<JobTarget>,
    uploads: VecDeque<UploadEntry>,
    percent: u8,
    time_remaining: Option<u32>,
    temperatures: Option<TemperatureSnapshot>,
    firmware_info: FirmwareInfo,
    /// Listing being collected between `Begin file list` and `End file list`
    listing: Option<Vec<FileEntry>>,
    file_list: Vec<FileEntry>,
    watcher: ConnectionWatcher,
    initializing: bool,
    init_requested: bool,
    restart_requested: bool,
    flashing: bool,
    tool_link: Option<Box<dyn PrinterLink>>,
    tool_backlog: Vec<u8>,
}

impl Session {
    /// Create an Offline session for a printer connection
    pub fn new(
        remote_address: impl Into<String>,
        link: Box<dyn PrinterLink>,
        relay: Arc<dyn Relay>,
        timings: SessionTimings,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            remote_address: remote_address.into(),
            link,
            relay,
            timings,
            status: SessionStatus::Offline,
            framer: LineFramer::new(),
            parser: MarlinResponseParser::new(),
            flow: FlowController::new(),
            job: None,
            staged: None,
            awaiting_save: None,
            uploads: VecDeque::new(),
            percent: 0,
            time_remaining: None,
            temperatures: None,
            firmware_info: FirmwareInfo::new(),
            listing: None,
            file_list: Vec::new(),
            watcher: ConnectionWatcher::new(),
            initializing: false,
            init_requested: false,
            restart_requested: false,
            flashing: false,
            tool_link: None,
            tool_backlog: Vec::new(),
        }
    }

    /// Feed a chunk of bytes received from the printer
    pub fn handle_bytes(&mut self, chunk: &[u8]) {
        if self.flashing {
            self.forward_to_tool(chunk);
            return;
        }
        for line in self.framer.push(chunk) {
            self.handle_line(&line);
        }
    }

    /// Process one protocol line
    pub fn handle_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        tracing::trace!("<< {}", line);
        self.watcher.heartbeat();

        if self.status == SessionStatus::Offline && !self.initializing && !self.restart_requested {
            self.request_restart();
        }

        let job_active = self.job.is_some() || self.staged.is_some();
        let Some(response) = self.parser.parse(line, job_active) else {
            return;
        };

        match response {
            MarlinResponse::Ok => self.on_acknowledgment(),
            MarlinResponse::Resend(line_number) => {
                tracing::debug!("Firmware requested resend of line {}", line_number);
                self.flow.request_resend(line_number);
            }
            MarlinResponse::DoneSavingFile => self.on_file_saved(),
            MarlinResponse::Progress {
                percent,
                time_remaining,
            } => self.on_progress(percent, time_remaining),
            MarlinResponse::Start => self.on_firmware_start(),
            MarlinResponse::Initialized => self.on_initialized(),
            MarlinResponse::BeginFileList => self.listing = Some(Vec::new()),
            MarlinResponse::EndFileList => self.on_file_list_end(),
            MarlinResponse::Message(text) => self.on_message(&text),
        }
    }

    fn on_acknowledgment(&mut self) {
        let outcome = self
            .flow
            .handle_acknowledgment(self.job.as_mut(), self.link.as_mut());

        match outcome {
            AckOutcome::JobAdvanced {
                percent: Some(percent),
                ..
            } => {
                self.percent = percent;
                self.notify_progress();
            }
            AckOutcome::JobResent { index } => {
                tracing::info!("Rewound job to line index {}", index);
            }
            AckOutcome::JobGateOpened => self.activate_staged_job(),
            AckOutcome::JobFinished => self.on_job_sent(),
            _ => {}
        }
    }

    fn on_message(&mut self, text: &str) {
        if let Some(listing) = self.listing.as_mut() {
            if let Some(entry) = parse_file_entry(text) {
                listing.push(entry);
                return;
            }
        }

        if let Some(snapshot) = parse_temperature(text) {
            self.temperatures = Some(snapshot);
            self.relay
                .notify_temperature(&self.remote_address, &snapshot);
            return;
        }

        if self.firmware_info.merge_line(text) {
            tracing::debug!("Firmware info: {}", text);
        }
    }

    fn on_progress(&mut self, percent: Option<u8>, time_remaining: Option<u32>) {
        if self.status != SessionStatus::Printing {
            return;
        }
        if let Some(percent) = percent {
            self.percent = percent;
        }
        self.time_remaining = time_remaining;
        self.notify_progress();
    }

    fn on_firmware_start(&mut self) {
        if self.initializing {
            return;
        }
        tracing::info!(
            "Firmware started; initializing in {:?}",
            self.timings.init_delay
        );
        self.reset_protocol_state();
        self.firmware_info.clear();
        self.initializing = true;
        self.restart_requested = false;
        self.init_requested = true;
        self.set_status(SessionStatus::Initializing);
    }

    fn on_initialized(&mut self) {
        if self.set_status(SessionStatus::Idle) {
            self.initializing = false;
            tracing::info!("Finished initialization; printer is ready");
        }
    }

    fn on_file_list_end(&mut self) {
        let Some(files) = self.listing.take() else {
            return;
        };
        tracing::debug!("SD listing: {} file(s)", files.len());
        self.relay.notify_file_list(&self.remote_address, &files);
        self.file_list = files;
    }

    fn stage_job(&mut self, plan: JobPlan, status: SessionStatus) {
        if !self.enter(status) {
            return;
        }
        tracing::info!("Staging {} ({} lines)", plan.target(), plan.len());
        self.staged = Some(plan);
        self.percent = 0;
        self.time_remaining = None;
        self.relay.notify_status(
            &self.remote_address,
            &StatusReport::new(status).with_percent(0),
        );
        self.flow.submit_job_gate(self.link.as_mut());
    }

    fn activate_staged_job(&mut self) {
        let Some(plan) = self.staged.take() else {
            return;
        };
        let mut job = self.flow.encode_job(plan);
        let started = self.flow.start_job(&mut job, self.link.as_mut());
        self.job = Some(job);
        if !started {
            self.on_job_sent();
        }
    }

    fn on_job_sent(&mut self) {
        let Some(job) = self.job.take() else {
            return;
        };

        match job.target() {
            JobTarget::DirectPrint => {
                tracing::info!("Print finished ({} lines)", job.len());
                self.percent = 0;
                self.time_remaining = None;
                self.raise_alert(Alert::new(AlertKind::PrintFinished));
                self.enter(SessionStatus::Idle);
                self.relay.notify_status(
                    &self.remote_address,
                    &StatusReport::new(SessionStatus::Idle).with_percent(0),
                );
                self.flow.finish_job(self.link.as_mut());
            }
            JobTarget::WriteToSd { .. } => {
                let target = job.target().clone();
                self.flow.finish_job(self.link.as_mut());
                if job.is_saved() {
                    self.complete_upload(target);
                } else {
                    tracing::debug!("SD file closed; waiting for save confirmation");
                    self.awaiting_save = Some(target);
                }
            }
        }
    }

    fn on_file_saved(&mut self) {
        let Some(job) = self.job.as_mut() else {
            match self.awaiting_save.take() {
                Some(target) => self.complete_upload(target),
                None => tracing::debug!("Ignoring unexpected save confirmation"),
            }
            return;
        };

        if !matches!(job.target(), JobTarget::WriteToSd { .. }) {
            tracing::debug!("Ignoring save confirmation during a print");
            return;
        }
        if job.is_fully_sent() {
            // close is on the wire; its ok completes the upload
            job.mark_saved();
            return;
        }

        tracing::warn!(
            "Firmware saved file at line {} of {}",
            job.cursor(),
            job.len()
        );
        let target = job.target().clone();
        self.job = None;
        self.flow.finish_job(self.link.as_mut());
        self.complete_upload(target);
    }

    fn complete_upload(&mut self, target: JobTarget) {
        let filename = match &target {
            JobTarget::WriteToSd { filename, .. } => filename.as_str(),
            JobTarget::DirectPrint => "",
        };
        tracing::info!("Finished uploading {}", filename);
        self.percent = 0;
        self.raise_alert(
            Alert::new(AlertKind::UploadFinished)
                .with_detail(format!("Finished uploading {}.", filename)),
        );

        match self.uploads.pop_front() {
            Some(next) => self.stage_upload(next),
            None => {
                self.set_status(SessionStatus::Idle);
                self.flow
                    .submit(Command::ResetLineNumber, self.link.as_mut());
            }
        }
    }

    fn stage_upload(&mut self, upload: UploadEntry) {
        let plan = JobPlan::write_to_sd(&upload.gcode, &upload.file_name, upload.file_id);
        self.stage_job(plan, SessionStatus::Uploading);
    }

    /// Execute a session command
    pub fn apply(&mut self, command: SessionCommand) -> Result<(), SessionError> {
        self.ensure_not_flashing()?;

        match command {
            SessionCommand::HomeAxis(axis) => self.submit(Command::home_axis(&axis)),
            SessionCommand::SetTemperature { target, value } => {
                if !value.is_finite() || value < 0.0 {
                    return Err(SessionError::InvalidCommand {
                        reason: format!("temperature {} out of range", value),
                    });
                }
                match target {
                    HeaterTarget::HotEnd => self.submit(Command::set_hotend_temperature(value)),
                    HeaterTarget::HeatedBed => self.submit(Command::set_bed_temperature(value)),
                }
            }
            SessionCommand::MoveAxis {
                axis,
                position,
                rate,
            } => {
                let axis = axis.trim().to_ascii_uppercase();
                if !matches!(axis.as_str(), "X" | "Y" | "Z" | "E") || !position.is_finite() {
                    return Err(SessionError::InvalidCommand {
                        reason: format!("cannot move axis '{}' by {}", axis, position),
                    });
                }
                let rate = rate.filter(|r| r.is_finite() && *r > 0.0);
                self.submit(Command::relative_positioning());
                self.submit(Command::linear_move(
                    &axis,
                    position,
                    rate.unwrap_or(DEFAULT_MOVE_RATE),
                ));
                self.submit(Command::absolute_positioning());
            }
            SessionCommand::LevelBed => self.submit(Command::bed_leveling()),
            SessionCommand::ChangeFilament => self.submit(Command::filament_change()),
            SessionCommand::Print(gcode) => return self.start_print(&gcode),
            SessionCommand::WriteToSd { gcode, filename } => {
                return self.write_to_sd(&gcode, &filename)
            }
        }
        Ok(())
    }

    /// Queue an ad-hoc command
    pub fn submit(&mut self, command: Command) {
        self.flow.submit(command, self.link.as_mut());
    }

    /// Stream a G-code program for immediate execution
    pub fn start_print(&mut self, gcode: &str) -> Result<(), SessionError> {
        self.ensure_not_flashing()?;
        self.ensure_idle()?;
        let plan = JobPlan::direct_print(gcode);
        if plan.is_empty() {
            return Err(SessionError::InvalidCommand {
                reason: "print job has no commands".to_string(),
            });
        }
        self.stage_job(plan, SessionStatus::Printing);
        Ok(())
    }

    /// Write a G-code program to a file on the SD card
    pub fn write_to_sd(&mut self, gcode: &str, filename: &str) -> Result<(), SessionError> {
        self.ensure_not_flashing()?;
        self.ensure_idle()?;
        validate_filename(filename)?;
        self.stage_job(
            JobPlan::write_to_sd(gcode, filename, None),
            SessionStatus::Uploading,
        );
        Ok(())
    }

    /// First half of a deploy: issue deletes and return the uploads to fetch
    ///
    /// The session moves to Processing until [`Session::queue_uploads`] or
    /// [`Session::abort_deploy`] is called.
    pub fn begin_deploy(
        &mut self,
        manifest: &[ManifestEntry],
    ) -> Result<Vec<ManifestEntry>, SessionError> {
        self.ensure_not_flashing()?;
        self.ensure_idle()?;
        for entry in manifest {
            validate_filename(&entry.gcode_file_name)?;
        }

        self.set_status(SessionStatus::Processing);
        let mut uploads = Vec::new();
        for entry in manifest {
            match entry.action {
                ManifestAction::Delete => {
                    tracing::info!("Deleting {}", entry.gcode_file_name);
                    self.submit(Command::delete_sd_file(&entry.gcode_file_name));
                }
                ManifestAction::Upload => uploads.push(entry.clone()),
            }
        }
        tracing::info!("{} file(s) to be uploaded", uploads.len());
        Ok(uploads)
    }

    /// Second half of a deploy: write the fetched files one after another
    pub fn queue_uploads(&mut self, uploads: Vec<UploadEntry>) {
        if self.status != SessionStatus::Processing {
            tracing::warn!(
                "Discarding {} upload(s); session is {}",
                uploads.len(),
                self.status
            );
            return;
        }
        self.uploads.extend(uploads);
        match self.uploads.pop_front() {
            Some(first) => self.stage_upload(first),
            None => {
                self.set_status(SessionStatus::Idle);
            }
        }
    }

    /// Give up on a deploy whose files could not be fetched
    pub fn abort_deploy(&mut self) {
        if self.status == SessionStatus::Processing {
            tracing::warn!("Deploy aborted");
            self.set_status(SessionStatus::Idle);
        }
    }

    /// Enter flashing mode: printer bytes go to the flashing tool from now on
    pub fn begin_flash(&mut self) -> Result<(), SessionError> {
        self.ensure_not_flashing()?;
        if self.status.is_busy() {
            return Err(self.not_idle());
        }
        tracing::info!("Entering firmware flashing mode");
        self.reset_protocol_state();
        self.flashing = true;
        self.watcher.set_suspended(true);
        Ok(())
    }

    /// Write the firmware restart literal, bypassing flow control
    pub fn restart_firmware(&mut self) {
        tracing::info!("Resetting printer");
        self.flow.send_raw(FIRMWARE_RESTART, self.link.as_mut());
    }

    /// Connect the flashing tool; bytes received so far are flushed to it
    pub fn attach_tool(&mut self, mut link: Box<dyn PrinterLink>) -> bool {
        if !self.flashing {
            tracing::warn!("Flashing tool connected while not flashing");
            return false;
        }
        if !self.tool_backlog.is_empty() {
            let backlog = std::mem::take(&mut self.tool_backlog);
            if let Err(e) = link.send(&backlog) {
                tracing::warn!("Failed to flush {} byte(s) to flashing tool: {}", backlog.len(), e);
            }
        }
        tracing::info!("Flashing tool attached");
        self.tool_link = Some(link);
        true
    }

    /// Pass bytes from the flashing tool to the printer
    pub fn handle_tool_bytes(&mut self, data: &[u8]) {
        if !self.flashing {
            return;
        }
        if let Err(e) = self.link.send(data) {
            tracing::warn!("Failed to forward flashing tool data: {}", e);
        }
    }

    /// The flashing tool closed its connection
    pub fn detach_tool(&mut self) {
        if self.tool_link.take().is_some() {
            tracing::debug!("Flashing tool detached");
        }
    }

    /// Leave flashing mode with the tool's result
    pub fn finish_flash(&mut self, result: Result<(), FlashError>) {
        if !self.flashing {
            return;
        }
        self.flashing = false;
        self.tool_link = None;
        self.tool_backlog.clear();
        self.watcher.set_suspended(false);
        self.initializing = false;
        // the bootloader hands over to the new firmware, which announces `start`
        self.restart_requested = true;
        self.set_status(SessionStatus::Offline);

        match result {
            Ok(()) => {
                tracing::info!("Firmware flashed");
                self.raise_alert(Alert::new(AlertKind::FirmwareFlashed));
            }
            Err(e) => {
                tracing::error!("Firmware flashing failed: {}", e);
                self.raise_alert(Alert::new(AlertKind::FirmwareFlashFailed).with_detail(e.to_string()));
            }
        }
    }

    fn forward_to_tool(&mut self, chunk: &[u8]) {
        match self.tool_link.as_mut() {
            Some(tool) => {
                if let Err(e) = tool.send(chunk) {
                    tracing::warn!("Failed to forward printer data to flashing tool: {}", e);
                }
            }
            None => self.tool_backlog.extend_from_slice(chunk),
        }
    }

    /// Heartbeat period elapsed
    pub fn on_heartbeat_tick(&mut self) -> ConnectionWatchState {
        if self.watcher.is_stopped() {
            return ConnectionWatchState::Lost;
        }
        let state = self.watcher.check();
        if state == ConnectionWatchState::Lost {
            tracing::warn!("No data from printer for {:?}", self.timings.heartbeat);
            self.disconnect();
        }
        state
    }

    /// Stall watchdog period elapsed; returns `true` when a line was retransmitted
    pub fn on_stall_tick(&mut self) -> bool {
        if self.flashing || self.watcher.is_stopped() {
            return false;
        }
        let Some(job) = self.job.as_mut() else {
            return self.retransmit_stalled_gate();
        };
        if job.take_alive() {
            return false;
        }
        tracing::warn!("Job stalled at line index {}; retransmitting", job.cursor());
        self.flow.retransmit_job_line(job, self.link.as_mut())
    }

    fn retransmit_stalled_gate(&mut self) -> bool {
        if self.staged.is_none() || !self.flow.is_in_flight() || self.flow.take_progress() {
            return false;
        }
        tracing::warn!("No acknowledgment while a job waits to start; retransmitting");
        self.flow.retransmit_head(self.link.as_mut())
    }

    /// Idle poll period elapsed; returns `true` when a listing was requested
    pub fn on_idle_poll_tick(&mut self) -> bool {
        if self.flashing || self.watcher.is_stopped() || self.status != SessionStatus::Idle {
            return false;
        }
        self.submit(Command::list_sd_card());
        true
    }

    /// Check and clear the request to schedule the init sequence
    pub fn take_init_request(&mut self) -> bool {
        std::mem::take(&mut self.init_requested)
    }

    /// Send the init batch; returns `false` when the session is no longer initializing
    pub fn run_init_sequence(&mut self) -> bool {
        if self.status != SessionStatus::Initializing || self.watcher.is_stopped() {
            return false;
        }
        tracing::info!("Sending init sequence");
        self.flow.clear_queue();
        let address = format!("IP: {}", self.remote_address);
        for command in [
            Command::ResetLineNumber,
            Command::firmware_info(),
            Command::host_keepalive(self.timings.keepalive_interval),
            Command::temperature_auto_report(self.timings.temperature_interval),
            Command::lcd_message(&address),
            Command::echo(INIT_SENTINEL),
        ] {
            self.submit(command);
        }
        true
    }

    /// Tear the session down: Offline, no queue, no job, no timers
    pub fn disconnect(&mut self) {
        if self.watcher.is_stopped() && self.status == SessionStatus::Offline {
            return;
        }
        tracing::info!("Printer disconnected");
        self.watcher.stop();
        self.reset_protocol_state();
        self.flashing = false;
        self.tool_link = None;
        self.tool_backlog.clear();
        self.initializing = false;
        self.init_requested = false;
        self.set_status(SessionStatus::Offline);
    }

    /// Announce the current status to the relay
    pub fn announce(&self) {
        self.relay
            .notify_status(&self.remote_address, &StatusReport::new(self.status));
    }

    /// Session id
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Remote address
    pub fn remote_address(&self) -> &str {
        &self.remote_address
    }

    /// Lifecycle status
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Job percent
    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// The streaming job
    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    /// Check if a job waits for its line number reset
    pub fn has_staged_job(&self) -> bool {
        self.staged.is_some()
    }

    /// Flow controller state
    pub fn flow(&self) -> &FlowController {
        &self.flow
    }

    /// Last temperature sample
    pub fn temperatures(&self) -> Option<&TemperatureSnapshot> {
        self.temperatures.as_ref()
    }

    /// Firmware info and capabilities
    pub fn firmware_info(&self) -> &FirmwareInfo {
        &self.firmware_info
    }

    /// Last complete SD listing
    pub fn file_list(&self) -> &[FileEntry] {
        &self.file_list
    }

    /// Uploads waiting behind the current one
    pub fn pending_uploads(&self) -> usize {
        self.uploads.len()
    }

    /// Firmware flashing in progress
    pub fn is_flashing(&self) -> bool {
        self.flashing
    }

    /// Check if the session has been torn down
    pub fn is_closed(&self) -> bool {
        self.watcher.is_stopped()
    }

    /// Session timings
    pub fn timings(&self) -> &SessionTimings {
        &self.timings
    }

    /// Point-in-time view
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            remote_address: self.remote_address.clone(),
            status: self.status,
            percent: self.percent,
            time_remaining: self.time_remaining,
            temperatures: self.temperatures,
            firmware_info: self.firmware_info.clone(),
            file_list: self.file_list.clone(),
            queued_commands: self.flow.queued_commands_count(),
            job_progress: self.job.as_ref().map(|j| (j.cursor(), j.len())),
            pending_uploads: self.uploads.len(),
            flashing: self.flashing,
        }
    }

    fn request_restart(&mut self) {
        tracing::info!("Printer is offline; requesting firmware restart");
        self.restart_requested = true;
        self.flow.clear_queue();
        self.restart_firmware();
    }

    fn reset_protocol_state(&mut self) {
        self.flow.clear_queue();
        self.framer.reset();
        self.job = None;
        self.staged = None;
        self.uploads.clear();
        self.awaiting_save = None;
        self.listing = None;
        self.percent = 0;
        self.time_remaining = None;
    }

    /// Move to `status` if the transition table allows it, without notifying
    fn enter(&mut self, status: SessionStatus) -> bool {
        if !self.status.can_transition_to(status) {
            tracing::warn!("Refusing status change {} -> {}", self.status, status);
            return false;
        }
        self.status = status;
        true
    }

    fn set_status(&mut self, status: SessionStatus) -> bool {
        if !self.enter(status) {
            return false;
        }
        self.relay
            .notify_status(&self.remote_address, &StatusReport::new(status));
        true
    }

    fn notify_progress(&self) {
        let mut report = StatusReport::new(self.status).with_percent(self.percent);
        if let Some(minutes) = self.time_remaining {
            report = report.with_time_remaining(minutes);
        }
        self.relay.notify_status(&self.remote_address, &report);
    }

    fn raise_alert(&self, alert: Alert) {
        self.relay.notify_alert(&self.remote_address, &alert);
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.status == SessionStatus::Idle {
            Ok(())
        } else {
            Err(self.not_idle())
        }
    }

    fn ensure_not_flashing(&self) -> Result<(), SessionError> {
        if self.flashing {
            Err(SessionError::Flashing {
                address: self.remote_address.clone(),
            })
        } else {
            Ok(())
        }
    }

    fn not_idle(&self) -> SessionError {
        SessionError::NotIdle {
            address: self.remote_address.clone(),
            status: self.status.to_string(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("remote_address", &self.remote_address)
            .field("status", &self.status)
            .field("flashing", &self.flashing)
            .finish_non_exhaustive()
    }
}

fn validate_filename(filename: &str) -> Result<(), SessionError> {
    let name = filename.trim().trim_start_matches('/');
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(SessionError::InvalidCommand {
            reason: format!("invalid SD file name '{}'", filename),
        });
    }
    Ok(())
}
