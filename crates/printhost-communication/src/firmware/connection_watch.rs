//! Connection watching via firmware heartbeat
//!
//! Any line received from the printer counts as a heartbeat. The session
//! driver checks the watcher once per heartbeat period; a period without a
//! single line means the printer is gone.

use std::fmt;

/// Result of a heartbeat check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionWatchState {
    /// At least one line arrived during the last period
    Healthy,
    /// Checking is paused (firmware flashing)
    Suspended,
    /// No line arrived during the last period, or the watcher was stopped
    Lost,
}

impl fmt::Display for ConnectionWatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "Healthy"),
            Self::Suspended => write!(f, "Suspended"),
            Self::Lost => write!(f, "Lost"),
        }
    }
}

/// Heartbeat flag with a one-period memory
#[derive(Debug)]
pub struct ConnectionWatcher {
    heartbeat: bool,
    suspended: bool,
    stopped: bool,
}

impl ConnectionWatcher {
    /// Create a watcher; a line must arrive within the first period
    pub fn new() -> Self {
        Self {
            heartbeat: false,
            suspended: false,
            stopped: false,
        }
    }

    /// Record that a line arrived
    pub fn heartbeat(&mut self) {
        self.heartbeat = true;
    }

    /// Evaluate the period that just ended and start a new one
    pub fn check(&mut self) -> ConnectionWatchState {
        if self.stopped {
            return ConnectionWatchState::Lost;
        }
        if self.suspended {
            return ConnectionWatchState::Suspended;
        }
        if std::mem::take(&mut self.heartbeat) {
            ConnectionWatchState::Healthy
        } else {
            self.stopped = true;
            ConnectionWatchState::Lost
        }
    }

    /// Pause or resume checking; resuming grants a fresh period
    pub fn set_suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
        if !suspended {
            self.heartbeat = true;
        }
    }

    /// Mark the connection as finished
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Check if the watcher has been stopped
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl Default for ConnectionWatcher {
    fn default() -> Self {
        Self::new()
    }
}
