//! Error handling for printhost
//!
//! Provides error types for all layers of the gateway:
//! - Session errors (lifecycle and API misuse)
//! - Connection errors (sockets, accept loop, tool link)
//! - Fetch errors (G-code file store)
//! - Flash errors (external flashing tool)
//! - Relay errors (inbound control-plane commands)
//!
//! Protocol lines that fail to parse are never errors; parsers return `Option`.

use thiserror::Error;

/// Session error type
///
/// Represents misuse of the session API or requests against a session that
/// can no longer serve them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Operation requires the session to be idle
    #[error("Session {address} is {status}, expected Idle")]
    NotIdle {
        /// Remote address of the session.
        address: String,
        /// Status the session was in.
        status: String,
    },

    /// No session is registered for the address
    #[error("No session for {address}")]
    UnknownSession {
        /// The address that was looked up.
        address: String,
    },

    /// The session task has ended
    #[error("Session {address} is closed")]
    Closed {
        /// Remote address of the closed session.
        address: String,
    },

    /// The session is busy flashing firmware
    #[error("Session {address} is flashing firmware")]
    Flashing {
        /// Remote address of the session.
        address: String,
    },

    /// A command argument was rejected before encoding
    #[error("Invalid command: {reason}")]
    InvalidCommand {
        /// Why the command was rejected.
        reason: String,
    },
}

/// Connection error type
///
/// Represents errors on the printer-facing TCP side.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// Failed to bind the listening socket
    #[error("Failed to bind {address}: {reason}")]
    Bind {
        /// The address that could not be bound.
        address: String,
        /// The reason the bind failed.
        reason: String,
    },

    /// Connection lost
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// A flashing tool connected but no session is flashing
    #[error("No session is waiting for a flashing tool")]
    NoFlashingSession,

    /// I/O error
    #[error("I/O error: {reason}")]
    IoError {
        /// The reason for the I/O error.
        reason: String,
    },
}

/// Fetch error type
///
/// Represents failures downloading G-code content from the file store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request could not be made
    #[error("Request for G-code file {id} failed: {reason}")]
    Request {
        /// The file id.
        id: String,
        /// The reason the request failed.
        reason: String,
    },

    /// The store answered with a non-success status
    #[error("G-code file {id} returned status {status}")]
    Status {
        /// The file id.
        id: String,
        /// The status code.
        status: u16,
    },

    /// The store has no such file
    #[error("G-code file {id} not found")]
    NotFound {
        /// The file id.
        id: String,
    },
}

/// Flash error type
///
/// Represents failures running the external firmware flashing tool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlashError {
    /// The tool could not be started
    #[error("Failed to start {program}: {reason}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The reason it failed.
        reason: String,
    },

    /// The tool exited unsuccessfully
    #[error("Flashing tool exited with {}", code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    ExitStatus {
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
    },

    /// The tool's output could not be read
    #[error("Flashing tool I/O error: {reason}")]
    Io {
        /// The reason for the I/O error.
        reason: String,
    },
}

/// Relay error type
///
/// Represents inbound control-plane messages that cannot be dispatched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The event name is not part of the command set
    #[error("Unknown relay command: {event}")]
    UnknownCommand {
        /// The rejected event name.
        event: String,
    },

    /// The message could not be decoded
    #[error("Malformed relay message: {reason}")]
    Malformed {
        /// The decoder's reason.
        reason: String,
    },
}

/// Main error type for printhost
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Session error
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Fetch error
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Flash error
    #[error(transparent)]
    Flash(#[from] FlashError),

    /// Relay error
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a session error
    pub fn is_session_error(&self) -> bool {
        matches!(self, Error::Session(_))
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Io(_))
    }

    /// Check if this is a fetch error
    pub fn is_fetch_error(&self) -> bool {
        matches!(self, Error::Fetch(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
