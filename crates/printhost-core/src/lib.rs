//! # Printhost Core
//!
//! Core types, traits, and errors for printhost.
//! Provides the session status model, relay payloads and the traits the
//! protocol engine uses to talk to the control plane.

pub mod core;
pub mod data;
pub mod error;

pub use core::{GcodeFetcher, NoOpRelay, Relay, RelayEvent};

pub use data::{
    Alert, AlertKind, FileEntry, HeaterReading, HeaterTarget, ManifestAction, ManifestEntry,
    SessionStatus, StatusReport, TemperatureSnapshot,
};

pub use error::{
    ConnectionError, Error, FetchError, FlashError, RelayError, Result, SessionError,
};
