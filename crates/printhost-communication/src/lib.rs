//! # Printhost Communication
//!
//! Marlin/Prusa protocol engine and printer-facing gateway for printhost.
//! Frames and parses firmware output, encodes checksummed G-code lines,
//! streams jobs under ok/Resend flow control and serves printers over TCP.

pub mod communication;
pub mod fetch;
pub mod firmware;
pub mod flasher;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;

pub use communication::{
    AckOutcome, ChannelLink, FlowController, LineFramer, NoOpLink, PrinterLink,
};

pub use firmware::{
    Command, CommandCreator, ConnectionWatchState, ConnectionWatcher, FirmwareInfo,
    FirmwareValue, MarlinResponse, MarlinResponseParser,
};

pub use fetch::{DirectoryFetcher, HttpFetcher, UnavailableFetcher};
pub use flasher::{FlashConfig, Flasher};
pub use registry::SessionRegistry;
pub use relay::{ChannelRelay, RelayCommand, RelayDispatcher, RelayEnvelope};
pub use server::GatewayServer;
pub use session::task::spawn_session;
pub use session::{
    DeployError, Job, JobPlan, JobTarget, Session, SessionCommand, SessionHandle,
    SessionSnapshot, SessionTimings, UploadEntry,
};
