//! Relay-facing traits

pub mod relay;

pub use relay::{GcodeFetcher, NoOpRelay, Relay, RelayEvent};
