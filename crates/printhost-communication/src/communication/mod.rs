//! Printer-facing byte transport
//!
//! The protocol engine writes through a [`PrinterLink`]; the session driver
//! supplies a [`ChannelLink`] whose receiving side is drained into the socket
//! by a writer task, so writes never block the engine.

pub mod buffered;
pub mod framer;

use printhost_core::{ConnectionError, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

pub use buffered::{AckOutcome, FlowController};
pub use framer::LineFramer;

/// Write side of a printer (or flashing tool) connection
pub trait PrinterLink: Send {
    /// Send raw bytes
    fn send(&mut self, data: &[u8]) -> Result<usize>;

    /// Send a line followed by `\n`
    fn send_line(&mut self, line: &str) -> Result<usize> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.send(&data)
    }
}

/// Link that forwards writes to a writer task
#[derive(Debug, Clone)]
pub struct ChannelLink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelLink {
    /// Create a link and the receiver its writer task drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Create a link and spawn a writer task draining it into `writer`
    pub fn spawn<W>(writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (link, rx) = Self::new();
        tokio::spawn(write_loop(writer, rx));
        link
    }
}

impl PrinterLink for ChannelLink {
    fn send(&mut self, data: &[u8]) -> Result<usize> {
        self.tx.send(data.to_vec()).map_err(|_| ConnectionError::ConnectionLost {
            reason: "writer task has stopped".to_string(),
        })?;
        Ok(data.len())
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Vec<u8>>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(data) = rx.recv().await {
        if let Err(e) = writer.write_all(&data).await {
            tracing::warn!("Socket write failed: {}", e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Link that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpLink;

impl PrinterLink for NoOpLink {
    fn send(&mut self, data: &[u8]) -> Result<usize> {
        Ok(data.len())
    }
}
