//! Gateway TCP server
//!
//! Accepts printer connections and starts a session task for each. While a
//! session is flashing firmware, a loopback connection is the flashing tool:
//! it is piped into that session instead of becoming a printer.

use crate::communication::ChannelLink;
use crate::flasher::Flasher;
use crate::registry::SessionRegistry;
use crate::session::task::spawn_session;
use crate::session::{SessionHandle, SessionTimings};
use printhost_core::{ConnectionError, Relay, Result, SessionError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::Instrument;

/// Printer-facing TCP server
pub struct GatewayServer {
    registry: Arc<SessionRegistry>,
    relay: Arc<dyn Relay>,
    timings: SessionTimings,
    flasher: Option<Arc<Flasher>>,
}

impl GatewayServer {
    /// Create a server
    pub fn new(
        registry: Arc<SessionRegistry>,
        relay: Arc<dyn Relay>,
        timings: SessionTimings,
    ) -> Self {
        Self {
            registry,
            relay,
            timings,
            flasher: None,
        }
    }

    /// Enable firmware flashing with the given tool
    pub fn with_flasher(mut self, flasher: Flasher) -> Self {
        self.flasher = Some(Arc::new(flasher));
        self
    }

    /// The registry sessions are recorded in
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Bind the listening socket
    pub async fn bind(address: &str) -> Result<TcpListener> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| ConnectionError::Bind {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
        tracing::info!("Listening on {}", address);
        Ok(listener)
    }

    /// Accept connections until the listener fails
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => self.accept_connection(stream, peer),
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                }
            }
        }
    }

    /// Route an accepted connection
    pub fn accept_connection(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not disable Nagle for {}: {}", peer, e);
        }

        if peer.ip().is_loopback() {
            if let Some(handle) = self.registry.flashing_session() {
                tracing::info!("Flashing tool connected for {}", handle.remote_address());
                let span = tracing::info_span!("tool", address = %handle.remote_address());
                tokio::spawn(
                    async move {
                        if let Err(e) = pipe_tool(handle, stream).await {
                            tracing::warn!("Flashing tool link ended: {}", e);
                        }
                    }
                    .instrument(span),
                );
                return;
            }
        }

        tracing::info!("Client connected from {}", peer);
        self.start_session(stream, peer.ip().to_string());
    }

    /// Start and register a session on a printer connection
    pub fn start_session<S>(&self, stream: S, remote_address: String) -> SessionHandle
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (handle, join) = spawn_session(
            stream,
            remote_address.clone(),
            self.relay.clone(),
            self.timings.clone(),
            self.flasher.clone(),
        );
        self.registry.insert(handle.clone());

        let registry = self.registry.clone();
        let id = handle.id();
        tokio::spawn(async move {
            if let Err(e) = join.await {
                tracing::error!("Session task for {} failed: {}", remote_address, e);
            }
            if registry.remove(&remote_address, id) {
                tracing::debug!("Removed session for {}", remote_address);
            }
        });

        handle
    }
}

/// Pipe a flashing tool connection into a flashing session
async fn pipe_tool<S>(handle: SessionHandle, stream: S) -> std::result::Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, writer) = tokio::io::split(stream);
    let link = ChannelLink::spawn(writer);
    if !handle.attach_tool(Box::new(link)).await? {
        return Ok(());
    }

    let mut buf = vec![0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => handle.tool_bytes(buf[..n].to_vec())?,
            Err(e) => {
                tracing::warn!("Flashing tool read failed: {}", e);
                break;
            }
        }
    }
    handle.tool_detached()
}
