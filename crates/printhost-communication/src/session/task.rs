//! Session task driver
//!
//! One tokio task per printer connection. It owns the [`Session`], the read
//! half of the socket and the session's timers; everything else talks to it
//! through a [`SessionHandle`]. When the loop ends the timers are dropped
//! together with it.

use super::deploy::UploadEntry;
use super::{Session, SessionCommand, SessionSnapshot, SessionTimings};
use crate::communication::{ChannelLink, PrinterLink};
use crate::firmware::ConnectionWatchState;
use crate::flasher::Flasher;
use printhost_core::{FlashError, ManifestEntry, Relay, SessionError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::Instrument;
use uuid::Uuid;

const READ_BUFFER_SIZE: usize = 4096;

/// Requests accepted by a session task
pub enum SessionRequest {
    /// Run a session command
    Command {
        /// The command
        command: SessionCommand,
        /// Outcome
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    /// Flash new firmware
    FirmwareUpdate {
        /// Outcome of starting the flash
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    /// Start a deploy; replies with the upload entries to fetch
    BeginDeploy {
        /// Manifest
        manifest: Vec<ManifestEntry>,
        /// Upload entries, or why the deploy cannot start
        reply: oneshot::Sender<Result<Vec<ManifestEntry>, SessionError>>,
    },
    /// Fetched files for the running deploy
    QueueUploads(Vec<UploadEntry>),
    /// The running deploy could not fetch its files
    AbortDeploy,
    /// A flashing tool connected
    AttachTool {
        /// Write side of the tool connection
        link: Box<dyn PrinterLink>,
        /// Whether the session accepted the tool
        reply: oneshot::Sender<bool>,
    },
    /// Bytes from the flashing tool
    ToolBytes(Vec<u8>),
    /// The flashing tool disconnected
    ToolDetached,
    /// Read the session state
    Snapshot(oneshot::Sender<SessionSnapshot>),
    /// Stop the task
    Shutdown,
}

/// Handle to a running session task
#[derive(Clone, Debug)]
pub struct SessionHandle {
    id: Uuid,
    remote_address: String,
    requests: mpsc::UnboundedSender<SessionRequest>,
    flashing: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Id of the session
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Remote address of the printer
    pub fn remote_address(&self) -> &str {
        &self.remote_address
    }

    /// Check if the session is flashing firmware
    pub fn is_flashing(&self) -> bool {
        self.flashing.load(Ordering::SeqCst)
    }

    /// Check if the task has ended
    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }

    fn closed(&self) -> SessionError {
        SessionError::Closed {
            address: self.remote_address.clone(),
        }
    }

    fn send(&self, request: SessionRequest) -> Result<(), SessionError> {
        self.requests.send(request).map_err(|_| self.closed())
    }

    async fn call<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<T>) -> SessionRequest,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(request(tx))?;
        rx.await.map_err(|_| self.closed())
    }

    /// Run a session command
    pub async fn command(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.call(|reply| SessionRequest::Command { command, reply })
            .await?
    }

    /// Start flashing firmware
    pub async fn firmware_update(&self) -> Result<(), SessionError> {
        self.call(|reply| SessionRequest::FirmwareUpdate { reply })
            .await?
    }

    /// Start a deploy and get the upload entries to fetch
    pub async fn begin_deploy(
        &self,
        manifest: Vec<ManifestEntry>,
    ) -> Result<Vec<ManifestEntry>, SessionError> {
        self.call(|reply| SessionRequest::BeginDeploy { manifest, reply })
            .await?
    }

    /// Hand the fetched files to the running deploy
    pub fn queue_uploads(&self, uploads: Vec<UploadEntry>) -> Result<(), SessionError> {
        self.send(SessionRequest::QueueUploads(uploads))
    }

    /// Abort the running deploy
    pub fn abort_deploy(&self) -> Result<(), SessionError> {
        self.send(SessionRequest::AbortDeploy)
    }

    /// Attach a flashing tool connection
    pub async fn attach_tool(&self, link: Box<dyn PrinterLink>) -> Result<bool, SessionError> {
        self.call(|reply| SessionRequest::AttachTool { link, reply })
            .await
    }

    /// Forward bytes from the flashing tool
    pub fn tool_bytes(&self, data: Vec<u8>) -> Result<(), SessionError> {
        self.send(SessionRequest::ToolBytes(data))
    }

    /// Report that the flashing tool disconnected
    pub fn tool_detached(&self) -> Result<(), SessionError> {
        self.send(SessionRequest::ToolDetached)
    }

    /// Read the session state
    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        self.call(SessionRequest::Snapshot).await
    }

    /// Ask the task to stop
    pub fn shutdown(&self) {
        let _ = self.requests.send(SessionRequest::Shutdown);
    }
}

/// Drives a session from its socket and timers
pub struct SessionTask<R> {
    session: Session,
    reader: R,
    requests: mpsc::UnboundedReceiver<SessionRequest>,
    flasher: Option<Arc<Flasher>>,
    flashing: Arc<AtomicBool>,
}

impl<R> SessionTask<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Create the task and its handle
    pub fn new(session: Session, reader: R, flasher: Option<Arc<Flasher>>) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let flashing = Arc::new(AtomicBool::new(false));
        let handle = SessionHandle {
            id: session.id(),
            remote_address: session.remote_address().to_string(),
            requests: tx,
            flashing: flashing.clone(),
        };
        let task = Self {
            session,
            reader,
            requests: rx,
            flasher,
            flashing,
        };
        (task, handle)
    }

    /// Run until the printer disconnects, goes silent or the task is shut down
    ///
    /// Returns the torn-down session.
    pub async fn run(mut self) -> Session {
        let timings = self.session.timings().clone();
        let start = Instant::now();
        let mut heartbeat = periodic(start, timings.heartbeat);
        let mut stall = periodic(start, timings.stall_watchdog);
        let mut idle_poll = periodic(start, timings.idle_poll);

        let init_timer = time::sleep(Duration::ZERO);
        tokio::pin!(init_timer);
        let mut init_armed = false;
        let flash_reset = time::sleep(Duration::ZERO);
        tokio::pin!(flash_reset);
        let mut reset_armed = false;

        let (flash_tx, mut flash_rx) = mpsc::unbounded_channel::<Result<(), FlashError>>();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        tracing::info!("Printer connected");
        self.session.announce();

        loop {
            tokio::select! {
                read = self.reader.read(&mut buf) => match read {
                    Ok(0) => {
                        tracing::info!("Printer closed the connection");
                        break;
                    }
                    Ok(n) => self.session.handle_bytes(&buf[..n]),
                    Err(e) => {
                        tracing::warn!("Printer read failed: {}", e);
                        break;
                    }
                },
                _ = heartbeat.tick() => {
                    if self.session.on_heartbeat_tick() == ConnectionWatchState::Lost {
                        break;
                    }
                }
                _ = stall.tick() => {
                    self.session.on_stall_tick();
                }
                _ = idle_poll.tick() => {
                    self.session.on_idle_poll_tick();
                }
                () = &mut init_timer, if init_armed => {
                    init_armed = false;
                    self.session.run_init_sequence();
                }
                () = &mut flash_reset, if reset_armed => {
                    reset_armed = false;
                    if self.session.is_flashing() {
                        self.session.restart_firmware();
                    }
                }
                Some(result) = flash_rx.recv() => {
                    self.session.finish_flash(result);
                    self.flashing.store(false, Ordering::SeqCst);
                }
                request = self.requests.recv() => match request {
                    None | Some(SessionRequest::Shutdown) => {
                        tracing::info!("Session shut down");
                        break;
                    }
                    Some(request) => {
                        if self.handle_request(request, &flash_tx) {
                            flash_reset.as_mut().reset(Instant::now() + timings.flash_reset_delay);
                            reset_armed = true;
                        }
                    }
                },
            }

            if self.session.take_init_request() {
                init_timer
                    .as_mut()
                    .reset(Instant::now() + timings.init_delay);
                init_armed = true;
            }
        }

        self.session.disconnect();
        self.flashing.store(false, Ordering::SeqCst);
        self.session
    }

    /// Apply a request; returns `true` when flashing started
    fn handle_request(
        &mut self,
        request: SessionRequest,
        flash_tx: &mpsc::UnboundedSender<Result<(), FlashError>>,
    ) -> bool {
        match request {
            SessionRequest::Command { command, reply } => {
                let result = self.session.apply(command);
                if let Err(e) = &result {
                    tracing::warn!("Command rejected: {}", e);
                }
                let _ = reply.send(result);
            }
            SessionRequest::FirmwareUpdate { reply } => {
                let result = self.start_flash(flash_tx);
                let started = result.is_ok();
                let _ = reply.send(result);
                return started;
            }
            SessionRequest::BeginDeploy { manifest, reply } => {
                let _ = reply.send(self.session.begin_deploy(&manifest));
            }
            SessionRequest::QueueUploads(uploads) => self.session.queue_uploads(uploads),
            SessionRequest::AbortDeploy => self.session.abort_deploy(),
            SessionRequest::AttachTool { link, reply } => {
                let _ = reply.send(self.session.attach_tool(link));
            }
            SessionRequest::ToolBytes(data) => self.session.handle_tool_bytes(&data),
            SessionRequest::ToolDetached => self.session.detach_tool(),
            SessionRequest::Snapshot(reply) => {
                let _ = reply.send(self.session.snapshot());
            }
            SessionRequest::Shutdown => {}
        }
        false
    }

    fn start_flash(
        &mut self,
        flash_tx: &mpsc::UnboundedSender<Result<(), FlashError>>,
    ) -> Result<(), SessionError> {
        let Some(flasher) = self.flasher.clone() else {
            return Err(SessionError::InvalidCommand {
                reason: "no flashing tool configured".to_string(),
            });
        };
        self.session.begin_flash()?;
        self.flashing.store(true, Ordering::SeqCst);

        let tx = flash_tx.clone();
        let span = tracing::info_span!("flasher", address = %self.session.remote_address());
        tokio::spawn(
            async move {
                let _ = tx.send(flasher.flash().await);
            }
            .instrument(span),
        );
        Ok(())
    }
}

fn periodic(start: Instant, period: Duration) -> time::Interval {
    let mut interval = time::interval_at(start + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Start a session task on a printer connection
pub fn spawn_session<S>(
    stream: S,
    remote_address: impl Into<String>,
    relay: Arc<dyn Relay>,
    timings: SessionTimings,
    flasher: Option<Arc<Flasher>>,
) -> (SessionHandle, JoinHandle<Session>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let link = ChannelLink::spawn(writer);
    let session = Session::new(remote_address, Box::new(link), relay, timings);
    let (task, handle) = SessionTask::new(session, reader, flasher);
    let span = tracing::info_span!("session", address = %handle.remote_address());
    (handle, tokio::spawn(task.run().instrument(span)))
}
