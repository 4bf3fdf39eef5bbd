use async_trait::async_trait;
use printhost_communication::session::task::spawn_session;
use printhost_communication::{
    ChannelRelay, DeployError, RelayDispatcher, SessionHandle, SessionRegistry, SessionTimings,
};
use printhost_core::{
    FetchError, GcodeFetcher, ManifestAction, ManifestEntry, RelayEvent, SessionStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Notify;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(3);

fn fast_timings() -> SessionTimings {
    SessionTimings {
        heartbeat: Duration::from_millis(500),
        stall_watchdog: Duration::from_secs(1),
        idle_poll: Duration::from_secs(60),
        init_delay: Duration::from_millis(20),
        ..SessionTimings::default()
    }
}

// Printer side of an in-memory connection
struct MockPrinter {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl MockPrinter {
    async fn expect_line(&mut self) -> String {
        timeout(WAIT, self.lines.next_line())
            .await
            .expect("timed out waiting for the gateway")
            .unwrap()
            .expect("gateway closed the connection")
    }

    async fn say(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .unwrap();
    }

    /// Boot and answer the init batch
    async fn boot(&mut self) {
        self.say("start").await;
        assert_eq!(self.expect_line().await, "PRUSA RESET");
        assert_eq!(self.expect_line().await, "M110 N-1");
        for _ in 0..5 {
            self.say("ok").await;
            self.expect_line().await;
        }
        self.say("ok").await;
        self.say("echo:initilized").await;
    }
}

fn connect(
    timings: SessionTimings,
) -> (
    MockPrinter,
    SessionHandle,
    tokio::task::JoinHandle<printhost_communication::Session>,
    UnboundedReceiver<RelayEvent>,
) {
    let (gateway_end, printer_end) = tokio::io::duplex(4096);
    let (relay, events) = ChannelRelay::new();
    let (handle, join) = spawn_session(gateway_end, "10.0.0.7", Arc::new(relay), timings, None);
    let (reader, writer) = tokio::io::split(printer_end);
    let printer = MockPrinter {
        lines: BufReader::new(reader).lines(),
        writer,
    };
    (printer, handle, join, events)
}

async fn wait_for_status(handle: &SessionHandle, status: SessionStatus) {
    timeout(WAIT, async {
        loop {
            if handle.snapshot().await.unwrap().status == status {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("status not reached");
}

struct MapFetcher {
    files: HashMap<String, String>,
}

#[async_trait]
impl GcodeFetcher for MapFetcher {
    async fn fetch_gcode_file(&self, id: &str) -> Result<String, FetchError> {
        self.files.get(id).cloned().ok_or_else(|| FetchError::NotFound {
            id: id.to_string(),
        })
    }
}

// Store that never answers
struct StalledFetcher {
    entered: Arc<Notify>,
}

#[async_trait]
impl GcodeFetcher for StalledFetcher {
    async fn fetch_gcode_file(&self, _id: &str) -> Result<String, FetchError> {
        self.entered.notify_one();
        std::future::pending().await
    }
}

fn manifest() -> Vec<ManifestEntry> {
    vec![
        ManifestEntry {
            action: ManifestAction::Delete,
            id: None,
            gcode_file_name: "old.gcode".to_string(),
        },
        ManifestEntry {
            action: ManifestAction::Upload,
            id: Some("1".to_string()),
            gcode_file_name: "a.gcode".to_string(),
        },
        ManifestEntry {
            action: ManifestAction::Upload,
            id: Some("2".to_string()),
            gcode_file_name: "b.gcode".to_string(),
        },
    ]
}

#[tokio::test]
async fn test_task_initializes_printer() {
    let (mut printer, handle, _join, mut events) = connect(fast_timings());
    printer.boot().await;
    wait_for_status(&handle, SessionStatus::Idle).await;

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.remote_address, "10.0.0.7");
    assert_eq!(snapshot.queued_commands, 0);

    let first = events.recv().await.unwrap();
    assert!(matches!(
        first,
        RelayEvent::Status { status, .. } if status.status == SessionStatus::Offline
    ));
}

#[tokio::test]
async fn test_task_ends_on_silence() {
    let (_printer, handle, join, _events) = connect(fast_timings());
    let session = timeout(WAIT, join).await.unwrap().unwrap();
    assert_eq!(session.status(), SessionStatus::Offline);
    assert!(session.is_closed());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(handle.is_closed());
    assert!(handle.snapshot().await.is_err());
}

#[tokio::test]
async fn test_task_ends_on_disconnect() {
    let (printer, _handle, join, _events) = connect(fast_timings());
    drop(printer);
    let session = timeout(WAIT, join).await.unwrap().unwrap();
    assert_eq!(session.status(), SessionStatus::Offline);
}

#[tokio::test]
async fn test_shutdown_stops_task() {
    let (_printer, handle, join, _events) = connect(fast_timings());
    handle.shutdown();
    assert!(timeout(WAIT, join).await.unwrap().is_ok());
}

#[tokio::test]
async fn test_deploy_through_handle() {
    let (mut printer, handle, _join, _events) = connect(fast_timings());
    printer.boot().await;
    wait_for_status(&handle, SessionStatus::Idle).await;

    let fetcher = MapFetcher {
        files: HashMap::from([
            ("1".to_string(), "G28".to_string()),
            ("2".to_string(), "M400".to_string()),
        ]),
    };
    assert_eq!(handle.deploy(manifest(), &fetcher).await.unwrap(), 2);
    assert_eq!(handle.snapshot().await.unwrap().status, SessionStatus::Uploading);

    assert!(printer.expect_line().await.contains(" M30 /old.gcode*"));
    printer.say("ok").await;
    assert_eq!(printer.expect_line().await, "M110 N-1");
    printer.say("ok").await;
    assert!(printer.expect_line().await.starts_with("N0 M28 /a.gcode*"));
}

#[tokio::test]
async fn test_deploy_fetch_failure_returns_to_idle() {
    let (mut printer, handle, _join, _events) = connect(fast_timings());
    printer.boot().await;
    wait_for_status(&handle, SessionStatus::Idle).await;

    let fetcher = MapFetcher {
        files: HashMap::from([("1".to_string(), "G28".to_string())]),
    };
    match handle.deploy(manifest(), &fetcher).await {
        Err(DeployError::Fetch { source, fetched }) => {
            assert_eq!(source, FetchError::NotFound { id: "2".to_string() });
            assert_eq!(fetched.len(), 1);
            assert_eq!(fetched[0].file_name, "a.gcode");
        }
        other => panic!("unexpected deploy result: {:?}", other),
    }
    wait_for_status(&handle, SessionStatus::Idle).await;
}

#[tokio::test]
async fn test_slow_deploy_does_not_hold_relay_input() {
    let (mut printer, handle, _join, _events) = connect(fast_timings());
    printer.boot().await;
    wait_for_status(&handle, SessionStatus::Idle).await;

    let registry = Arc::new(SessionRegistry::new());
    registry.insert(handle.clone());
    let entered = Arc::new(Notify::new());
    let dispatcher = Arc::new(RelayDispatcher::new(
        registry,
        Arc::new(StalledFetcher {
            entered: entered.clone(),
        }),
    ));

    let input = concat!(
        r#"{"remoteAddress":"10.0.0.7","event":"deploy","manifest":["#,
        r#"{"action":"delete","gcodeFileName":"old.gcode"},"#,
        r#"{"action":"upload","id":"1","gcodeFileName":"a.gcode"}]}"#,
        "\n",
        r#"{"remoteAddress":"10.9.9.9","event":"levelBed"}"#,
        "\n",
    );
    timeout(WAIT, dispatcher.serve_lines(input.as_bytes()))
        .await
        .expect("relay input blocked behind the deploy")
        .unwrap();

    timeout(WAIT, entered.notified()).await.unwrap();
    assert!(printer.expect_line().await.contains(" M30 /old.gcode*"));
    assert_eq!(handle.snapshot().await.unwrap().status, SessionStatus::Processing);
}
