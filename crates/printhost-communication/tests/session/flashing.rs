use crate::common::{alerts, statuses, Harness, RecordingLink};
use printhost_communication::SessionCommand;
use printhost_core::{AlertKind, FlashError, SessionError, SessionStatus};

#[test]
fn test_flashing_passthrough() {
    let mut h = Harness::ready();
    h.session.begin_flash().unwrap();
    assert!(h.session.is_flashing());

    // printer output before the tool connects is kept for it
    h.session.handle_bytes(b"bootloader ");
    let tool = RecordingLink::default();
    assert!(h.session.attach_tool(Box::new(tool.clone())));
    h.session.handle_bytes(b"ready");
    assert_eq!(
        *tool.sent.lock().unwrap(),
        vec!["bootloader ".to_string(), "ready".to_string()]
    );

    h.session.handle_tool_bytes(b"0 ");
    assert_eq!(h.take_sent(), vec!["0 ".to_string()]);

    assert_eq!(
        h.session.apply(SessionCommand::LevelBed),
        Err(SessionError::Flashing {
            address: crate::common::ADDRESS.to_string()
        })
    );
}

#[test]
fn test_flash_success_waits_for_firmware_start() {
    let mut h = Harness::ready();
    h.session.begin_flash().unwrap();
    h.take_events();

    h.session.finish_flash(Ok(()));
    assert!(!h.session.is_flashing());
    assert_eq!(h.session.status(), SessionStatus::Offline);

    let events = h.take_events();
    assert_eq!(alerts(&events)[0].kind, AlertKind::FirmwareFlashed);
    assert_eq!(
        statuses(&events).last().map(|r| r.status),
        Some(SessionStatus::Offline)
    );

    // the new firmware boots on its own; no restart is requested
    h.feed("start");
    assert!(h.take_sent().is_empty());
    assert_eq!(h.session.status(), SessionStatus::Initializing);
}

#[test]
fn test_flash_failure_alerts() {
    let mut h = Harness::ready();
    h.session.begin_flash().unwrap();
    h.session
        .finish_flash(Err(FlashError::ExitStatus { code: Some(1) }));

    let alerts = alerts(&h.take_events());
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::FirmwareFlashFailed);
    assert!(alerts[0].detail.is_some());
}

#[test]
fn test_flash_rejected_while_busy() {
    let mut h = Harness::ready();
    h.session.start_print("G28").unwrap();
    assert!(matches!(
        h.session.begin_flash(),
        Err(SessionError::NotIdle { .. })
    ));

    let mut h = Harness::ready();
    h.session.begin_flash().unwrap();
    assert!(matches!(
        h.session.begin_flash(),
        Err(SessionError::Flashing { .. })
    ));
}

#[test]
fn test_tool_rejected_when_not_flashing() {
    let mut h = Harness::ready();
    assert!(!h.session.attach_tool(Box::new(RecordingLink::default())));
}

#[test]
fn test_heartbeat_suspended_while_flashing() {
    let mut h = Harness::ready();
    h.session.begin_flash().unwrap();
    for _ in 0..3 {
        assert_eq!(
            h.session.on_heartbeat_tick(),
            printhost_communication::ConnectionWatchState::Suspended
        );
    }
    assert!(!h.session.is_closed());
}
