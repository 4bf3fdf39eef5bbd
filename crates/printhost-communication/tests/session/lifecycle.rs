use crate::common::{statuses, Harness, ADDRESS};
use printhost_communication::firmware::marlin::encode;
use printhost_communication::{ConnectionWatchState, FirmwareValue};
use printhost_core::{RelayEvent, SessionStatus};

#[test]
fn test_first_line_restarts_offline_printer() {
    let mut h = Harness::new();
    h.feed("echo:busy: processing");
    assert_eq!(h.take_sent(), vec!["PRUSA RESET".to_string()]);

    h.feed("echo:busy: processing");
    assert!(h.take_sent().is_empty());
    assert_eq!(h.session.status(), SessionStatus::Offline);
}

#[test]
fn test_init_sequence() {
    let mut h = Harness::new();
    h.feed("start");
    assert_eq!(h.session.status(), SessionStatus::Initializing);
    assert!(h.session.take_init_request());
    assert!(!h.session.take_init_request());
    h.take_sent();

    assert!(h.session.run_init_sequence());
    h.ack(5);
    assert_eq!(
        h.take_sent(),
        vec![
            "M110 N-1".to_string(),
            encode(0, "M115", "").text,
            encode(1, "M113 S3", "").text,
            encode(2, "M155 S1", "").text,
            encode(3, &format!("M117 IP: {}", ADDRESS), "").text,
            encode(4, "M118 initilized", "").text,
        ]
    );

    h.feed("FIRMWARE_NAME:Prusa-Firmware 3.13.2 based on Marlin FIRMWARE_URL:https://github.com/prusa3d/Prusa-Firmware PROTOCOL_VERSION:1.0 MACHINE_TYPE:Prusa i3 MK3S EXTRUDER_COUNT:1");
    h.feed("Cap:AUTOREPORT_TEMP:1");
    h.feed("Cap:EEPROM:0");
    h.ack(1);
    h.feed("echo:initilized");
    assert_eq!(h.session.status(), SessionStatus::Idle);

    let info = h.session.firmware_info();
    assert_eq!(
        info.get("PROTOCOL_VERSION"),
        Some(&FirmwareValue::Text("1.0".to_string()))
    );
    assert!(info.has_capability("AUTOREPORT_TEMP"));
    assert!(!info.has_capability("EEPROM"));

    let reports = statuses(&h.take_events());
    assert_eq!(reports.last().map(|r| r.status), Some(SessionStatus::Idle));
}

#[test]
fn test_start_is_ignored_while_initializing() {
    let mut h = Harness::new();
    h.feed("start");
    assert!(h.session.take_init_request());
    h.feed("start");
    assert!(!h.session.take_init_request());
}

#[test]
fn test_start_drops_running_job() {
    let mut h = Harness::ready();
    h.session.start_print("G28\nG1 X1").unwrap();
    h.ack(1);
    h.feed("start");
    assert!(h.session.job().is_none());
    assert_eq!(h.session.flow().queued_commands_count(), 0);
    assert_eq!(h.session.status(), SessionStatus::Initializing);
}

#[test]
fn test_file_listing() {
    let mut h = Harness::ready();
    assert!(h.session.on_idle_poll_tick());
    assert!(h.take_sent()[0].contains(" M20 L "));

    h.feed("Begin file list");
    h.feed("BENCHY~1.GCO 52311");
    h.feed("NOTES.TXT 12");
    h.feed("CUBE.G 901");
    h.feed("End file list");
    h.ack(1);

    let names: Vec<&str> = h
        .session
        .file_list()
        .iter()
        .map(|f| f.gcode_file_name.as_str())
        .collect();
    assert_eq!(names, vec!["benchy~1.gco", "cube.g"]);

    let events = h.take_events();
    assert!(events.iter().any(|e| matches!(
        e,
        RelayEvent::FileList { file_list, .. } if file_list.len() == 2
    )));
}

#[test]
fn test_idle_poll_only_when_idle() {
    let mut h = Harness::new();
    assert!(!h.session.on_idle_poll_tick());

    let mut h = Harness::ready();
    h.session.start_print("G28").unwrap();
    assert!(!h.session.on_idle_poll_tick());
}

#[test]
fn test_temperature_report() {
    let mut h = Harness::ready();
    h.feed("T:210.5 /215.0 B:60.1 /60.0 T0:210.5 /215.0 @:127 B@:64 P:35.2 A:28.9");
    let snapshot = h.session.temperatures().copied().unwrap();
    assert_eq!(snapshot.heated_bed.target, 60.0);

    let events = h.take_events();
    assert!(matches!(
        events.as_slice(),
        [RelayEvent::Temperature { remote_address, .. }] if remote_address == ADDRESS
    ));
}

#[test]
fn test_heartbeat_loss_takes_session_offline() {
    let mut h = Harness::ready();
    assert_eq!(h.session.on_heartbeat_tick(), ConnectionWatchState::Healthy);
    assert_eq!(h.session.on_heartbeat_tick(), ConnectionWatchState::Lost);
    assert_eq!(h.session.status(), SessionStatus::Offline);
    assert!(h.session.is_closed());

    let reports = statuses(&h.take_events());
    assert_eq!(reports.last().map(|r| r.status), Some(SessionStatus::Offline));

    // timers are inert from now on
    assert!(!h.session.on_stall_tick());
    assert!(!h.session.on_idle_poll_tick());
    assert!(!h.session.run_init_sequence());
    assert_eq!(h.session.on_heartbeat_tick(), ConnectionWatchState::Lost);
    assert!(h.take_sent().is_empty());
}

#[test]
fn test_any_line_counts_as_heartbeat() {
    let mut h = Harness::ready();
    for _ in 0..3 {
        h.feed("echo:busy: processing");
        assert_eq!(h.session.on_heartbeat_tick(), ConnectionWatchState::Healthy);
    }
}

#[test]
fn test_chunk_tail_is_emitted_as_a_line() {
    let mut h = Harness::ready();
    h.session.handle_bytes(b"Begin file list\nCUBE.");
    h.session.handle_bytes(b"G 10\nEnd file list\n");
    assert!(h.session.file_list().is_empty());

    h.session.handle_bytes(b"Begin file list\nCUBE.G 10\nEnd file list\n");
    assert_eq!(h.session.file_list().len(), 1);
}

#[test]
fn test_silent_connection_goes_offline_on_first_check() {
    let mut h = Harness::new();
    assert_eq!(h.session.on_heartbeat_tick(), ConnectionWatchState::Lost);
    assert_eq!(h.session.status(), SessionStatus::Offline);
    assert!(h.session.is_closed());
}
