use crate::common::{alerts, statuses, Harness};
use printhost_communication::firmware::marlin::encode;
use printhost_communication::SessionCommand;
use printhost_core::{AlertKind, SessionError, SessionStatus};

#[test]
fn test_three_line_print() {
    let mut h = Harness::ready();
    h.session.start_print("G28\nG1 X10\nM400").unwrap();

    assert_eq!(h.session.status(), SessionStatus::Printing);
    assert_eq!(h.take_sent(), vec!["M110 N-1".to_string()]);

    h.ack(1);
    assert_eq!(h.take_sent(), vec![encode(0, "G28", "").text]);
    assert!(h.last_sent().is_none());

    h.ack(1);
    assert_eq!(h.take_sent(), vec![encode(1, "G1 X10", "").text]);
    h.ack(1);
    assert_eq!(h.take_sent(), vec![encode(2, "M400", "").text]);

    h.ack(1);
    assert!(h.session.job().is_none());
    assert_eq!(h.session.status(), SessionStatus::Idle);
    assert_eq!(h.session.percent(), 0);

    let events = h.take_events();
    let reports = statuses(&events);
    assert_eq!(reports.first().map(|r| r.status), Some(SessionStatus::Printing));
    assert_eq!(reports.first().and_then(|r| r.percent), Some(0));
    let last = reports.last().unwrap();
    assert_eq!(last.status, SessionStatus::Idle);
    assert_eq!(last.percent, Some(0));

    let alerts = alerts(&events);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::PrintFinished);
}

#[test]
fn test_first_job_line_is_numbered_zero() {
    let mut h = Harness::ready();
    h.session.start_print("; header\nG28\n").unwrap();
    h.ack(1);
    assert!(h.last_sent().unwrap().starts_with("N0 G28 *"));
}

#[test]
fn test_resend_rewinds_job() {
    let mut h = Harness::ready();
    let program: Vec<String> = (0..20).map(|i| format!("G1 X{}", i)).collect();
    h.session.start_print(&program.join("\n")).unwrap();
    h.ack(1);
    h.ack(11);
    assert_eq!(h.session.job().unwrap().cursor(), 12);
    h.take_sent();

    h.feed("Resend: 5");
    h.ack(1);
    assert_eq!(h.take_sent(), vec![encode(5, "G1 X5", "").text]);
    assert_eq!(h.session.job().unwrap().cursor(), 6);

    h.ack(1);
    assert_eq!(h.take_sent(), vec![encode(6, "G1 X6", "").text]);
}

#[test]
fn test_percent_notifications_are_throttled() {
    let mut h = Harness::ready();
    let program: Vec<String> = (0..1000).map(|i| format!("G1 E{}", i)).collect();
    h.session.start_print(&program.join("\n")).unwrap();
    h.take_events();

    h.ack(1000);
    h.ack(1);
    assert_eq!(h.session.status(), SessionStatus::Idle);

    let percents: Vec<u8> = statuses(&h.take_events())
        .iter()
        .filter(|r| r.status == SessionStatus::Printing)
        .filter_map(|r| r.percent)
        .collect();
    assert_eq!(percents, (1..=100).collect::<Vec<u8>>());
}

#[test]
fn test_ack_fragments_advance_job() {
    let mut h = Harness::ready();
    h.session.start_print("G28\nG1 X1\nG1 X2").unwrap();
    h.ack(1);
    h.feed("o");
    assert_eq!(h.last_sent().unwrap(), encode(1, "G1 X1", "").text);
    h.feed("kk");
    assert_eq!(h.last_sent().unwrap(), encode(2, "G1 X2", "").text);
}

#[test]
fn test_commands_wait_for_job() {
    let mut h = Harness::ready();
    h.session.start_print("G28\nM400").unwrap();
    h.take_sent();
    h.ack(1);
    h.session
        .apply(SessionCommand::HomeAxis("ALL".to_string()))
        .unwrap();
    assert_eq!(h.take_sent(), vec![encode(0, "G28", "").text]);

    h.ack(1);
    assert_eq!(h.take_sent(), vec![encode(1, "M400", "").text]);

    h.ack(1);
    assert_eq!(h.take_sent(), vec![encode(2, "G28 W", "").text]);
    assert_eq!(h.session.flow().queued_commands_count(), 1);
}

#[test]
fn test_print_requires_idle() {
    let mut h = Harness::new();
    assert!(matches!(
        h.session.start_print("G28"),
        Err(SessionError::NotIdle { .. })
    ));

    let mut h = Harness::ready();
    assert!(matches!(
        h.session.start_print("; only a comment\n\n"),
        Err(SessionError::InvalidCommand { .. })
    ));
    h.session.start_print("G28").unwrap();
    assert!(matches!(
        h.session.start_print("G28"),
        Err(SessionError::NotIdle { .. })
    ));
}

#[test]
fn test_progress_reports_only_while_printing() {
    let mut h = Harness::ready();
    h.feed("NORMAL MODE: Percent done: 50; print time remaining in mins: 10");
    assert!(statuses(&h.take_events()).is_empty());

    h.session.start_print("G28\nG1 X1").unwrap();
    h.take_events();
    h.feed("NORMAL MODE: Percent done: 42; print time remaining in mins: 73");
    let reports = statuses(&h.take_events());
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].percent, Some(42));
    assert_eq!(reports[0].time_remaining, Some(73));
}

#[test]
fn test_stall_watchdog_retransmits() {
    let mut h = Harness::ready();
    h.session.start_print("G28\nG1 X1\nG1 X2").unwrap();
    h.ack(2);
    h.take_sent();

    // progress since the last check
    assert!(!h.session.on_stall_tick());
    assert!(h.session.on_stall_tick());
    assert_eq!(h.take_sent(), vec![encode(1, "G1 X1", "").text]);
    assert_eq!(h.session.job().unwrap().cursor(), 2);
}

#[test]
fn test_move_axis_is_relative() {
    let mut h = Harness::ready();
    h.session
        .apply(SessionCommand::MoveAxis {
            axis: "z".to_string(),
            position: 10.0,
            rate: None,
        })
        .unwrap();
    h.ack(2);
    let sent = h.take_sent();
    assert_eq!(sent.len(), 3);
    assert!(sent[0].contains(" G91 "));
    assert!(sent[1].contains(" G1 Z10 F100 "));
    assert!(sent[2].contains(" G90 "));

    assert!(matches!(
        h.session.apply(SessionCommand::MoveAxis {
            axis: "Q".to_string(),
            position: 1.0,
            rate: None,
        }),
        Err(SessionError::InvalidCommand { .. })
    ));
}

#[test]
fn test_stall_watchdog_retransmits_lost_gate_ack() {
    let mut h = Harness::ready();
    h.session.start_print("G28\nG1 X1").unwrap();
    assert_eq!(h.take_sent(), vec!["M110 N-1".to_string()]);

    // the reset just went out
    assert!(!h.session.on_stall_tick());
    assert!(h.session.on_stall_tick());
    assert_eq!(h.take_sent(), vec!["M110 N-1".to_string()]);
    assert_eq!(h.session.status(), SessionStatus::Printing);
    assert!(h.session.job().is_none());

    h.ack(1);
    assert_eq!(h.take_sent(), vec![encode(0, "G28", "").text]);
    assert!(h.session.job().is_some());
    assert!(!h.session.on_stall_tick());
}

#[test]
fn test_ack_fragment_opens_job_gate() {
    let mut h = Harness::ready();
    h.session.start_print("G28\nG1 X1").unwrap();
    h.take_sent();
    h.feed("o");
    assert_eq!(h.take_sent(), vec![encode(0, "G28", "").text]);
}

#[test]
fn test_stray_initialized_echo_does_not_end_print() {
    let mut h = Harness::ready();
    h.session.start_print("G28\nG1 X1").unwrap();
    h.ack(1);
    h.feed("echo:initilized");
    assert_eq!(h.session.status(), SessionStatus::Printing);
    assert!(h.session.job().is_some());
}
