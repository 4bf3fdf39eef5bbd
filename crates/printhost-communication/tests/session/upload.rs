use crate::common::{alerts, statuses, Harness};
use printhost_communication::firmware::marlin::encode;
use printhost_communication::SessionCommand;
use printhost_core::{AlertKind, SessionError, SessionStatus};

fn start_upload(h: &mut Harness) {
    h.session
        .apply(SessionCommand::WriteToSd {
            gcode: "G28\nG1 X5 ; move".to_string(),
            filename: "part.gcode".to_string(),
        })
        .unwrap();
    assert_eq!(h.session.status(), SessionStatus::Uploading);
    assert_eq!(h.take_sent(), vec!["M110 N-1".to_string()]);

    h.ack(4);
    assert_eq!(
        h.take_sent(),
        vec![
            encode(0, "M28", "/part.gcode").text,
            encode(1, "G28", "").text,
            encode(2, "G1 X5", "").text,
            encode(3, "M29", "").text,
        ]
    );
}

fn assert_upload_finished(h: &mut Harness) {
    assert_eq!(h.session.status(), SessionStatus::Idle);
    assert_eq!(h.take_sent(), vec!["M110 N-1".to_string()]);

    let events = h.take_events();
    let alerts = alerts(&events);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::UploadFinished);
    assert_eq!(alerts[0].detail.as_deref(), Some("Finished uploading part.gcode."));
    assert_eq!(
        statuses(&events).last().map(|r| r.status),
        Some(SessionStatus::Idle)
    );
}

#[test]
fn test_upload_ack_then_saved() {
    let mut h = Harness::ready();
    start_upload(&mut h);

    h.ack(1);
    assert!(h.session.job().is_none());
    assert_eq!(h.session.status(), SessionStatus::Uploading);
    assert!(h.take_sent().is_empty());

    h.feed("Done saving file.");
    assert_upload_finished(&mut h);
}

#[test]
fn test_upload_saved_then_ack() {
    let mut h = Harness::ready();
    start_upload(&mut h);

    h.feed("Done saving file.");
    assert_eq!(h.session.status(), SessionStatus::Uploading);
    assert!(h.session.job().is_some());

    h.ack(1);
    assert_upload_finished(&mut h);
}

#[test]
fn test_stray_save_confirmation_is_ignored() {
    let mut h = Harness::ready();
    h.feed("Done saving file.");
    assert_eq!(h.session.status(), SessionStatus::Idle);
    assert!(alerts(&h.take_events()).is_empty());
}

#[test]
fn test_upload_rejects_bad_filename() {
    let mut h = Harness::ready();
    for filename in ["", "  ", "my part.gcode"] {
        assert!(matches!(
            h.session.write_to_sd("G28", filename),
            Err(SessionError::InvalidCommand { .. })
        ));
    }
    assert_eq!(h.session.status(), SessionStatus::Idle);
}
