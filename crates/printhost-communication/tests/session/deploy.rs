use crate::common::{alerts, Harness};
use printhost_communication::UploadEntry;
use printhost_core::{AlertKind, ManifestAction, ManifestEntry, SessionStatus};

fn entry(action: ManifestAction, id: Option<&str>, name: &str) -> ManifestEntry {
    ManifestEntry {
        action,
        id: id.map(str::to_string),
        gcode_file_name: name.to_string(),
    }
}

fn upload(id: &str, name: &str) -> UploadEntry {
    UploadEntry {
        file_id: Some(id.to_string()),
        file_name: name.to_string(),
        gcode: "G28\nM400".to_string(),
    }
}

/// Gate, open, two lines, close, save
fn finish_one_upload(h: &mut Harness) {
    h.ack(5);
    h.feed("Done saving file.");
}

#[test]
fn test_deploy_deletes_before_uploads() {
    let mut h = Harness::ready();
    let uploads = h
        .session
        .begin_deploy(&[
            entry(ManifestAction::Delete, None, "old.gcode"),
            entry(ManifestAction::Upload, Some("1"), "a.gcode"),
            entry(ManifestAction::Upload, Some("2"), "b.gcode"),
        ])
        .unwrap();
    assert_eq!(uploads.len(), 2);
    assert_eq!(h.session.status(), SessionStatus::Processing);

    let sent = h.take_sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains(" M30 /old.gcode*"));

    h.session
        .queue_uploads(vec![upload("1", "a.gcode"), upload("2", "b.gcode")]);
    assert_eq!(h.session.status(), SessionStatus::Uploading);
    assert_eq!(h.session.pending_uploads(), 1);
    // the gate waits behind the delete
    assert!(h.take_sent().is_empty());

    h.ack(1);
    assert_eq!(h.take_sent(), vec!["M110 N-1".to_string()]);
    h.ack(1);
    assert!(h.last_sent().unwrap().contains(" M28 /a.gcode*"));

    h.ack(4);
    h.feed("Done saving file.");
    assert_eq!(h.session.status(), SessionStatus::Uploading);
    assert_eq!(h.session.pending_uploads(), 0);
    assert_eq!(h.last_sent().unwrap(), "M110 N-1");

    finish_one_upload(&mut h);
    assert_eq!(h.session.status(), SessionStatus::Idle);

    let finished: Vec<String> = alerts(&h.take_events())
        .into_iter()
        .filter(|a| a.kind == AlertKind::UploadFinished)
        .filter_map(|a| a.detail)
        .collect();
    assert_eq!(
        finished,
        vec![
            "Finished uploading a.gcode.".to_string(),
            "Finished uploading b.gcode.".to_string()
        ]
    );
}

#[test]
fn test_deploy_without_uploads_returns_to_idle() {
    let mut h = Harness::ready();
    let uploads = h
        .session
        .begin_deploy(&[entry(ManifestAction::Delete, None, "old.gcode")])
        .unwrap();
    assert!(uploads.is_empty());
    h.session.queue_uploads(Vec::new());
    assert_eq!(h.session.status(), SessionStatus::Idle);
}

#[test]
fn test_abort_deploy() {
    let mut h = Harness::ready();
    h.session
        .begin_deploy(&[entry(ManifestAction::Upload, Some("1"), "a.gcode")])
        .unwrap();
    h.session.abort_deploy();
    assert_eq!(h.session.status(), SessionStatus::Idle);

    // late uploads are discarded
    h.session.queue_uploads(vec![upload("1", "a.gcode")]);
    assert_eq!(h.session.status(), SessionStatus::Idle);
    assert!(h.session.job().is_none());
    assert!(!h.session.has_staged_job());
}

#[test]
fn test_deploy_requires_idle() {
    let mut h = Harness::ready();
    h.session.start_print("G28").unwrap();
    assert!(h
        .session
        .begin_deploy(&[entry(ManifestAction::Delete, None, "x.gcode")])
        .is_err());
}

#[test]
fn test_firmware_restart_drops_pending_uploads() {
    let mut h = Harness::ready();
    h.session
        .begin_deploy(&[
            entry(ManifestAction::Upload, Some("1"), "a.gcode"),
            entry(ManifestAction::Upload, Some("2"), "b.gcode"),
        ])
        .unwrap();
    h.session
        .queue_uploads(vec![upload("1", "a.gcode"), upload("2", "b.gcode")]);
    assert_eq!(h.session.pending_uploads(), 1);

    h.feed("start");
    assert_eq!(h.session.status(), SessionStatus::Initializing);
    assert_eq!(h.session.pending_uploads(), 0);

    assert!(h.session.take_init_request());
    assert!(h.session.run_init_sequence());
    h.ack(6);
    h.feed("echo:initilized");
    assert_eq!(h.session.status(), SessionStatus::Idle);
    h.take_sent();

    h.session.write_to_sd("G28", "x.gcode").unwrap();
    h.ack(4);
    h.feed("Done saving file.");
    assert_eq!(h.session.status(), SessionStatus::Idle);
    assert_eq!(h.last_sent().unwrap(), "M110 N-1");
    assert!(!h
        .take_sent()
        .iter()
        .any(|line| line.contains("/b.gcode")));
}
