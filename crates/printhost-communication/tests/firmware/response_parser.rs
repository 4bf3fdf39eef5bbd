//! Tests for firmware::marlin::response_parser

use printhost_communication::firmware::marlin::{parse_file_entry, GCODE_SUFFIXES};
use printhost_communication::{MarlinResponse, MarlinResponseParser};

#[test]
fn test_parse_echo_is_message() {
    let parser = MarlinResponseParser::new();
    assert_eq!(
        parser.parse("echo:busy: processing", false),
        Some(MarlinResponse::Message("echo:busy: processing".to_string()))
    );
}

#[test]
fn test_resend_without_number_is_message() {
    let parser = MarlinResponseParser::new();
    assert!(matches!(
        parser.parse("Resend: x", false),
        Some(MarlinResponse::Message(_))
    ));
}

#[test]
fn test_suffixes() {
    for suffix in GCODE_SUFFIXES {
        let name = format!("FILE{} 10", suffix.to_uppercase());
        assert!(parse_file_entry(&name).is_some(), "{}", name);
    }
    assert!(parse_file_entry("FILE.GCODE.BAK 10").is_none());
}

#[test]
fn test_display() {
    assert_eq!(MarlinResponse::Ok.to_string(), "ok");
    assert_eq!(MarlinResponse::Resend(7).to_string(), "resend:7");
}
