//! Tests for firmware::marlin line encoding

use printhost_communication::firmware::marlin::{checksum, decode, encode, CommandCreator};
use printhost_communication::Command;
use proptest::prelude::*;

#[test]
fn test_known_checksum() {
    // N0G28 = 0x4e ^ 0x30 ^ 0x47 ^ 0x32 ^ 0x38
    assert_eq!(checksum(0, "G28", ""), 0x4e ^ 0x30 ^ 0x47 ^ 0x32 ^ 0x38);
    assert_eq!(encode(0, "G28", "").text, format!("N0 G28 *{}", checksum(0, "G28", "")));
}

#[test]
fn test_creator_numbering_follows_render_order() {
    let mut creator = CommandCreator::new();
    assert_eq!(creator.render(&Command::ResetLineNumber), "M110 N-1");
    assert!(creator.render(&Command::firmware_info()).starts_with("N0 M115 *"));
    assert_eq!(creator.render(&Command::raw("PRUSA RESET")), "PRUSA RESET");
    assert!(creator.render(&Command::report_temperatures()).starts_with("N1 M105 *"));
    assert_eq!(creator.get_line_number(), 2);
}

fn command_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("G28".to_string()),
        Just("M105".to_string()),
        (0..500i32).prop_map(|x| format!("G1 X{} Y{}", x, x * 2)),
        "[GM][0-9]{1,3}( [A-Z][0-9]{1,4}){0,3}",
    ]
}

proptest! {
    #[test]
    fn prop_encoded_lines_decode(seq in 0u32..100_000, command in command_strategy(), params in "[/A-Za-z0-9._]{0,12}") {
        let line = encode(seq, &command, &params);
        let decoded = decode(&line.text).unwrap();
        prop_assert_eq!(decoded.seq, seq);
        prop_assert!(decoded.is_valid());
        prop_assert_eq!(decoded.checksum, checksum(seq, &command, &params));
    }

    #[test]
    fn prop_line_number_changes_line_not_command(
        seq in 0u32..100_000,
        step in 1u32..1_000,
        command in command_strategy(),
        params in "[/A-Za-z0-9._]{0,12}",
    ) {
        let first = encode(seq, &command, &params);
        let second = encode(seq + step, &command, &params);
        prop_assert_ne!(&first.text, &second.text);

        let first = decode(&first.text).unwrap();
        let second = decode(&second.text).unwrap();
        prop_assert_eq!(&first.command, &second.command);
        prop_assert_eq!(&first.command, &command);
        prop_assert_eq!(&first.params, &second.params);
    }

    #[test]
    fn prop_checksum_is_xor_of_bytes(seq in 0u32..100_000, command in command_strategy()) {
        let expected = format!("N{}{}", seq, command).bytes().fold(0u8, |acc, b| acc ^ b);
        prop_assert_eq!(checksum(seq, &command, ""), expected);
    }

    #[test]
    fn prop_creator_numbers_are_consecutive(count in 1usize..50) {
        let mut creator = CommandCreator::new();
        for expected in 0..count as u32 {
            let line = creator.create_gcode_command("G4", "");
            prop_assert_eq!(line.seq, expected);
        }
        creator.reset_line_number();
        prop_assert_eq!(creator.create_gcode_command("G4", "").seq, 0);
    }
}
