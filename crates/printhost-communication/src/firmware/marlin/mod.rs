//! Marlin/Prusa firmware protocol
//!
//! Line encoding, command vocabulary and response classification.

pub mod command_creator;
pub mod response_parser;

pub use command_creator::{
    checksum, decode, encode, strip_command, Command, CommandCreator, DecodedLine, EncodedLine,
    DEFAULT_MOVE_RATE, FIRMWARE_RESTART, INIT_SENTINEL, RESET_LINE_NUMBER,
};
pub use response_parser::{
    is_ack_fragment, parse_file_entry, parse_temperature, MarlinResponse, MarlinResponseParser,
    GCODE_SUFFIXES,
};
