//! Marlin Command Creator
//!
//! Builds the line-numbered, checksummed command format accepted by
//! Marlin/Prusa firmware and the logical commands the gateway sends.
//!
//! A numbered line looks like `N<seq> <command> <params>*<checksum>`. The
//! checksum is the XOR of every byte of `N<seq><command><params>`, where the
//! command has been trimmed, stripped of a leading `$` and of any `*` suffix.
//! `params` never contains whitespace; the last space before `*` separates it
//! from the command.

use std::fmt;

/// Line number reset command; the firmware expects line 0 next
pub const RESET_LINE_NUMBER: &str = "M110 N-1";

/// Literal sent (unnumbered) to make the firmware reboot
pub const FIRMWARE_RESTART: &str = "PRUSA RESET";

/// Text echoed by the firmware once the init batch has been processed
pub const INIT_SENTINEL: &str = "initilized";

/// Default feed rate for axis moves
pub const DEFAULT_MOVE_RATE: f64 = 100.0;

/// Strip a raw command down to the text covered by the checksum
pub fn strip_command(command: &str) -> &str {
    let trimmed = command.trim();
    let trimmed = trimmed.strip_prefix('$').unwrap_or(trimmed);
    match trimmed.find('*') {
        Some(idx) => &trimmed[..idx],
        None => trimmed,
    }
}

/// XOR checksum over `N<seq><stripped command><params>`
pub fn checksum(seq: u32, command: &str, params: &str) -> u8 {
    format!("N{}{}{}", seq, strip_command(command), params)
        .bytes()
        .fold(0u8, |acc, b| acc ^ b)
}

/// A command rendered for the wire with its line number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedLine {
    /// Line number embedded in the text
    pub seq: u32,
    /// Full line text, without terminator
    pub text: String,
}

impl fmt::Display for EncodedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Encode a command as `N<seq> <command> <params>*<checksum>`
pub fn encode(seq: u32, command: &str, params: &str) -> EncodedLine {
    EncodedLine {
        seq,
        text: format!(
            "N{} {} {}*{}",
            seq,
            command,
            params,
            checksum(seq, command, params)
        ),
    }
}

/// The parts of a numbered line read back from its text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLine {
    /// Line number
    pub seq: u32,
    /// Command text
    pub command: String,
    /// Parameter text (may be empty)
    pub params: String,
    /// Checksum carried by the line
    pub checksum: u8,
}

impl DecodedLine {
    /// Recompute the checksum from the decoded parts and compare
    pub fn is_valid(&self) -> bool {
        checksum(self.seq, &self.command, &self.params) == self.checksum
    }
}

/// Decode a numbered line produced by [`encode`]
pub fn decode(line: &str) -> Option<DecodedLine> {
    let rest = line.trim_end().strip_prefix('N')?;
    let (seq_text, rest) = rest.split_once(' ')?;
    let seq = seq_text.parse().ok()?;
    let star = rest.rfind('*')?;
    let checksum = rest[star + 1..].parse().ok()?;
    let (command, params) = rest[..star].rsplit_once(' ')?;

    Some(DecodedLine {
        seq,
        command: command.to_string(),
        params: params.to_string(),
        checksum,
    })
}

/// A command waiting for transmission
///
/// Numbered commands receive their line number when they are first put on
/// the wire, so line numbers follow transmission order.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// A command that gets a line number and checksum
    Numbered {
        /// Command text
        command: String,
        /// Parameters appended after the command (no whitespace)
        params: String,
    },
    /// A literal line sent as-is
    Raw(String),
    /// `M110 N-1`; restarts the line counter at 0
    ResetLineNumber,
}

impl Command {
    /// Numbered command without parameters
    pub fn numbered(command: impl Into<String>) -> Self {
        Self::Numbered {
            command: command.into(),
            params: String::new(),
        }
    }

    /// Numbered command with a parameter word
    pub fn with_params(command: impl Into<String>, params: impl Into<String>) -> Self {
        Self::Numbered {
            command: command.into(),
            params: params.into(),
        }
    }

    /// Literal line
    pub fn raw(text: impl Into<String>) -> Self {
        Self::Raw(text.into())
    }

    /// M115: firmware info and capabilities
    pub fn firmware_info() -> Self {
        Self::numbered("M115")
    }

    /// M113: host keepalive interval
    pub fn host_keepalive(seconds: u32) -> Self {
        Self::numbered(format!("M113 S{}", seconds))
    }

    /// M155: temperature auto-report interval
    pub fn temperature_auto_report(seconds: u32) -> Self {
        Self::numbered(format!("M155 S{}", seconds))
    }

    /// M105: one-shot temperature report
    pub fn report_temperatures() -> Self {
        Self::numbered("M105")
    }

    /// M117: LCD message
    pub fn lcd_message(message: &str) -> Self {
        Self::numbered(format!("M117 {}", message))
    }

    /// M118: serial echo
    pub fn echo(message: &str) -> Self {
        Self::numbered(format!("M118 {}", message))
    }

    /// M119: endstop states
    pub fn endstop_states() -> Self {
        Self::numbered("M119")
    }

    /// M104: hotend target temperature
    pub fn set_hotend_temperature(celsius: f64) -> Self {
        Self::numbered(format!("M104 S{}", celsius))
    }

    /// M140: bed target temperature
    pub fn set_bed_temperature(celsius: f64) -> Self {
        Self::numbered(format!("M140 S{}", celsius))
    }

    /// G28 for the given axis selection.
    ///
    /// `ALL` homes without bed calibration (`G28 W`), `XY`/`YX` homes both
    /// planar axes, an empty selection homes everything.
    pub fn home_axis(axis: &str) -> Self {
        let axis = axis.trim().to_ascii_uppercase();
        match axis.as_str() {
            "" => Self::numbered("G28"),
            "ALL" => Self::numbered("G28 W"),
            "XY" | "YX" => Self::numbered("G28 X Y"),
            other => {
                let words: Vec<String> = other
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .map(String::from)
                    .collect();
                Self::numbered(format!("G28 {}", words.join(" ")))
            }
        }
    }

    /// G90: absolute positioning
    pub fn absolute_positioning() -> Self {
        Self::numbered("G90")
    }

    /// G91: relative positioning
    pub fn relative_positioning() -> Self {
        Self::numbered("G91")
    }

    /// G1 move on one axis
    pub fn linear_move(axis: &str, position: f64, rate: f64) -> Self {
        Self::numbered(format!(
            "G1 {}{} F{}",
            axis.trim().to_ascii_uppercase(),
            position,
            rate
        ))
    }

    /// G80: mesh bed leveling
    pub fn bed_leveling() -> Self {
        Self::numbered("G80")
    }

    /// M600: filament change
    pub fn filament_change() -> Self {
        Self::numbered("M600")
    }

    /// M20 L: long SD listing
    pub fn list_sd_card() -> Self {
        Self::numbered("M20 L")
    }

    /// M28: open an SD file for writing
    pub fn start_sd_write(filename: &str) -> Self {
        Self::with_params("M28", sd_path(filename))
    }

    /// M29: close the SD file being written
    pub fn stop_sd_write() -> Self {
        Self::numbered("M29")
    }

    /// M30: delete an SD file
    pub fn delete_sd_file(filename: &str) -> Self {
        Self::with_params("M30", sd_path(filename))
    }

    /// Firmware reboot literal
    pub fn firmware_restart() -> Self {
        Self::raw(FIRMWARE_RESTART)
    }
}

fn sd_path(filename: &str) -> String {
    let name: String = filename
        .trim()
        .trim_start_matches('/')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    format!("/{}", name)
}

/// Marlin command creator
///
/// Owns the line number counter and renders [`Command`]s to wire text.
#[derive(Debug, Default)]
pub struct CommandCreator {
    /// Next line number to assign
    line_number: u32,
}

impl CommandCreator {
    /// Create a new command creator starting at line 0
    pub fn new() -> Self {
        Self { line_number: 0 }
    }

    /// Encode a command with the next line number
    pub fn create_gcode_command(&mut self, command: &str, params: &str) -> EncodedLine {
        let line = encode(self.line_number, command, params);
        self.line_number += 1;
        line
    }

    /// Restart numbering at 0 and return the reset command text
    pub fn reset_line_number(&mut self) -> String {
        self.line_number = 0;
        RESET_LINE_NUMBER.to_string()
    }

    /// Render a command to the text that goes on the wire
    pub fn render(&mut self, command: &Command) -> String {
        match command {
            Command::Numbered { command, params } => self.create_gcode_command(command, params).text,
            Command::Raw(text) => text.clone(),
            Command::ResetLineNumber => self.reset_line_number(),
        }
    }

    /// Get the next line number
    pub fn get_line_number(&self) -> u32 {
        self.line_number
    }
}
