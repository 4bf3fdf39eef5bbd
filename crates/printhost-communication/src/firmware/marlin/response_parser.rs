//! Marlin Response Parser
//!
//! Classifies the text lines a Marlin/Prusa printer emits: acknowledgements,
//! resend requests, boot and init markers, SD events, progress reports,
//! SD listing framing and temperature telemetry.

use super::command_creator::INIT_SENTINEL;
use printhost_core::{FileEntry, HeaterReading, TemperatureSnapshot};
use std::fmt;

/// File suffixes kept from an SD listing
pub const GCODE_SUFFIXES: [&str; 3] = [".g", ".gco", ".gcode"];

/// Marlin response types
#[derive(Debug, Clone, PartialEq)]
pub enum MarlinResponse {
    /// `ok`, or a split acknowledgement fragment while a job streams
    Ok,
    /// Firmware asks for a retransmission starting at a line number
    Resend(u32),
    /// Firmware booted
    Start,
    /// Init batch processed
    Initialized,
    /// SD file closed and saved
    DoneSavingFile,
    /// `NORMAL MODE:` progress report
    Progress {
        /// Percent done, when known
        percent: Option<u8>,
        /// Remaining minutes, when known
        time_remaining: Option<u32>,
    },
    /// Start of an SD listing
    BeginFileList,
    /// End of an SD listing
    EndFileList,
    /// Any other text
    Message(String),
}

impl fmt::Display for MarlinResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Resend(line) => write!(f, "resend:{}", line),
            Self::Start => write!(f, "start"),
            Self::Initialized => write!(f, "initialized"),
            Self::DoneSavingFile => write!(f, "done_saving_file"),
            Self::Progress { percent, .. } => write!(f, "progress:{:?}", percent),
            Self::BeginFileList => write!(f, "begin_file_list"),
            Self::EndFileList => write!(f, "end_file_list"),
            Self::Message(msg) => write!(f, "message:{}", msg),
        }
    }
}

/// Check for an acknowledgement fragment: one or two characters, all `o`/`k`
///
/// A network transport occasionally splits or doubles the bytes of `ok`; the
/// fragments `o`, `k`, `kk`, `ko`, `oo` are accepted while a job streams.
pub fn is_ack_fragment(line: &str) -> bool {
    (1..=2).contains(&line.len()) && line.chars().all(|c| c == 'o' || c == 'k')
}

/// Marlin response parser
#[derive(Debug, Default)]
pub struct MarlinResponseParser;

impl MarlinResponseParser {
    /// Create a new Marlin response parser
    pub fn new() -> Self {
        Self
    }

    /// Parse a response line
    ///
    /// `job_active` widens the acknowledgement set to fragments.
    pub fn parse(&self, line: &str, job_active: bool) -> Option<MarlinResponse> {
        let line = line.trim();

        if line.is_empty() {
            return None;
        }

        if line == "ok" || (job_active && is_ack_fragment(line)) {
            return Some(MarlinResponse::Ok);
        }

        if let Some(rest) = line.strip_prefix("Resend") {
            let number = rest.trim_start_matches(':').trim();
            if let Ok(line_number) = number.parse::<u32>() {
                return Some(MarlinResponse::Resend(line_number));
            }
        }

        if line == "Done saving file." {
            return Some(MarlinResponse::DoneSavingFile);
        }

        if let Some(rest) = line.strip_prefix("NORMAL MODE: ") {
            return Some(parse_progress(rest));
        }

        if line == "start" {
            return Some(MarlinResponse::Start);
        }

        if line == INIT_SENTINEL || line.strip_prefix("echo:") == Some(INIT_SENTINEL) {
            return Some(MarlinResponse::Initialized);
        }

        match line {
            "Begin file list" => Some(MarlinResponse::BeginFileList),
            "End file list" => Some(MarlinResponse::EndFileList),
            _ => Some(MarlinResponse::Message(line.to_string())),
        }
    }
}

/// `Percent done: 42; print time remaining in mins: 73[; ...]`
fn parse_progress(rest: &str) -> MarlinResponse {
    let mut parts = rest.split(';').map(str::trim);
    let value = |part: Option<&str>| -> Option<i64> {
        part.and_then(|p| p.rsplit_once(':'))
            .and_then(|(_, v)| v.trim().parse::<i64>().ok())
    };

    let percent = value(parts.next())
        .filter(|p| (0..=100).contains(p))
        .map(|p| p as u8);
    let time_remaining = value(parts.next())
        .filter(|m| *m >= 0)
        .and_then(|m| u32::try_from(m).ok());

    MarlinResponse::Progress {
        percent,
        time_remaining,
    }
}

/// Parse an SD listing line into a file entry
///
/// The name is lowercased; only G-code files are kept. The size is the
/// second token, when it parses.
pub fn parse_file_entry(line: &str) -> Option<FileEntry> {
    let lowered = line.trim().to_lowercase();
    let mut tokens = lowered.split(' ');
    let name = tokens.next()?;

    if !GCODE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
        return None;
    }

    Some(FileEntry {
        gcode_file_name: name.to_string(),
        size: tokens.next().and_then(|s| s.parse().ok()),
    })
}

/// Parse a temperature auto-report line
///
/// Accepts exactly
/// `T:<f> /<f> B:<f> /<f> T0:<f> /<f> @:<n> B@:<n> P:<f> A:<f>` with single
/// spaces; anything else is not a temperature line.
pub fn parse_temperature(line: &str) -> Option<TemperatureSnapshot> {
    let tokens: Vec<&str> = line.split(' ').collect();
    if tokens.len() != 10 {
        return None;
    }

    let heater = |current: &str, current_prefix: &str, target: &str| -> Option<HeaterReading> {
        Some(HeaterReading {
            current: decimal(current.strip_prefix(current_prefix)?)?,
            target: decimal(target.strip_prefix('/')?)?,
        })
    };

    Some(TemperatureSnapshot {
        hot_end: heater(tokens[0], "T:", tokens[1])?,
        heated_bed: heater(tokens[2], "B:", tokens[3])?,
        hot_end_t0: heater(tokens[4], "T0:", tokens[5])?,
        hotend_power: integer(tokens[6].strip_prefix("@:")?)?,
        bed_power: integer(tokens[7].strip_prefix("B@:")?)?,
        pinda_temp: decimal(tokens[8].strip_prefix("P:")?)?,
        ambient_actual: decimal(tokens[9].strip_prefix("A:")?)?,
    })
}

/// `<digits>.<digits>`
fn decimal(text: &str) -> Option<f64> {
    let (whole, frac) = text.split_once('.')?;
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !all_digits(frac) {
        return None;
    }
    text.parse().ok()
}

/// `<digits>`
fn integer(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
