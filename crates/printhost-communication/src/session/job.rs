//! Bulk jobs streamed line by line
//!
//! A [`JobPlan`] is the list of commands for a direct print or an SD card
//! write. When the firmware has accepted the line number reset that precedes
//! it, the plan is encoded once into a [`Job`]: an immutable sequence of
//! numbered lines plus a cursor.

use crate::firmware::marlin::{Command, CommandCreator, EncodedLine};
use std::fmt;

/// What a job produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobTarget {
    /// Lines are executed as they arrive
    DirectPrint,
    /// Lines are written to a file on the SD card
    WriteToSd {
        /// File name on the card
        filename: String,
        /// File store id, when the content came from a deploy
        file_id: Option<String>,
    },
}

impl fmt::Display for JobTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirectPrint => write!(f, "print"),
            Self::WriteToSd { filename, .. } => write!(f, "sd:{}", filename),
        }
    }
}

/// Commands of a job before encoding
#[derive(Debug, Clone, PartialEq)]
pub struct JobPlan {
    target: JobTarget,
    commands: Vec<(String, String)>,
}

impl JobPlan {
    /// Direct print of a G-code program
    pub fn direct_print(gcode: &str) -> Self {
        Self {
            target: JobTarget::DirectPrint,
            commands: gcode_lines(gcode).map(|l| (l.to_string(), String::new())).collect(),
        }
    }

    /// Write a G-code program to the SD card, framed by open and close
    pub fn write_to_sd(gcode: &str, filename: &str, file_id: Option<String>) -> Self {
        let mut commands = Vec::new();
        if let Command::Numbered { command, params } = Command::start_sd_write(filename) {
            commands.push((command, params));
        }
        commands.extend(gcode_lines(gcode).map(|l| (l.to_string(), String::new())));
        if let Command::Numbered { command, params } = Command::stop_sd_write() {
            commands.push((command, params));
        }

        Self {
            target: JobTarget::WriteToSd {
                filename: filename.to_string(),
                file_id,
            },
            commands,
        }
    }

    /// Target of the plan
    pub fn target(&self) -> &JobTarget {
        &self.target
    }

    /// Number of commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if there is nothing to send
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Non-empty program lines with `;` comments removed
fn gcode_lines(gcode: &str) -> impl Iterator<Item = &str> {
    gcode.lines().filter_map(|line| {
        let code = match line.find(';') {
            Some(idx) => &line[..idx],
            None => line,
        };
        let code = code.trim();
        (!code.is_empty()).then_some(code)
    })
}

/// An encoded job being streamed
#[derive(Debug)]
pub struct Job {
    target: JobTarget,
    lines: Vec<EncodedLine>,
    /// Index of the next line to send
    cursor: usize,
    /// Set whenever the job makes progress; cleared by the stall watchdog
    alive: bool,
    /// Last percent reported
    percent: u8,
    /// Firmware reported the SD file saved before the close was acknowledged
    saved: bool,
}

impl Job {
    /// Encode a plan with consecutive line numbers from the creator
    pub fn encode(plan: JobPlan, creator: &mut CommandCreator) -> Self {
        let lines = plan
            .commands
            .iter()
            .map(|(command, params)| creator.create_gcode_command(command, params))
            .collect();

        Self {
            target: plan.target,
            lines,
            cursor: 0,
            alive: true,
            percent: 0,
            saved: false,
        }
    }

    /// What the job produces
    pub fn target(&self) -> &JobTarget {
        &self.target
    }

    /// Number of lines
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Check if the job has no lines
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Index of the next line to send
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Check if every line has been sent
    pub fn is_fully_sent(&self) -> bool {
        self.cursor >= self.lines.len()
    }

    /// Line at an index
    pub fn line(&self, index: usize) -> Option<&EncodedLine> {
        self.lines.get(index)
    }

    /// The line most recently sent
    pub fn in_flight(&self) -> Option<&EncodedLine> {
        self.cursor.checked_sub(1).and_then(|idx| self.lines.get(idx))
    }

    /// Index of the line carrying a line number
    pub fn position_of(&self, seq: u32) -> Option<usize> {
        let first = self.lines.first()?.seq;
        let idx = seq.checked_sub(first)? as usize;
        (self.lines.get(idx)?.seq == seq).then_some(idx)
    }

    /// Rounded percent of lines sent before `index`
    pub fn percent_at(&self, index: usize) -> u8 {
        if self.lines.is_empty() {
            return 0;
        }
        ((index as f64 / self.lines.len() as f64) * 100.0).round() as u8
    }

    /// Last percent reported
    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Update the percent for a line about to be sent; returns the new value
    /// only when the rounded percent changed
    pub fn record_percent(&mut self, index: usize) -> Option<u8> {
        let percent = self.percent_at(index);
        (percent != self.percent).then(|| {
            self.percent = percent;
            percent
        })
    }

    /// Take the line at the cursor and move past it
    pub fn advance(&mut self) -> Option<(usize, &EncodedLine)> {
        let index = self.cursor;
        let line = self.lines.get(index)?;
        self.cursor = index + 1;
        self.alive = true;
        Some((index, line))
    }

    /// Rewind so the line at `index` is sent next-and-now
    pub fn rewind_to(&mut self, index: usize) -> Option<&EncodedLine> {
        let line = self.lines.get(index)?;
        self.cursor = index + 1;
        self.alive = true;
        Some(line)
    }

    /// Record progress for the stall watchdog
    pub fn mark_alive(&mut self) {
        self.alive = true;
    }

    /// Read and clear the progress flag
    pub fn take_alive(&mut self) -> bool {
        std::mem::take(&mut self.alive)
    }

    /// Record the firmware's SD save confirmation
    pub fn mark_saved(&mut self) {
        self.saved = true;
    }

    /// Check if the SD save was confirmed
    pub fn is_saved(&self) -> bool {
        self.saved
    }
}
