//! Flow control with acknowledgment tracking
//!
//! Implements the Marlin streaming discipline: exactly one command is on the
//! wire until the firmware acknowledges it. Ad-hoc commands wait in a FIFO;
//! a bulk job takes over the single slot until its last line is acknowledged.
//!
//! # Features
//! - Command queue in submission order
//! - Line numbers assigned at first transmission
//! - Resend requests rewinding a job to the requested line
//! - Job gate: a job starts right after the firmware accepts its line number reset

use crate::communication::PrinterLink;
use crate::firmware::marlin::{Command, CommandCreator};
use crate::session::job::{Job, JobPlan};
use std::collections::VecDeque;

/// A command in the queue
#[derive(Debug, Clone)]
struct QueuedCommand {
    /// The logical command
    command: Command,
    /// Wire text, rendered on first transmission
    wire: Option<String>,
}

/// What an acknowledgment led to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Nothing left to send
    Drained,
    /// The next queued command was transmitted
    CommandSent,
    /// The queue head was transmitted again after a resend request
    CommandResent,
    /// The reset in front of a staged job was accepted; the job may start
    JobGateOpened,
    /// The job line at `index` was transmitted
    JobAdvanced {
        /// Index of the transmitted line
        index: usize,
        /// New rounded percent, only when it changed
        percent: Option<u8>,
    },
    /// The job was rewound and the line at `index` transmitted again
    JobResent {
        /// Index of the retransmitted line
        index: usize,
    },
    /// The last job line has been acknowledged
    JobFinished,
}

/// Single-slot flow controller
#[derive(Debug, Default)]
pub struct FlowController {
    /// Commands in submission order; the head is on the wire when `in_flight`
    /// and no job is streaming
    queue: VecDeque<QueuedCommand>,
    /// Line numbering
    creator: CommandCreator,
    /// Something is waiting for an acknowledgment
    in_flight: bool,
    /// Line number requested by `Resend:`
    resend: Option<u32>,
    /// The next acknowledged line number reset opens the job gate
    gate_pending: bool,
    /// A command was transmitted or acknowledged since the last stall check
    progressed: bool,
}

impl FlowController {
    /// Create an empty flow controller
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command; it is transmitted immediately when the slot is free
    pub fn submit(&mut self, command: Command, link: &mut dyn PrinterLink) {
        self.queue.push_back(QueuedCommand {
            command,
            wire: None,
        });
        if !self.in_flight {
            self.transmit_head(link);
        }
    }

    /// Queue a line number reset that gates the next job
    pub fn submit_job_gate(&mut self, link: &mut dyn PrinterLink) {
        self.gate_pending = true;
        self.submit(Command::ResetLineNumber, link);
    }

    /// Record a `Resend:` request for the next acknowledgment
    pub fn request_resend(&mut self, line_number: u32) {
        self.resend = Some(line_number);
    }

    /// Handle an acknowledgment from the firmware
    pub fn handle_acknowledgment(
        &mut self,
        job: Option<&mut Job>,
        link: &mut dyn PrinterLink,
    ) -> AckOutcome {
        match job {
            Some(job) => self.acknowledge_job_line(job, link),
            None => self.acknowledge_command(link),
        }
    }

    fn acknowledge_job_line(&mut self, job: &mut Job, link: &mut dyn PrinterLink) -> AckOutcome {
        job.mark_alive();

        if let Some(seq) = self.resend.take() {
            let index = job
                .position_of(seq)
                .or_else(|| job.cursor().checked_sub(1));
            if let Some(index) = index {
                if let Some(line) = job.rewind_to(index) {
                    tracing::debug!("Resending job line {} ({})", index, line.seq);
                    send(link, &line.text);
                    return AckOutcome::JobResent { index };
                }
            }
        }

        match job.advance() {
            Some((index, line)) => {
                send(link, &line.text);
                let percent = job.record_percent(index);
                AckOutcome::JobAdvanced { index, percent }
            }
            None => {
                self.in_flight = false;
                AckOutcome::JobFinished
            }
        }
    }

    fn acknowledge_command(&mut self, link: &mut dyn PrinterLink) -> AckOutcome {
        if !self.in_flight {
            self.resend = None;
            return AckOutcome::Drained;
        }

        if self.resend.take().is_some() {
            if let Some(wire) = self.queue.front().and_then(|head| head.wire.clone()) {
                tracing::debug!("Resending command: {}", wire);
                send(link, &wire);
                return AckOutcome::CommandResent;
            }
        }

        let acknowledged = self.queue.pop_front();
        self.in_flight = false;
        self.progressed = true;

        if self.gate_pending
            && matches!(
                acknowledged.map(|c| c.command),
                Some(Command::ResetLineNumber)
            )
        {
            self.gate_pending = false;
            return AckOutcome::JobGateOpened;
        }

        if self.transmit_head(link) {
            AckOutcome::CommandSent
        } else {
            AckOutcome::Drained
        }
    }

    /// Encode a staged plan with the current line numbering
    pub fn encode_job(&mut self, plan: JobPlan) -> Job {
        Job::encode(plan, &mut self.creator)
    }

    /// Transmit the first line of a job and take the slot
    pub fn start_job(&mut self, job: &mut Job, link: &mut dyn PrinterLink) -> bool {
        match job.advance() {
            Some((index, line)) => {
                send(link, &line.text);
                job.record_percent(index);
                self.in_flight = true;
                true
            }
            None => false,
        }
    }

    /// Retransmit the job line waiting for its acknowledgment
    pub fn retransmit_job_line(&self, job: &Job, link: &mut dyn PrinterLink) -> bool {
        match job.in_flight() {
            Some(line) => {
                tracing::debug!("Retransmitting stalled line {}", line.seq);
                send(link, &line.text);
                true
            }
            None => false,
        }
    }

    /// Retransmit the queue head waiting for its acknowledgment
    pub fn retransmit_head(&self, link: &mut dyn PrinterLink) -> bool {
        if !self.in_flight {
            return false;
        }
        match self.queue.front().and_then(|head| head.wire.as_deref()) {
            Some(wire) => {
                tracing::debug!("Retransmitting stalled command: {}", wire);
                send(link, wire);
                true
            }
            None => false,
        }
    }

    /// Check and clear the progress flag used by the stall watchdog
    pub fn take_progress(&mut self) -> bool {
        std::mem::take(&mut self.progressed)
    }

    /// Release the slot after a job and transmit what queued up meanwhile
    pub fn finish_job(&mut self, link: &mut dyn PrinterLink) -> bool {
        self.in_flight = false;
        self.resend = None;
        self.transmit_head(link)
    }

    /// Write a line outside of flow control
    pub fn send_raw(&self, text: &str, link: &mut dyn PrinterLink) {
        send(link, text);
    }

    fn transmit_head(&mut self, link: &mut dyn PrinterLink) -> bool {
        let Some(head) = self.queue.front_mut() else {
            self.in_flight = false;
            return false;
        };
        if head.wire.is_none() {
            head.wire = Some(self.creator.render(&head.command));
        }
        if let Some(wire) = &head.wire {
            send(link, wire);
        }
        self.in_flight = true;
        self.progressed = true;
        true
    }

    /// Drop everything queued or in flight
    pub fn clear_queue(&mut self) {
        self.queue.clear();
        self.in_flight = false;
        self.resend = None;
        self.gate_pending = false;
        self.progressed = false;
    }

    /// Number of commands queued, including the one on the wire
    pub fn queued_commands_count(&self) -> usize {
        self.queue.len()
    }

    /// Check if a command or job line awaits acknowledgment
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Check if a resend request is pending
    pub fn is_resending(&self) -> bool {
        self.resend.is_some()
    }

    /// Check if a job is waiting behind a line number reset
    pub fn is_gate_pending(&self) -> bool {
        self.gate_pending
    }

    /// Next line number to be assigned
    pub fn line_number(&self) -> u32 {
        self.creator.get_line_number()
    }
}

fn send(link: &mut dyn PrinterLink, text: &str) {
    tracing::trace!(">> {}", text);
    if let Err(e) = link.send_line(text) {
        tracing::warn!("Failed to send command: {}", e);
    }
}
