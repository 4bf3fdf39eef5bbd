//! Firmware flashing through an external tool
//!
//! Runs `avrdude` (or a compatible tool) against the printer's bootloader.
//! The tool reaches the printer through a loopback TCP connection that the
//! gateway server pipes into the flashing session's socket.

use printhost_core::FlashError;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{sleep_until, Instant};

/// Flashing tool invocation
#[derive(Debug, Clone, PartialEq)]
pub struct FlashConfig {
    /// Tool executable
    pub program: String,
    /// Target part (`-p`)
    pub part: String,
    /// Programmer type (`-c`)
    pub programmer: String,
    /// Port the tool connects to (`-P`)
    pub port: String,
    /// Intel hex image to write
    pub hex_file: PathBuf,
    /// Kill the tool after this long
    pub timeout: Option<Duration>,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            program: "avrdude".to_string(),
            part: "atmega2560".to_string(),
            programmer: "wiring".to_string(),
            port: "net:localhost:9000".to_string(),
            hex_file: PathBuf::from("firmware.hex"),
            timeout: Some(Duration::from_secs(300)),
        }
    }
}

/// Runs the flashing tool
#[derive(Debug, Clone)]
pub struct Flasher {
    config: FlashConfig,
}

impl Flasher {
    /// Create a flasher
    pub fn new(config: FlashConfig) -> Self {
        Self { config }
    }

    /// The tool invocation
    pub fn config(&self) -> &FlashConfig {
        &self.config
    }

    /// Command line arguments passed to the tool
    pub fn args(&self) -> Vec<String> {
        vec![
            "-v".to_string(),
            "-p".to_string(),
            self.config.part.clone(),
            "-c".to_string(),
            self.config.programmer.clone(),
            "-P".to_string(),
            self.config.port.clone(),
            "-D".to_string(),
            "-U".to_string(),
            format!("flash:w:{}:i", self.config.hex_file.display()),
        ]
    }

    /// Run the tool to completion, logging its output
    pub async fn flash(&self) -> Result<(), FlashError> {
        tracing::info!("Starting {}", self.config.program);

        let mut cmd = Command::new(&self.config.program);
        cmd.args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| FlashError::Spawn {
            program: self.config.program.clone(),
            reason: e.to_string(),
        })?;

        let io_error = |reason: &str| FlashError::Io {
            reason: reason.to_string(),
        };
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io_error("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io_error("stderr not captured"))?;

        let mut out_reader = BufReader::new(stdout).lines();
        let mut err_reader = BufReader::new(stderr).lines();
        let mut out_open = true;
        let mut err_open = true;
        let deadline = self.config.timeout.map(|t| Instant::now() + t);

        while out_open || err_open {
            tokio::select! {
                _ = async {
                    if let Some(dl) = deadline {
                        sleep_until(dl).await;
                    }
                }, if deadline.is_some() => {
                    tracing::error!("Flashing tool timed out; killing it");
                    let _ = child.start_kill();
                    break;
                }
                line = out_reader.next_line(), if out_open => match line {
                    Ok(Some(l)) => tracing::info!(target: "avrdude", "{}", l),
                    Ok(None) => out_open = false,
                    Err(e) => {
                        tracing::warn!("Failed to read tool output: {}", e);
                        out_open = false;
                    }
                },
                line = err_reader.next_line(), if err_open => match line {
                    // avrdude writes its progress to stderr
                    Ok(Some(l)) => tracing::info!(target: "avrdude", "{}", l),
                    Ok(None) => err_open = false,
                    Err(e) => {
                        tracing::warn!("Failed to read tool output: {}", e);
                        err_open = false;
                    }
                },
            }
        }

        let status = child.wait().await.map_err(|e| FlashError::Io {
            reason: e.to_string(),
        })?;

        if status.success() {
            tracing::info!("{} finished", self.config.program);
            Ok(())
        } else {
            Err(FlashError::ExitStatus {
                code: status.code(),
            })
        }
    }
}
