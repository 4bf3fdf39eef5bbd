//! Deploy orchestration
//!
//! A deploy applies a manifest to a printer's SD card: deletes go straight
//! into the command queue, uploads are fetched from the file store and then
//! written one after another. Fetching happens outside the session task so
//! the printer connection keeps being served meanwhile.

use super::task::SessionHandle;
use printhost_core::{FetchError, GcodeFetcher, ManifestEntry, SessionError};
use thiserror::Error;

/// A fetched file waiting to be written to the SD card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadEntry {
    /// File store id
    pub file_id: Option<String>,
    /// File name on the card
    pub file_name: String,
    /// Program text
    pub gcode: String,
}

/// Deploy error type
#[derive(Error, Debug)]
pub enum DeployError {
    /// The session refused or could not take the deploy
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A file could not be fetched; the deploy was aborted
    #[error("Deploy aborted after fetching {} file(s): {source}", fetched.len())]
    Fetch {
        /// The fetch failure.
        source: FetchError,
        /// Files fetched before the failure, for a retry.
        fetched: Vec<UploadEntry>,
    },
}

impl SessionHandle {
    /// Run a deploy manifest against this session
    ///
    /// Returns the number of files queued for upload.
    pub async fn deploy(
        &self,
        manifest: Vec<ManifestEntry>,
        fetcher: &dyn GcodeFetcher,
    ) -> Result<usize, DeployError> {
        let uploads = self.begin_deploy(manifest).await?;

        let mut fetched = Vec::with_capacity(uploads.len());
        for entry in uploads {
            let Some(id) = entry.id else {
                tracing::warn!("Skipping upload of {} without a file id", entry.gcode_file_name);
                continue;
            };
            match fetcher.fetch_gcode_file(&id).await {
                Ok(gcode) => fetched.push(UploadEntry {
                    file_id: Some(id),
                    file_name: entry.gcode_file_name,
                    gcode,
                }),
                Err(source) => {
                    tracing::error!("Failed to fetch {}: {}", entry.gcode_file_name, source);
                    self.abort_deploy()?;
                    return Err(DeployError::Fetch { source, fetched });
                }
            }
        }

        let count = fetched.len();
        self.queue_uploads(fetched)?;
        Ok(count)
    }
}
