//! G-code file store clients
//!
//! Deployments pull file content through [`GcodeFetcher`]. The store is
//! normally the control plane's REST server; a local directory and a
//! placeholder for "no store" are also provided.

use async_trait::async_trait;
use printhost_core::{FetchError, GcodeFetcher};
use std::path::PathBuf;
use std::time::Duration;

/// Fetcher for the REST file store
///
/// Content is read with `GET <base_url>/gcodefiles/<id>/content`, presenting
/// the configured bearer token.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpFetcher {
    /// Create a fetcher for the store at `base_url`
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, FetchError> {
        let base_url = base_url.into();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| FetchError::Request {
                id: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Content URL of a stored file
    pub fn content_url(&self, id: &str) -> String {
        format!("{}/gcodefiles/{}/content", self.base_url, id)
    }
}

#[async_trait]
impl GcodeFetcher for HttpFetcher {
    async fn fetch_gcode_file(&self, id: &str) -> Result<String, FetchError> {
        let request_failed = |e: reqwest::Error| FetchError::Request {
            id: id.to_string(),
            reason: e.to_string(),
        };

        let mut request = self.client.get(self.content_url(id));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        tracing::debug!("Fetching G-code file {}", id);
        let response = request.send().await.map_err(request_failed)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound { id: id.to_string() });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                id: id.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(request_failed)
    }
}

/// Fetcher used when no file store is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableFetcher;

#[async_trait]
impl GcodeFetcher for UnavailableFetcher {
    async fn fetch_gcode_file(&self, id: &str) -> Result<String, FetchError> {
        Err(FetchError::Request {
            id: id.to_string(),
            reason: "no file store configured".to_string(),
        })
    }
}

/// Fetcher reading stored files from a local directory as `<id>.gcode`
#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    /// Create a fetcher rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, id: &str) -> Option<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| self.root.join(format!("{}.gcode", id)))
    }
}

#[async_trait]
impl GcodeFetcher for DirectoryFetcher {
    async fn fetch_gcode_file(&self, id: &str) -> Result<String, FetchError> {
        let Some(path) = self.path_for(id) else {
            return Err(FetchError::NotFound { id: id.to_string() });
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FetchError::NotFound { id: id.to_string() })
            }
            Err(e) => Err(FetchError::Request {
                id: id.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
