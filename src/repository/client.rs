// src/repository/client.rs

//! HTTP fetcher for repository artifacts
//!
//! Thin wrapper around a shared reqwest client. Three operations: URL to
//! string (repomd.xml), URL to bytes (companion metadata), URL to file
//! (packages). File downloads land in a `<target>.downloading` sibling;
//! the caller verifies the content and renames it into place, so a
//! partial write can never be observed at the final path.
//!
//! The fetcher performs no retries; failed artifacts are picked up again
//! on the next cycle.

use crate::error::{Error, Result};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// User-Agent sent on every request
const USER_AGENT: &str = concat!("rpmirror/", env!("CARGO_PKG_VERSION"));

/// Extension appended to the target path while a download is in flight
pub const DOWNLOAD_SUFFIX: &str = "downloading";

/// Shared HTTP client with a total-request timeout
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Create a fetcher with the given total-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Init(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    async fn get_checked(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Download(format!("GET {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Download(format!(
                "HTTP {} from {url}",
                response.status()
            )));
        }

        Ok(response)
    }

    /// Fetch a URL as a UTF-8 string
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.get_checked(url).await?;
        response
            .text()
            .await
            .map_err(|e| Error::Download(format!("failed to read body from {url}: {e}")))
    }

    /// Fetch a URL as a byte buffer
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get_checked(url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Download(format!("failed to read body from {url}: {e}")))?;
        Ok(bytes.to_vec())
    }

    /// Download a URL to `<target>.downloading`, streaming the body
    ///
    /// Returns the temp path. The caller verifies the file and renames it
    /// onto `target`; on verification failure it removes the temp file.
    pub async fn download_to_temp(&self, url: &str, target: &Path) -> Result<PathBuf> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = temp_download_path(target);
        let mut response = self.get_checked(url).await?;
        let mut file = tokio::fs::File::create(&temp_path).await?;

        let mut downloaded: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::Download(format!("failed to read body from {url}: {e}")))?
        {
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
        }
        file.flush().await?;

        debug!("Downloaded {downloaded} bytes from {url} to {}", temp_path.display());
        Ok(temp_path)
    }
}

/// The in-flight sibling path for a download target
pub fn temp_download_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(DOWNLOAD_SUFFIX);
    target.with_file_name(name)
}
