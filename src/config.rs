// src/config.rs
//! Mirror configuration
//!
//! TOML configuration with the following sections:
//! - top level - sync interval, download concurrency, HTTP timeout
//! - [[centos]] - CentOS vault channels to mirror
//! - [docker] - optional Docker CE stable repository
//! - [epel] - optional EPEL repository
//!
//! Every field has a default, so an empty file (or no file) yields a
//! usable configuration with no repositories.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

fn default_sync_interval() -> u64 {
    86_400
}

fn default_max_concurrent_downloads() -> usize {
    5
}

fn default_http_timeout() -> u64 {
    300
}

/// One mirrored repository: where it lives upstream and where the local
/// tree goes.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RepoConfig {
    /// Short name used in logs and reports
    pub name: String,
    /// Upstream repository root, the directory containing `repodata/`
    pub base_url: String,
    /// Local mirror root directory
    pub local_path: String,
}

impl RepoConfig {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        local_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            local_path: local_path.into(),
        }
    }

    /// A descriptor missing its upstream URL or local path cannot be
    /// synced; the affected repo is skipped, not the cycle.
    pub fn is_valid(&self) -> bool {
        !self.base_url.is_empty() && !self.local_path.is_empty()
    }

    /// Upstream URL for a repo-relative path
    pub fn remote_url(&self, relative: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            relative.trim_start_matches('/')
        )
    }
}

/// Top-level mirror configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    /// Seconds between daemon cycles
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    /// Width of the package download semaphore
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,

    /// Total per-request HTTP timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// CentOS vault channels
    #[serde(default)]
    pub centos: Vec<RepoConfig>,

    /// Docker CE stable repository
    #[serde(default)]
    pub docker: Option<RepoConfig>,

    /// EPEL repository
    #[serde(default)]
    pub epel: Option<RepoConfig>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: default_sync_interval(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            http_timeout_secs: default_http_timeout(),
            centos: Vec::new(),
            docker: None,
            epel: None,
        }
    }
}

impl MirrorConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("invalid TOML: {e}")))
    }

    /// All valid repository descriptors in configuration order:
    /// CentOS channels first, then Docker, then EPEL.
    ///
    /// Invalid descriptors are logged and dropped here so every consumer
    /// sees the same filtered list.
    pub fn repos(&self) -> Vec<&RepoConfig> {
        let mut repos: Vec<&RepoConfig> = Vec::new();
        for repo in self.centos.iter().chain(&self.docker).chain(&self.epel) {
            if repo.is_valid() {
                repos.push(repo);
            } else {
                warn!(
                    "Skipping repository '{}': missing base_url or local_path",
                    repo.name
                );
            }
        }
        repos
    }
}
