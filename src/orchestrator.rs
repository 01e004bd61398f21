// src/orchestrator.rs

//! Mirror cycle orchestration
//!
//! One cycle walks every configured repository in order: a cheap change
//! check on `repomd.xml`, a full sync when the upstream moved, then
//! metadata validation. The cross-repo content cache is built once per
//! cycle so a package already mirrored anywhere is copied, not
//! re-downloaded.
//!
//! Nothing a single repo does can abort the cycle; failures become
//! counters and log lines.

use crate::config::{MirrorConfig, RepoConfig};
use crate::error::Result;
use crate::repository::{
    detect, ensure_metadata, Fetcher, PackageCache, SyncEngine, SyncOutcome,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use walkdir::WalkDir;

/// Result of one repo within a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoResult {
    /// Upstream repomd matched the local copy; nothing to do
    Unchanged,
    /// Sync ran and reported these counters
    Synced(SyncOutcome),
    /// Sync aborted for this repo (message already logged)
    Failed(String),
}

/// Per-cycle summary, one entry per configured repo
#[derive(Debug, Default)]
pub struct CycleSummary {
    pub repos: Vec<(String, RepoResult)>,
}

impl CycleSummary {
    /// True when no repo failed outright
    pub fn all_ok(&self) -> bool {
        !self
            .repos
            .iter()
            .any(|(_, result)| matches!(result, RepoResult::Failed(_)))
    }
}

/// Cycle driver owning the shared HTTP client
pub struct Orchestrator {
    fetcher: Fetcher,
    config: MirrorConfig,
}

impl Orchestrator {
    pub fn new(config: MirrorConfig) -> Result<Self> {
        let fetcher = Fetcher::new(Duration::from_secs(config.http_timeout_secs))?;
        Ok(Self { fetcher, config })
    }

    /// Run one full cycle over every configured repository
    pub async fn run_cycle(&self) -> CycleSummary {
        let repos: Vec<RepoConfig> = self.config.repos().into_iter().cloned().collect();
        info!("Starting mirror cycle over {} repositories", repos.len());

        // One content cache across all mirror roots, built up-front so
        // later repos can dedup against earlier ones and prior cycles.
        let roots: Vec<PathBuf> = repos.iter().map(|r| PathBuf::from(&r.local_path)).collect();
        let cache = tokio::task::spawn_blocking(move || PackageCache::build(&roots))
            .await
            .unwrap_or_default();
        let cache = Arc::new(cache);

        let engine = SyncEngine::new(
            self.fetcher.clone(),
            Arc::clone(&cache),
            self.config.max_concurrent_downloads,
        );

        let mut summary = CycleSummary::default();
        for repo in &repos {
            let result = self.process_repo(&engine, repo).await;
            summary.repos.push((repo.name.clone(), result));
        }

        for repo in &repos {
            let size = directory_size(Path::new(&repo.local_path));
            info!("Repo '{}': {} on disk", repo.name, human_size(size));
        }

        info!("Mirror cycle finished");
        summary
    }

    async fn process_repo(&self, engine: &SyncEngine, repo: &RepoConfig) -> RepoResult {
        let repomd_url = repo.remote_url("repodata/repomd.xml");
        let local_repomd = Path::new(&repo.local_path)
            .join("repodata")
            .join("repomd.xml");

        if !detect::has_changed(&self.fetcher, &repomd_url, &local_repomd).await {
            info!("Repo '{}' is unchanged, skipping", repo.name);
            return RepoResult::Unchanged;
        }

        let result = match engine.sync(repo).await {
            Ok(outcome) => RepoResult::Synced(outcome),
            Err(e) => {
                error!("Repo '{}' sync failed: {e}", repo.name);
                RepoResult::Failed(e.to_string())
            }
        };

        // Even a partial sync should leave client-usable metadata behind
        let root = PathBuf::from(&repo.local_path);
        let name = repo.name.clone();
        let ensure = tokio::task::spawn_blocking(move || ensure_metadata(&root, &name)).await;
        match ensure {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Repo '{}': metadata check failed: {e}", repo.name),
            Err(e) => warn!("Repo '{}': metadata task failed: {e}", repo.name),
        }

        result
    }
}

/// Total size in bytes of every file under a directory
pub fn directory_size(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Render a byte count with a binary unit suffix for log output
pub fn human_size(bytes: u64) -> String {
    const SCALES: &[(u64, &str)] = &[(1 << 30, "GB"), (1 << 20, "MB"), (1 << 10, "KB")];

    for &(scale, unit) in SCALES {
        if bytes >= scale {
            return format!("{:.1} {unit}", bytes as f64 / scale as f64);
        }
    }
    format!("{bytes} B")
}
