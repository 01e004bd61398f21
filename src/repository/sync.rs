// src/repository/sync.rs

//! Repository synchronization engine
//!
//! Drives one repo through a full sync: persist upstream metadata, diff
//! the primary index against the local tree, then fetch what is missing
//! or damaged. The caller is expected to have run the change detector
//! first; this module assumes the upstream has something new.
//!
//! Two parallel phases with different bounds:
//! - verification fans out over packages up to the host's logical CPU
//!   count (hashing is CPU-bound),
//! - downloads are gated by a semaphore of `max_concurrent_downloads`
//!   (network-bound).
//!
//! Per-package and per-artifact failures are logged and counted; only a
//! missing or unparseable primary index aborts the repo.

use crate::config::RepoConfig;
use crate::error::{Error, Result};
use crate::hash::{self, HashAlgorithm};
use futures::stream::{self, StreamExt};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::cache::PackageCache;
use super::client::Fetcher;
use super::primary::{parse_primary_file, Package};
use super::repomd::{Repomd, RepomdData};

/// Counters reported after a repo sync
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Packages fetched over the network
    pub downloaded: usize,
    /// Packages satisfied by copying from a sibling mirror
    pub local_copies: usize,
    /// Packages that could not be fetched or verified
    pub failed: usize,
    /// Packages already present and intact
    pub skipped: usize,
    /// Existing packages whose digest did not match (re-fetched)
    pub corrupted: usize,
}

/// Why a package needs fetching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
    /// No file at the target path
    Missing,
    /// File exists with the wrong size
    SizeMismatch,
    /// File has the right size but the wrong digest
    Corrupted,
}

/// How a needed package was satisfied
enum FetchKind {
    Network,
    LocalCopy,
}

/// Completeness summary for an already-synced tree
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompletenessReport {
    pub total: usize,
    pub present: usize,
    pub missing: usize,
    pub size_mismatched: usize,
}

/// Per-repo sync engine sharing the HTTP client and content cache
pub struct SyncEngine {
    fetcher: Fetcher,
    cache: Arc<PackageCache>,
    max_concurrent_downloads: usize,
}

impl SyncEngine {
    pub fn new(fetcher: Fetcher, cache: Arc<PackageCache>, max_concurrent_downloads: usize) -> Self {
        Self {
            fetcher,
            cache,
            max_concurrent_downloads: max_concurrent_downloads.max(1),
        }
    }

    /// Synchronize one repository
    pub async fn sync(&self, repo: &RepoConfig) -> Result<SyncOutcome> {
        let root = PathBuf::from(&repo.local_path);
        info!("Syncing repository '{}' from {}", repo.name, repo.base_url);

        // 1. Directory skeleton
        std::fs::create_dir_all(root.join("Packages"))?;
        std::fs::create_dir_all(root.join("repodata"))?;

        // 2. Fetch repomd.xml and persist it verbatim
        let repomd_url = repo.remote_url("repodata/repomd.xml");
        let repomd_text = self.fetcher.fetch_text(&repomd_url).await?;
        std::fs::write(root.join("repodata").join("repomd.xml"), &repomd_text)?;
        let repomd = Repomd::parse(&repomd_text)?;

        // 3. Companion metadata streams; failures here are non-fatal
        for entry in &repomd.data {
            if let Err(e) = self.sync_metadata_entry(repo, &root, entry).await {
                warn!(
                    "Repo '{}': metadata stream '{}' failed: {e}",
                    repo.name, entry.data_type
                );
            }
        }

        // 4. Resolve the primary index
        let primary_href = repomd.data_href("primary").ok_or_else(|| {
            Error::NotFound(format!("repo '{}' publishes no primary index", repo.name))
        })?;
        let primary_path = safe_join(&root, primary_href).ok_or_else(|| {
            Error::Parse(format!("unsafe primary href '{primary_href}'"))
        })?;
        if !primary_path.exists() {
            return Err(Error::NotFound(format!(
                "primary index {} was not downloaded",
                primary_path.display()
            )));
        }

        // 5. Parse it
        let packages = {
            let primary_path = primary_path.clone();
            tokio::task::spawn_blocking(move || parse_primary_file(&primary_path))
                .await
                .map_err(|e| Error::Parse(format!("primary parse task failed: {e}")))??
        };
        info!("Repo '{}': primary lists {} packages", repo.name, packages.len());

        let mut outcome = SyncOutcome::default();
        let (valid, invalid): (Vec<Package>, Vec<Package>) =
            packages.into_iter().partition(Package::has_valid_location);
        for pkg in &invalid {
            warn!(
                "Repo '{}': rejecting package '{}' with unsafe location '{}'",
                repo.name,
                pkg.nevra(),
                pkg.location_href
            );
        }
        outcome.failed += invalid.len();

        // 6. Diff phase: decide which packages need fetching
        let (to_fetch, skipped, corrupted) = self.plan_fetches(&root, valid).await;
        outcome.skipped = skipped;
        outcome.corrupted = corrupted;
        info!(
            "Repo '{}': {} intact, {} corrupted, {} to fetch",
            repo.name,
            skipped,
            corrupted,
            to_fetch.len()
        );

        // 7. Fetch phase
        let fetched = self.fetch_all(repo, &root, to_fetch).await;
        outcome.downloaded = fetched.downloaded;
        outcome.local_copies = fetched.local_copies;
        outcome.failed += fetched.failed;

        // 8. Final report
        info!(
            "Repo '{}' sync complete: {} downloaded, {} local copies, {} failed, {} skipped",
            repo.name, outcome.downloaded, outcome.local_copies, outcome.failed, outcome.skipped
        );
        Ok(outcome)
    }

    /// Fetch one companion metadata stream unless it is already intact
    ///
    /// A `group` entry may live outside `repodata/` (some mirrors put the
    /// comps file beside it); any safe relative href is honored.
    async fn sync_metadata_entry(
        &self,
        repo: &RepoConfig,
        root: &Path,
        entry: &RepomdData,
    ) -> Result<()> {
        let target = safe_join(root, &entry.href)
            .ok_or_else(|| Error::Parse(format!("unsafe metadata href '{}'", entry.href)))?;

        if target.exists() && !entry.checksum.is_empty() {
            let algorithm: HashAlgorithm = entry.checksum_type.parse().unwrap_or_default();
            if let Ok(actual) = hash::hash_file(algorithm, &target) {
                if actual == entry.checksum {
                    debug!("Metadata '{}' already intact, skipping", entry.href);
                    return Ok(());
                }
            }
        }

        let url = repo.remote_url(&entry.href);
        let bytes = self.fetcher.fetch_bytes(&url).await?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, &bytes)?;
        debug!("Fetched metadata '{}' ({} bytes)", entry.href, bytes.len());
        Ok(())
    }

    /// Verification fan-out over the package list, CPU-bounded
    async fn plan_fetches(
        &self,
        root: &Path,
        packages: Vec<Package>,
    ) -> (Vec<Package>, usize, usize) {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let skipped = Arc::new(AtomicUsize::new(0));
        let corrupted = Arc::new(AtomicUsize::new(0));

        let results: Vec<Option<Package>> = stream::iter(packages.into_iter().map(|pkg| {
            let root = root.to_path_buf();
            let skipped = Arc::clone(&skipped);
            let corrupted = Arc::clone(&corrupted);
            async move {
                let verdict =
                    tokio::task::spawn_blocking(move || (fetch_reason(&root, &pkg), pkg)).await;
                match verdict {
                    Ok((Some(reason), pkg)) => {
                        if reason == FetchReason::Corrupted {
                            corrupted.fetch_add(1, Ordering::Relaxed);
                            warn!("Package '{}' is corrupted on disk, re-fetching", pkg.nevra());
                        } else {
                            debug!("Package '{}' needs fetch: {:?}", pkg.nevra(), reason);
                        }
                        Some(pkg)
                    }
                    Ok((None, _)) => {
                        skipped.fetch_add(1, Ordering::Relaxed);
                        None
                    }
                    Err(e) => {
                        warn!("Verification task failed: {e}");
                        None
                    }
                }
            }
        }))
        .buffer_unordered(workers)
        .collect()
        .await;

        let to_fetch: Vec<Package> = results.into_iter().flatten().collect();
        (
            to_fetch,
            skipped.load(Ordering::Relaxed),
            corrupted.load(Ordering::Relaxed),
        )
    }

    /// Download fan-out gated by the concurrency semaphore
    async fn fetch_all(&self, repo: &RepoConfig, root: &Path, to_fetch: Vec<Package>) -> SyncOutcome {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_downloads));
        let downloaded = Arc::new(AtomicUsize::new(0));
        let local_copies = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let total = to_fetch.len();

        stream::iter(to_fetch.into_iter().map(|pkg| {
            let semaphore = Arc::clone(&semaphore);
            let downloaded = Arc::clone(&downloaded);
            let local_copies = Arc::clone(&local_copies);
            let failed = Arc::clone(&failed);
            let root = root.to_path_buf();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                match self.fetch_one(repo, &root, &pkg).await {
                    Ok(FetchKind::Network) => {
                        let n = downloaded.fetch_add(1, Ordering::Relaxed) + 1;
                        if n % 50 == 0 {
                            info!("Repo '{}': {n}/{total} packages downloaded", repo.name);
                        }
                    }
                    Ok(FetchKind::LocalCopy) => {
                        let n = local_copies.fetch_add(1, Ordering::Relaxed) + 1;
                        if n % 100 == 0 {
                            info!("Repo '{}': {n} packages satisfied locally", repo.name);
                        }
                    }
                    Err(e) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        warn!("Repo '{}': package '{}' failed: {e}", repo.name, pkg.nevra());
                    }
                }
            }
        }))
        .buffer_unordered(self.max_concurrent_downloads)
        .collect::<Vec<()>>()
        .await;

        SyncOutcome {
            downloaded: downloaded.load(Ordering::Relaxed),
            local_copies: local_copies.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
            ..Default::default()
        }
    }

    /// Satisfy one package: dedup copy if possible, else verified download
    async fn fetch_one(&self, repo: &RepoConfig, root: &Path, pkg: &Package) -> Result<FetchKind> {
        let target = root.join(&pkg.location_href);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Dedup: an identical file anywhere in the mirror trees beats the network
        if let Some(algorithm) = pkg.checksum_algorithm() {
            let lookup = {
                let cache = Arc::clone(&self.cache);
                let size = pkg.package_size;
                let checksum = pkg.checksum.clone();
                tokio::task::spawn_blocking(move || {
                    cache.find_matching_file(size, &checksum, algorithm)
                })
                .await
                .map_err(|e| Error::Init(format!("dedup lookup task failed: {e}")))?
            };
            if let Some(source) = lookup {
                if source != target {
                    std::fs::copy(&source, &target)?;
                    self.cache.register_file(&target);
                    debug!(
                        "Package '{}' copied from {}",
                        pkg.nevra(),
                        source.display()
                    );
                    return Ok(FetchKind::LocalCopy);
                }
            }
        }

        // Network fetch into the temp sibling, verify, then promote
        let url = repo.remote_url(&pkg.location_href);
        let temp = self.fetcher.download_to_temp(&url, &target).await?;

        if let Some(algorithm) = pkg.checksum_algorithm() {
            let verified = {
                let temp = temp.clone();
                let expected = pkg.checksum.clone();
                tokio::task::spawn_blocking(move || hash::verify_file(&temp, &expected, algorithm))
                    .await
                    .map_err(|e| Error::Init(format!("hash task failed: {e}")))?
            };
            if let Err(e) = verified {
                let _ = std::fs::remove_file(&temp);
                return Err(e);
            }
        }

        if target.exists() {
            std::fs::remove_file(&target)?;
        }
        std::fs::rename(&temp, &target)?;
        self.cache.register_file(&target);
        Ok(FetchKind::Network)
    }
}

/// Decide whether a package needs fetching, and why
///
/// Size is checked before hashing so intact trees cost one stat per
/// package. A declared size of 0 is treated as unknown rather than
/// forcing a mismatch. Files that exist but cannot be hashed count as
/// corrupted and are re-fetched.
pub fn fetch_reason(root: &Path, pkg: &Package) -> Option<FetchReason> {
    let target = root.join(&pkg.location_href);
    let meta = match std::fs::metadata(&target) {
        Ok(meta) if meta.is_file() => meta,
        _ => return Some(FetchReason::Missing),
    };

    if pkg.package_size > 0 && meta.len() != pkg.package_size {
        return Some(FetchReason::SizeMismatch);
    }

    match pkg.checksum_algorithm() {
        Some(algorithm) => match hash::hash_file(algorithm, &target) {
            Ok(actual) if actual == pkg.checksum => None,
            _ => Some(FetchReason::Corrupted),
        },
        None => None,
    }
}

/// Count how much of the local tree matches its own primary index
///
/// Used between cycles to see what the next run will have to repair;
/// only existence and size are checked, not digests.
pub fn check_local_completeness(repo: &RepoConfig) -> Result<CompletenessReport> {
    let root = PathBuf::from(&repo.local_path);
    let repomd_path = root.join("repodata").join("repomd.xml");
    let repomd_text = std::fs::read_to_string(&repomd_path)?;
    let repomd = Repomd::parse(&repomd_text)?;

    let primary_href = repomd
        .data_href("primary")
        .ok_or_else(|| Error::NotFound(format!("repo '{}' has no primary index", repo.name)))?;
    let primary_path = safe_join(&root, primary_href)
        .ok_or_else(|| Error::Parse(format!("unsafe primary href '{primary_href}'")))?;
    let packages = parse_primary_file(&primary_path)?;

    let mut report = CompletenessReport {
        total: packages.len(),
        ..Default::default()
    };
    for pkg in &packages {
        let target = root.join(&pkg.location_href);
        match std::fs::metadata(&target) {
            Ok(meta) if pkg.package_size == 0 || meta.len() == pkg.package_size => {
                report.present += 1;
            }
            Ok(_) => report.size_mismatched += 1,
            Err(_) => report.missing += 1,
        }
    }
    Ok(report)
}

/// Join a repo-relative href onto the root, rejecting escapes
pub(crate) fn safe_join(root: &Path, href: &str) -> Option<PathBuf> {
    if href.is_empty() {
        return None;
    }
    let relative = Path::new(href);
    if !relative.is_relative() {
        return None;
    }
    if !relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }
    Some(root.join(relative))
}
