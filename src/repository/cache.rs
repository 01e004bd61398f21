// src/repository/cache.rs

//! Cross-repo content cache for package deduplication
//!
//! Indexes every `.rpm` under the configured mirror roots by file size.
//! A dedup lookup filters by size first, then hashes the few candidates
//! in the bucket; package sizes are a strong (though not perfect)
//! fingerprint, so almost all misses cost one map lookup and no I/O.
//!
//! Digests are memoized per `(algorithm, path)`. A memo entry records the
//! file size it was computed at and is discarded when the size changes.

use crate::hash::{self, HashAlgorithm};
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Size-indexed lookup of local `.rpm` files across all mirror trees
pub struct PackageCache {
    /// size in bytes -> paths of that size, insertion-ordered
    by_size: Mutex<HashMap<u64, Vec<PathBuf>>>,
    /// (algorithm, path) -> (size at hash time, hex digest)
    digests: DashMap<(HashAlgorithm, PathBuf), (u64, String)>,
}

impl PackageCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            by_size: Mutex::new(HashMap::new()),
            digests: DashMap::new(),
        }
    }

    /// Build a cache over the given mirror roots
    pub fn build<P: AsRef<Path>>(roots: &[P]) -> Self {
        let cache = Self::new();
        for root in roots {
            cache.index_tree(root.as_ref());
        }
        cache
    }

    /// Walk one tree and index every `.rpm` file by size
    ///
    /// Missing roots are fine (a repo that has never synced yet).
    pub fn index_tree(&self, root: &Path) {
        if !root.exists() {
            debug!("Cache index: {} does not exist yet, skipping", root.display());
            return;
        }

        let mut indexed = 0usize;
        let mut by_size = self.by_size.lock().unwrap();
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().and_then(|e| e.to_str()) != Some("rpm") {
                continue;
            }
            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(e) => {
                    warn!("Cache index: cannot stat {}: {e}", entry.path().display());
                    continue;
                }
            };
            by_size
                .entry(size)
                .or_default()
                .push(entry.path().to_path_buf());
            indexed += 1;
        }

        info!("Indexed {} packages under {}", indexed, root.display());
    }

    /// Total number of indexed files
    pub fn len(&self) -> usize {
        self.by_size.lock().unwrap().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find a local file with the given size and digest
    ///
    /// Returns the first candidate in the size bucket whose digest under
    /// `algorithm` matches `expected`. Candidates that vanished or cannot
    /// be read are skipped. The returned path is guaranteed to have had
    /// exactly the requested size and digest at check time.
    pub fn find_matching_file(
        &self,
        expected_size: u64,
        expected_checksum: &str,
        algorithm: HashAlgorithm,
    ) -> Option<PathBuf> {
        if expected_size == 0 || expected_checksum.is_empty() {
            return None;
        }
        let expected = expected_checksum.to_lowercase();

        let candidates: Vec<PathBuf> = {
            let by_size = self.by_size.lock().unwrap();
            by_size.get(&expected_size)?.clone()
        };

        for candidate in candidates {
            let current_size = match std::fs::metadata(&candidate) {
                Ok(meta) if meta.is_file() => meta.len(),
                _ => continue,
            };
            if current_size != expected_size {
                continue;
            }
            match self.digest_of(&candidate, current_size, algorithm) {
                Some(digest) if digest == expected => return Some(candidate),
                _ => {}
            }
        }

        None
    }

    /// Register a freshly written file in the size index
    pub fn register_file(&self, path: &Path) {
        let size = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!("Cannot register {}: {e}", path.display());
                return;
            }
        };
        let mut by_size = self.by_size.lock().unwrap();
        let bucket = by_size.entry(size).or_default();
        if !bucket.iter().any(|p| p == path) {
            bucket.push(path.to_path_buf());
        }
    }

    /// Memoized digest of a file, recomputed when the size changed
    fn digest_of(&self, path: &Path, current_size: u64, algorithm: HashAlgorithm) -> Option<String> {
        let key = (algorithm, path.to_path_buf());

        if let Some(entry) = self.digests.get(&key) {
            let (memo_size, digest) = entry.value();
            if *memo_size == current_size {
                return Some(digest.clone());
            }
        }

        match hash::hash_file(algorithm, path) {
            Ok(digest) => {
                self.digests.insert(key, (current_size, digest.clone()));
                Some(digest)
            }
            Err(e) => {
                debug!("Cannot hash cache candidate {}: {e}", path.display());
                None
            }
        }
    }
}

impl Default for PackageCache {
    fn default() -> Self {
        Self::new()
    }
}
