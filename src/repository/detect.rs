// src/repository/detect.rs

//! Upstream change detection
//!
//! Before a repo is synced, its upstream `repomd.xml` is fetched and
//! MD5-compared against the local copy. MD5 is an identity witness here,
//! not a security primitive; the per-artifact SHA-256 values inside the
//! metadata are what the sync engine verifies.
//!
//! Any doubt (missing local file, fetch failure) resolves to "changed",
//! so a transient error costs one extra sync instead of a stale mirror.

use crate::hash::{self, HashAlgorithm};
use std::path::Path;
use tracing::{debug, warn};

use super::client::Fetcher;

/// True when the upstream repomd differs from the local copy
pub async fn has_changed(fetcher: &Fetcher, remote_url: &str, local_path: &Path) -> bool {
    if !local_path.exists() {
        debug!("No local copy at {}, treating as changed", local_path.display());
        return true;
    }

    let remote_bytes = match fetcher.fetch_bytes(remote_url).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Change check for {remote_url} failed ({e}), assuming changed");
            return true;
        }
    };

    bytes_differ_from_file(&remote_bytes, local_path)
}

/// MD5-compare a byte buffer against a file on disk
///
/// Unreadable local files count as different.
pub fn bytes_differ_from_file(bytes: &[u8], local_path: &Path) -> bool {
    let local_md5 = match hash::md5_file(local_path) {
        Ok(digest) => digest,
        Err(e) => {
            warn!("Cannot hash {} ({e}), assuming changed", local_path.display());
            return true;
        }
    };
    let remote_md5 = hash::hash_bytes(HashAlgorithm::Md5, bytes);

    if remote_md5 == local_md5 {
        debug!("repomd.xml unchanged (md5 {remote_md5})");
        false
    } else {
        debug!("repomd.xml changed (local {local_md5}, upstream {remote_md5})");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_bytes_do_not_differ() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repomd.xml");
        std::fs::write(&path, b"<repomd>same</repomd>").unwrap();

        assert!(!bytes_differ_from_file(b"<repomd>same</repomd>", &path));
    }

    #[test]
    fn test_changed_bytes_differ() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repomd.xml");
        std::fs::write(&path, b"<repomd>old</repomd>").unwrap();

        assert!(bytes_differ_from_file(b"<repomd>new</repomd>", &path));
    }

    #[test]
    fn test_unreadable_local_file_differs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.xml");

        assert!(bytes_differ_from_file(b"anything", &path));
    }

    #[tokio::test]
    async fn test_missing_local_copy_is_changed() {
        let fetcher = Fetcher::new(std::time::Duration::from_secs(1)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("repodata/repomd.xml");

        // No local file means changed, without any network round trip
        assert!(has_changed(&fetcher, "http://127.0.0.1:9/repomd.xml", &absent).await);
    }
}
