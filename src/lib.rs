// src/lib.rs

//! rpmirror - local mirror synchronizer for RPM repositories
//!
//! Maintains byte-for-byte mirrors of upstream RPM repositories (CentOS
//! vault channels, Docker CE stable, EPEL). Each cycle detects upstream
//! changes cheaply, pulls only new or damaged packages, reuses identical
//! packages already present in sibling mirrors, and keeps the repodata
//! usable for standard RPM clients.
//!
//! # Architecture
//!
//! - Change detection: MD5 compare of upstream vs local `repomd.xml`
//! - Selective fetch: primary index diffed against the local tree under
//!   size and checksum constraints
//! - Crash safety: downloads land in `*.downloading` siblings and are
//!   renamed only after verification
//! - Dedup: a size-bucketed, digest-memoized cache across all mirror
//!   roots turns identical packages into local copies
//! - Fallback metadata: a minimal `primary.xml.gz` + `repomd.xml` pair
//!   regenerated when upstream metadata is unusable

pub mod compression;
pub mod config;
mod error;
pub mod hash;
pub mod orchestrator;
pub mod repository;

pub use config::{MirrorConfig, RepoConfig};
pub use error::{Error, Result};
pub use hash::HashAlgorithm;
pub use orchestrator::{CycleSummary, Orchestrator, RepoResult};
pub use repository::{
    ensure_metadata, Fetcher, Package, PackageCache, Repomd, SyncEngine, SyncOutcome,
};
