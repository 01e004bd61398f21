// src/repository/mod.rs

//! Repository mirroring: change detection, metadata parsing, selective
//! package fetch, and fallback metadata generation.

pub mod cache;
pub mod client;
pub mod detect;
pub mod metadata;
pub mod primary;
pub mod repomd;
pub mod sync;

pub use cache::PackageCache;
pub use client::Fetcher;
pub use metadata::{ensure_metadata, parse_rpm_filename, RpmNameParts};
pub use primary::{parse_primary, parse_primary_file, Package};
pub use repomd::{Repomd, RepomdData};
pub use sync::{
    check_local_completeness, CompletenessReport, FetchReason, SyncEngine, SyncOutcome,
};
