// src/error.rs

//! Crate-wide error type.
//!
//! Errors are caught at the smallest meaningful scope (per metadata
//! artifact, per package) and converted into logged counters by the
//! sync engine and orchestrator; nothing here aborts a whole cycle.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by mirror operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("initialization failed: {0}")]
    Init(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
