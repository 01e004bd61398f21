// src/hash.rs

//! Streaming digests for mirror integrity checks
//!
//! Two algorithms cover everything this tool does:
//! - **SHA-256**: the strong per-artifact hash published in repomd/primary
//!   metadata; used to verify downloads and existing files.
//! - **MD5**: a cheap identity witness for the change detector, comparing
//!   the upstream `repomd.xml` against the local copy. Never used as a
//!   security boundary.
//!
//! All hex output is lowercase.

use md5::Md5;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Hash algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    /// SHA-256, matches upstream repository checksums
    #[default]
    Sha256,
    /// MD5, change-detection identity witness only
    Md5,
}

impl HashAlgorithm {
    /// Algorithm name as it appears in repodata `type` attributes
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Md5 => "md5",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "md5" => Ok(Self::Md5),
            _ => Err(crate::Error::Parse(format!("unknown hash algorithm: {s}"))),
        }
    }
}

enum HasherState {
    Sha256(Sha256),
    Md5(Md5),
}

/// Incremental hasher over either algorithm
pub struct Hasher {
    state: HasherState,
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
            HashAlgorithm::Md5 => HasherState::Md5(Md5::new()),
        };
        Self { state }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Sha256(h) => h.update(data),
            HasherState::Md5(h) => h.update(data),
        }
    }

    /// Finalize and return the lowercase hex digest
    pub fn finalize(self) -> String {
        match self.state {
            HasherState::Sha256(h) => format!("{:x}", h.finalize()),
            HasherState::Md5(h) => format!("{:x}", h.finalize()),
        }
    }
}

/// Compute the digest of a byte slice
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> String {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Compute the digest of data from a reader, streaming in 8 KiB chunks
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, reader: &mut R) -> io::Result<String> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}

/// Compute the digest of a file without loading it into memory
pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    hash_reader(algorithm, &mut file)
}

/// SHA-256 of a byte slice
#[inline]
pub fn sha256_bytes(data: &[u8]) -> String {
    hash_bytes(HashAlgorithm::Sha256, data)
}

/// SHA-256 of a file
#[inline]
pub fn sha256_file(path: &Path) -> io::Result<String> {
    hash_file(HashAlgorithm::Sha256, path)
}

/// MD5 of a file
#[inline]
pub fn md5_file(path: &Path) -> io::Result<String> {
    hash_file(HashAlgorithm::Md5, path)
}

/// Verify a file against an expected hex digest
///
/// Comparison is case-insensitive on the expected side; computed digests
/// are always lowercase.
pub fn verify_file(path: &Path, expected: &str, algorithm: HashAlgorithm) -> crate::Result<()> {
    let actual = hash_file(algorithm, path)?;
    if actual == expected.to_lowercase() {
        Ok(())
    } else {
        Err(crate::Error::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_bytes(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_md5_known_vector() {
        assert_eq!(
            hash_bytes(HashAlgorithm::Md5, b"hello world"),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[test]
    fn test_incremental_matches_oneshot() {
        let mut hasher = Hasher::new(HashAlgorithm::Sha256);
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finalize(), sha256_bytes(b"hello world"));
    }

    #[test]
    fn test_hash_reader_matches_bytes() {
        let data = b"some longer payload for the reader path".repeat(1000);
        let mut cursor = std::io::Cursor::new(&data);
        let streamed = hash_reader(HashAlgorithm::Sha256, &mut cursor).unwrap();
        assert_eq!(streamed, sha256_bytes(&data));
    }

    #[test]
    fn test_hash_file_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bin");
        std::fs::write(&path, b"file contents").unwrap();

        let digest = sha256_file(&path).unwrap();
        assert_eq!(digest, sha256_bytes(b"file contents"));

        assert!(verify_file(&path, &digest, HashAlgorithm::Sha256).is_ok());
        assert!(verify_file(&path, &digest.to_uppercase(), HashAlgorithm::Sha256).is_ok());

        let wrong = "0".repeat(64);
        let err = verify_file(&path, &wrong, HashAlgorithm::Sha256).unwrap_err();
        assert!(matches!(err, crate::Error::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("sha256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("SHA-256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("md5".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Md5);
        assert!("xxh128".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(HashAlgorithm::Sha256.to_string(), "sha256");
        assert_eq!(HashAlgorithm::Md5.to_string(), "md5");
    }
}
