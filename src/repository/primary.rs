// src/repository/primary.rs

//! Parser for `primary.xml`
//!
//! The primary stream lists every package in a repository: name, version,
//! architecture, strong checksum, sizes, and the repo-relative location
//! of the `.rpm` file. Descriptive fields (summary, license, vendor, ...)
//! are carried through so regenerated metadata can reproduce them.
//!
//! All fields are read defensively: missing numeric attributes default to
//! 0, missing text elements to the empty string, a missing epoch to "0",
//! and a missing checksum type to "sha256".

use crate::compression::{create_decoder, CompressionFormat};
use crate::error::{Error, Result};
use crate::hash::HashAlgorithm;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::Read;
use std::path::{Component, Path};

use super::repomd::{attribute, local_name};

/// One package record from the primary stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub arch: String,
    pub epoch: String,
    pub ver: String,
    pub rel: String,
    /// Hex digest of the package file
    pub checksum: String,
    pub checksum_type: String,
    pub summary: String,
    pub description: String,
    pub packager: String,
    pub url: String,
    pub file_time: u64,
    pub build_time: u64,
    /// Size of the `.rpm` file in bytes
    pub package_size: u64,
    pub installed_size: u64,
    pub archive_size: u64,
    /// Repo-relative path of the `.rpm` file, typically `Packages/...`
    pub location_href: String,
    pub license: String,
    pub vendor: String,
    pub group: String,
    pub buildhost: String,
    pub sourcerpm: String,
    pub header_start: u64,
    pub header_end: u64,
}

impl Package {
    fn new() -> Self {
        Self {
            epoch: "0".to_string(),
            checksum_type: "sha256".to_string(),
            ..Default::default()
        }
    }

    /// Full name-epoch:version-release.arch identity, for logs
    pub fn nevra(&self) -> String {
        format!(
            "{}-{}:{}-{}.{}",
            self.name, self.epoch, self.ver, self.rel, self.arch
        )
    }

    /// Hash algorithm for this package's declared checksum
    ///
    /// `None` only when no checksum is present at all; those packages are
    /// verified by size alone. An unrecognized type string falls back to
    /// SHA-256 like a missing one, so a declared checksum always gets
    /// content verification (and a stale sha1-era value fails it rather
    /// than being ignored).
    pub fn checksum_algorithm(&self) -> Option<HashAlgorithm> {
        if self.checksum.is_empty() {
            return None;
        }
        Some(self.checksum_type.parse().unwrap_or_default())
    }

    /// True when `location_href` points at an `.rpm` inside the repo root
    ///
    /// A href that is empty, absolute, or escapes the root via `..` is
    /// rejected; such a record is skipped rather than trusted.
    pub fn has_valid_location(&self) -> bool {
        if self.location_href.is_empty() || !self.location_href.ends_with(".rpm") {
            return false;
        }
        let path = Path::new(&self.location_href);
        path.is_relative()
            && path
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    }
}

/// Parse a primary document from its (decompressed) XML text
pub fn parse_primary(xml: &str) -> Result<Vec<Package>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut packages = Vec::new();
    let mut current: Option<Package> = None;
    let mut current_tag = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let tag = local_name(e.name().as_ref());
                match tag.as_str() {
                    "package" => current = Some(Package::new()),
                    "version" => {
                        if let Some(pkg) = current.as_mut() {
                            if let Some(epoch) = attribute(e, "epoch") {
                                pkg.epoch = epoch;
                            }
                            pkg.ver = attribute(e, "ver").unwrap_or_default();
                            pkg.rel = attribute(e, "rel").unwrap_or_default();
                        }
                    }
                    "checksum" => {
                        if let Some(pkg) = current.as_mut() {
                            if let Some(t) = attribute(e, "type") {
                                pkg.checksum_type = t;
                            }
                        }
                        current_tag = tag;
                    }
                    "time" => {
                        if let Some(pkg) = current.as_mut() {
                            pkg.file_time = numeric_attribute(e, "file");
                            pkg.build_time = numeric_attribute(e, "build");
                        }
                    }
                    "size" => {
                        if let Some(pkg) = current.as_mut() {
                            pkg.package_size = numeric_attribute(e, "package");
                            pkg.installed_size = numeric_attribute(e, "installed");
                            pkg.archive_size = numeric_attribute(e, "archive");
                        }
                    }
                    "location" => {
                        if let Some(pkg) = current.as_mut() {
                            pkg.location_href = attribute(e, "href").unwrap_or_default();
                        }
                    }
                    "header-range" => {
                        if let Some(pkg) = current.as_mut() {
                            pkg.header_start = numeric_attribute(e, "start");
                            pkg.header_end = numeric_attribute(e, "end");
                        }
                    }
                    _ => current_tag = tag,
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(pkg) = current.as_mut() {
                    let text = e
                        .unescape()
                        .map_err(|err| Error::Parse(format!("invalid primary text: {err}")))?
                        .into_owned();
                    match current_tag.as_str() {
                        "name" => pkg.name = text,
                        "arch" => pkg.arch = text,
                        "checksum" => pkg.checksum = text.to_lowercase(),
                        "summary" => pkg.summary = text,
                        "description" => pkg.description = text,
                        "packager" => pkg.packager = text,
                        "url" => pkg.url = text,
                        "license" => pkg.license = text,
                        "vendor" => pkg.vendor = text,
                        "group" => pkg.group = text,
                        "buildhost" => pkg.buildhost = text,
                        "sourcerpm" => pkg.sourcerpm = text,
                        _ => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                if local_name(e.name().as_ref()) == "package" {
                    if let Some(pkg) = current.take() {
                        packages.push(pkg);
                    }
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Parse(format!("malformed primary.xml: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    Ok(packages)
}

/// Parse a primary metadata file, decompressing by extension
///
/// `.gz` selects gzip, `.xz` selects xz, anything else is read raw.
pub fn parse_primary_file(path: &Path) -> Result<Vec<Package>> {
    let format = CompressionFormat::from_extension(&path.to_string_lossy());
    let file = std::fs::File::open(path)?;
    let mut decoder = create_decoder(file, format);

    let mut xml = String::new();
    decoder
        .read_to_string(&mut xml)
        .map_err(|e| Error::Parse(format!("failed to decompress {}: {e}", path.display())))?;

    parse_primary(&xml)
}

fn numeric_attribute(e: &quick_xml::events::BytesStart<'_>, key: &str) -> u64 {
    attribute(e, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="2">
<package type="rpm">
  <name>bash</name>
  <arch>x86_64</arch>
  <version epoch="0" ver="4.2.46" rel="34.el7"/>
  <checksum type="sha256" pkgid="YES">0ca3bbc0e976a4a6e07d5bcb9673b418684cb2bb7e6dbcc5296e4a22004cf24b</checksum>
  <summary>The GNU Bourne Again shell</summary>
  <description>The GNU Bourne Again shell (Bash).</description>
  <packager>CentOS BuildSystem</packager>
  <url>http://www.gnu.org/software/bash</url>
  <time file="1575912188" build="1565266421"/>
  <size package="1036008" installed="3667796" archive="3670960"/>
  <location href="Packages/bash-4.2.46-34.el7.x86_64.rpm"/>
  <format>
    <rpm:license>GPLv3+</rpm:license>
    <rpm:vendor>CentOS</rpm:vendor>
    <rpm:group>System Environment/Shells</rpm:group>
    <rpm:buildhost>x86-01.bsys.centos.org</rpm:buildhost>
    <rpm:sourcerpm>bash-4.2.46-34.el7.src.rpm</rpm:sourcerpm>
    <rpm:header-range start="4504" end="34396"/>
  </format>
</package>
<package type="rpm">
  <name>zlib</name>
  <arch>x86_64</arch>
  <version ver="1.2.7" rel="18.el7"/>
  <location href="Packages/zlib-1.2.7-18.el7.x86_64.rpm"/>
</package>
</metadata>
"#;

    #[test]
    fn test_parse_full_record() {
        let packages = parse_primary(SAMPLE).unwrap();
        assert_eq!(packages.len(), 2);

        let bash = &packages[0];
        assert_eq!(bash.name, "bash");
        assert_eq!(bash.arch, "x86_64");
        assert_eq!(bash.epoch, "0");
        assert_eq!(bash.ver, "4.2.46");
        assert_eq!(bash.rel, "34.el7");
        assert_eq!(bash.checksum_type, "sha256");
        assert_eq!(bash.summary, "The GNU Bourne Again shell");
        assert_eq!(bash.file_time, 1_575_912_188);
        assert_eq!(bash.build_time, 1_565_266_421);
        assert_eq!(bash.package_size, 1_036_008);
        assert_eq!(bash.installed_size, 3_667_796);
        assert_eq!(bash.archive_size, 3_670_960);
        assert_eq!(bash.location_href, "Packages/bash-4.2.46-34.el7.x86_64.rpm");
        assert_eq!(bash.license, "GPLv3+");
        assert_eq!(bash.vendor, "CentOS");
        assert_eq!(bash.group, "System Environment/Shells");
        assert_eq!(bash.buildhost, "x86-01.bsys.centos.org");
        assert_eq!(bash.sourcerpm, "bash-4.2.46-34.el7.src.rpm");
        assert_eq!(bash.header_start, 4504);
        assert_eq!(bash.header_end, 34396);
        assert_eq!(bash.nevra(), "bash-0:4.2.46-34.el7.x86_64");
    }

    #[test]
    fn test_defensive_defaults() {
        let packages = parse_primary(SAMPLE).unwrap();
        let zlib = &packages[1];
        assert_eq!(zlib.epoch, "0");
        assert_eq!(zlib.checksum, "");
        assert_eq!(zlib.checksum_type, "sha256");
        assert_eq!(zlib.package_size, 0);
        assert_eq!(zlib.summary, "");
        assert_eq!(zlib.license, "");
        assert!(zlib.checksum_algorithm().is_none());
    }

    #[test]
    fn test_checksum_algorithm() {
        let mut pkg = Package::new();
        pkg.checksum = "ab".repeat(32);
        assert_eq!(pkg.checksum_algorithm(), Some(HashAlgorithm::Sha256));

        pkg.checksum_type = "md5".to_string();
        assert_eq!(pkg.checksum_algorithm(), Some(HashAlgorithm::Md5));

        // Unknown type strings still verify, falling back to SHA-256
        pkg.checksum_type = "sha1".to_string();
        assert_eq!(pkg.checksum_algorithm(), Some(HashAlgorithm::Sha256));

        // Only an absent checksum disables content verification
        pkg.checksum.clear();
        assert!(pkg.checksum_algorithm().is_none());
    }

    #[test]
    fn test_location_validation() {
        let mut pkg = Package::new();
        assert!(!pkg.has_valid_location());

        pkg.location_href = "Packages/foo-1-1.el7.x86_64.rpm".to_string();
        assert!(pkg.has_valid_location());

        pkg.location_href = "foo-1-1.el7.x86_64.rpm".to_string();
        assert!(pkg.has_valid_location());

        pkg.location_href = "../outside/foo.rpm".to_string();
        assert!(!pkg.has_valid_location());

        pkg.location_href = "/etc/passwd.rpm".to_string();
        assert!(!pkg.has_valid_location());

        pkg.location_href = "Packages/not-a-package.txt".to_string();
        assert!(!pkg.has_valid_location());
    }

    #[test]
    fn test_parse_gzipped_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primary.xml.gz");

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(SAMPLE.as_bytes()).unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        let packages = parse_primary_file(&path).unwrap();
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "bash");
    }

    #[test]
    fn test_parse_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primary.xml");
        std::fs::write(&path, SAMPLE).unwrap();

        let packages = parse_primary_file(&path).unwrap();
        assert_eq!(packages.len(), 2);
    }

    #[test]
    fn test_garbage_compressed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primary.xml.gz");
        std::fs::write(&path, b"definitely not gzip").unwrap();

        let err = parse_primary_file(&path).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}
