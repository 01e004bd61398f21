// src/repository/metadata.rs

//! Metadata validation and fallback regeneration
//!
//! Upstream-supplied repodata is always preferred: if the local
//! `repomd.xml` parses and every file it references exists, it is kept
//! verbatim. Only when that fails is a minimal pair regenerated from the
//! `.rpm` files on disk: a `primary.xml.gz` plus a `repomd.xml` that
//! points at it.
//!
//! The regenerated metadata carries no `filelists` or `other` streams.
//! That is enough for install-time resolution but not for file-level
//! queries like `yum provides`.

use crate::error::{Error, Result};
use crate::hash;
use flate2::write::GzEncoder;
use flate2::Compression;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::repomd::Repomd;
use super::sync::safe_join;

const COMMON_NS: &str = "http://linux.duke.edu/metadata/common";
const RPM_NS: &str = "http://linux.duke.edu/metadata/rpm";
const REPO_NS: &str = "http://linux.duke.edu/metadata/repo";

/// Architectures recognized when splitting an RPM filename
const KNOWN_ARCHES: &[&str] = &[
    "x86_64", "noarch", "i686", "i386", "aarch64", "ppc64le", "s390x",
];

/// Header bytes a client may range-request; the placeholder range in
/// regenerated metadata is capped at this
const HEADER_RANGE_CAP: u64 = 65_536;

/// Name/version/release/arch recovered from an RPM filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpmNameParts {
    pub name: String,
    pub version: String,
    pub release: String,
    pub arch: String,
}

/// One scanned `.rpm` file, ready to be described in primary.xml
struct RpmEntry {
    parts: RpmNameParts,
    /// Repo-relative location href
    href: String,
    checksum: String,
    size: u64,
    mtime: u64,
}

/// Make sure a repo has client-usable metadata
///
/// Keeps existing metadata whenever `repomd.xml` parses and all of its
/// referenced files are present; otherwise regenerates the minimal pair.
pub fn ensure_metadata(local_root: &Path, repo_name: &str) -> Result<()> {
    let repomd_path = local_root.join("repodata").join("repomd.xml");

    if repomd_path.exists() {
        match metadata_is_complete(local_root) {
            Ok(true) => {
                debug!("Repo '{repo_name}': upstream metadata is complete, keeping it");
                return Ok(());
            }
            Ok(false) => {
                info!("Repo '{repo_name}': metadata references missing files, regenerating");
            }
            Err(e) => {
                warn!("Repo '{repo_name}': cannot validate metadata ({e}), regenerating");
            }
        }
    } else {
        info!("Repo '{repo_name}': no repomd.xml, generating metadata");
    }

    generate_metadata(local_root, repo_name)
}

/// True when `repomd.xml` parses and every referenced href exists
pub fn metadata_is_complete(local_root: &Path) -> Result<bool> {
    let repomd_path = local_root.join("repodata").join("repomd.xml");
    let text = std::fs::read_to_string(&repomd_path)?;
    let repomd = Repomd::parse(&text)?;

    for entry in &repomd.data {
        let target = match safe_join(local_root, &entry.href) {
            Some(path) => path,
            None => return Ok(false),
        };
        if !target.exists() {
            debug!("Metadata file {} is missing", target.display());
            return Ok(false);
        }
    }
    Ok(true)
}

/// Regenerate `repodata/primary.xml.gz` + `repodata/repomd.xml` from the
/// `.rpm` files under the root
pub fn generate_metadata(local_root: &Path, repo_name: &str) -> Result<()> {
    let repodata_dir = local_root.join("repodata");
    std::fs::create_dir_all(&repodata_dir)?;

    let entries = scan_rpms(local_root);
    info!(
        "Repo '{repo_name}': generating metadata for {} packages",
        entries.len()
    );

    // primary.xml.gz through a digest tee on both sides of the encoder:
    // the outer writer sees the uncompressed stream (open-checksum and
    // open-size), the inner one the compressed bytes written to disk.
    let gz_path = repodata_dir.join("primary.xml.gz");
    let file = File::create(&gz_path)?;
    let compressed_tee = DigestWriter::new(BufWriter::new(file));
    let encoder = GzEncoder::new(compressed_tee, Compression::best());
    let mut open_tee = DigestWriter::new(encoder);

    write_primary(&mut open_tee, &entries)
        .map_err(|e| Error::Parse(format!("failed to write primary.xml: {e}")))?;

    let (encoder, open_checksum, open_size) = open_tee.finish();
    let (mut out, checksum, size) = encoder.finish()?.finish();
    out.flush()?;

    let revision = unix_now();
    let repomd_path = repodata_dir.join("repomd.xml");
    let repomd_file = File::create(&repomd_path)?;
    write_repomd(
        BufWriter::new(repomd_file),
        revision,
        &checksum,
        size,
        &open_checksum,
        open_size,
    )
    .map_err(|e| Error::Parse(format!("failed to write repomd.xml: {e}")))?;

    info!(
        "Repo '{repo_name}': wrote {} ({} bytes) and repomd.xml",
        gz_path.display(),
        size
    );
    Ok(())
}

/// Parse an RPM filename as `name-version-release.arch.rpm`
///
/// The trailing dot-segment is taken as the architecture only when it is
/// a known one; otherwise the arch defaults to `x86_64` and the segment
/// stays part of the release. A remainder with fewer than three
/// dash-segments keeps the whole string as the name with `version` and
/// `release` falling back to "0".
pub fn parse_rpm_filename(filename: &str) -> RpmNameParts {
    let stem = filename.strip_suffix(".rpm").unwrap_or(filename);

    let (remainder, arch) = match stem.rsplit_once('.') {
        Some((rest, last)) if KNOWN_ARCHES.contains(&last) => (rest, last),
        _ => (stem, "x86_64"),
    };

    let parts: Vec<&str> = remainder.split('-').collect();
    if parts.len() >= 3 {
        RpmNameParts {
            name: parts[..parts.len() - 2].join("-"),
            version: parts[parts.len() - 2].to_string(),
            release: parts[parts.len() - 1].to_string(),
            arch: arch.to_string(),
        }
    } else {
        RpmNameParts {
            name: remainder.to_string(),
            version: "0".to_string(),
            release: "0".to_string(),
            arch: arch.to_string(),
        }
    }
}

/// Collect every `.rpm` outside `repodata/`, hashed and stat'ed
fn scan_rpms(local_root: &Path) -> Vec<RpmEntry> {
    let repodata_dir = local_root.join("repodata");
    let mut entries = Vec::new();

    for entry in WalkDir::new(local_root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() || entry.path().starts_with(&repodata_dir) {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some("rpm") {
            continue;
        }

        let path = entry.path();
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Skipping {}: {e}", path.display());
                continue;
            }
        };
        let checksum = match hash::sha256_file(path) {
            Ok(digest) => digest,
            Err(e) => {
                warn!("Skipping unreadable {}: {e}", path.display());
                continue;
            }
        };

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let href = path
            .strip_prefix(local_root)
            .map(|rel| {
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_else(|_| filename.clone());

        entries.push(RpmEntry {
            parts: parse_rpm_filename(&filename),
            href,
            checksum,
            size: meta.len(),
            mtime: meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0),
        });
    }

    // Stable output for identical trees
    entries.sort_by(|a, b| a.href.cmp(&b.href));
    entries
}

fn write_primary<W: Write>(writer: W, entries: &[RpmEntry]) -> quick_xml::Result<()> {
    let mut xml = Writer::new_with_indent(writer, b' ', 2);
    xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("metadata");
    root.push_attribute(("xmlns", COMMON_NS));
    root.push_attribute(("xmlns:rpm", RPM_NS));
    root.push_attribute(("packages", entries.len().to_string().as_str()));
    xml.write_event(Event::Start(root))?;

    for entry in entries {
        write_package(&mut xml, entry)?;
    }

    xml.write_event(Event::End(BytesEnd::new("metadata")))?;
    Ok(())
}

fn write_package<W: Write>(xml: &mut Writer<W>, entry: &RpmEntry) -> quick_xml::Result<()> {
    let size = entry.size.to_string();
    let mtime = entry.mtime.to_string();
    let header_end = entry.size.min(HEADER_RANGE_CAP).to_string();

    let mut pkg = BytesStart::new("package");
    pkg.push_attribute(("type", "rpm"));
    xml.write_event(Event::Start(pkg))?;

    xml.create_element("name")
        .write_text_content(BytesText::new(&entry.parts.name))?;
    xml.create_element("arch")
        .write_text_content(BytesText::new(&entry.parts.arch))?;
    xml.create_element("version")
        .with_attribute(("epoch", "0"))
        .with_attribute(("ver", entry.parts.version.as_str()))
        .with_attribute(("rel", entry.parts.release.as_str()))
        .write_empty()?;
    xml.create_element("checksum")
        .with_attribute(("type", "sha256"))
        .with_attribute(("pkgid", "YES"))
        .write_text_content(BytesText::new(&entry.checksum))?;
    xml.create_element("summary")
        .write_text_content(BytesText::new(&entry.parts.name))?;
    xml.create_element("description")
        .write_text_content(BytesText::new(&entry.parts.name))?;
    xml.create_element("packager")
        .write_text_content(BytesText::new(""))?;
    xml.create_element("url")
        .write_text_content(BytesText::new(""))?;
    xml.create_element("time")
        .with_attribute(("file", mtime.as_str()))
        .with_attribute(("build", mtime.as_str()))
        .write_empty()?;
    xml.create_element("size")
        .with_attribute(("package", size.as_str()))
        .with_attribute(("installed", size.as_str()))
        .with_attribute(("archive", size.as_str()))
        .write_empty()?;
    xml.create_element("location")
        .with_attribute(("href", entry.href.as_str()))
        .write_empty()?;

    xml.write_event(Event::Start(BytesStart::new("format")))?;
    xml.create_element("rpm:license")
        .write_text_content(BytesText::new("Unknown"))?;
    xml.create_element("rpm:vendor")
        .write_text_content(BytesText::new(""))?;
    xml.create_element("rpm:group")
        .write_text_content(BytesText::new("Unspecified"))?;
    xml.create_element("rpm:buildhost")
        .write_text_content(BytesText::new(""))?;
    xml.create_element("rpm:sourcerpm")
        .write_text_content(BytesText::new(""))?;
    xml.create_element("rpm:header-range")
        .with_attribute(("start", "0"))
        .with_attribute(("end", header_end.as_str()))
        .write_empty()?;
    xml.write_event(Event::End(BytesEnd::new("format")))?;

    xml.write_event(Event::End(BytesEnd::new("package")))?;
    Ok(())
}

fn write_repomd<W: Write>(
    writer: W,
    revision: u64,
    checksum: &str,
    size: u64,
    open_checksum: &str,
    open_size: u64,
) -> quick_xml::Result<()> {
    let mut xml = Writer::new_with_indent(writer, b' ', 2);
    xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("repomd");
    root.push_attribute(("xmlns", REPO_NS));
    root.push_attribute(("xmlns:rpm", RPM_NS));
    xml.write_event(Event::Start(root))?;

    xml.create_element("revision")
        .write_text_content(BytesText::new(&revision.to_string()))?;

    let mut data = BytesStart::new("data");
    data.push_attribute(("type", "primary"));
    xml.write_event(Event::Start(data))?;
    xml.create_element("checksum")
        .with_attribute(("type", "sha256"))
        .write_text_content(BytesText::new(checksum))?;
    xml.create_element("open-checksum")
        .with_attribute(("type", "sha256"))
        .write_text_content(BytesText::new(open_checksum))?;
    xml.create_element("location")
        .with_attribute(("href", "repodata/primary.xml.gz"))
        .write_empty()?;
    xml.create_element("timestamp")
        .write_text_content(BytesText::new(&revision.to_string()))?;
    xml.create_element("size")
        .write_text_content(BytesText::new(&size.to_string()))?;
    xml.create_element("open-size")
        .write_text_content(BytesText::new(&open_size.to_string()))?;
    xml.write_event(Event::End(BytesEnd::new("data")))?;

    xml.write_event(Event::End(BytesEnd::new("repomd")))?;
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Write adapter that tees everything into a SHA-256 and a byte count
struct DigestWriter<W: Write> {
    inner: W,
    hasher: Sha256,
    len: u64,
}

impl<W: Write> DigestWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            len: 0,
        }
    }

    fn finish(self) -> (W, String, u64) {
        (self.inner, format!("{:x}", self.hasher.finalize()), self.len)
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        self.len += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
