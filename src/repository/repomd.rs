// src/repository/repomd.rs

//! Parser for `repomd.xml`
//!
//! `repomd.xml` is the small index at `{base_url}/repodata/repomd.xml`
//! describing the other metadata streams (primary, filelists, other,
//! group) by href, size, and checksum. `checksum`/`size` refer to the
//! artifact as stored on disk; `open-checksum`/`open-size` to its
//! decompressed form.

use crate::error::{Error, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

/// One `<data>` entry of a repomd document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepomdData {
    /// Stream type: `primary`, `filelists`, `other`, `group`, ...
    pub data_type: String,
    /// Path relative to the repository root
    pub href: String,
    /// Hex checksum of the on-disk artifact
    pub checksum: String,
    /// Checksum algorithm name, `sha256` unless upstream says otherwise
    pub checksum_type: String,
    /// Hex checksum of the decompressed artifact, when published
    pub open_checksum: String,
    pub open_checksum_type: String,
    /// Size of the on-disk artifact in bytes
    pub size: u64,
    /// Size of the decompressed artifact in bytes
    pub open_size: u64,
    pub timestamp: u64,
}

/// Parsed repomd document
#[derive(Debug, Clone, Default)]
pub struct Repomd {
    pub revision: String,
    pub data: Vec<RepomdData>,
}

impl Repomd {
    /// Parse a repomd document from its XML text
    ///
    /// Element matching is on local names, so both `ns:data` and `data`
    /// forms are accepted. Missing numeric fields default to 0, missing
    /// text to the empty string.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut repomd = Repomd::default();
        let mut current: Option<RepomdData> = None;
        let mut current_tag = String::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                    let tag = local_name(e.name().as_ref());
                    match tag.as_str() {
                        "data" => {
                            let mut entry = RepomdData {
                                checksum_type: "sha256".to_string(),
                                open_checksum_type: "sha256".to_string(),
                                ..Default::default()
                            };
                            entry.data_type = attribute(e, "type").unwrap_or_default();
                            current = Some(entry);
                        }
                        "location" => {
                            if let Some(entry) = current.as_mut() {
                                entry.href = attribute(e, "href").unwrap_or_default();
                            }
                        }
                        "checksum" => {
                            if let (Some(entry), Some(t)) = (current.as_mut(), attribute(e, "type"))
                            {
                                entry.checksum_type = t;
                            }
                            current_tag = tag;
                        }
                        "open-checksum" => {
                            if let (Some(entry), Some(t)) = (current.as_mut(), attribute(e, "type"))
                            {
                                entry.open_checksum_type = t;
                            }
                            current_tag = tag;
                        }
                        _ => current_tag = tag,
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = e
                        .unescape()
                        .map_err(|err| Error::Parse(format!("invalid repomd text: {err}")))?
                        .into_owned();
                    match current.as_mut() {
                        Some(entry) => match current_tag.as_str() {
                            "checksum" => entry.checksum = text.to_lowercase(),
                            "open-checksum" => entry.open_checksum = text.to_lowercase(),
                            "size" => entry.size = text.parse().unwrap_or(0),
                            "open-size" => entry.open_size = text.parse().unwrap_or(0),
                            "timestamp" => {
                                // Some repos publish fractional timestamps
                                entry.timestamp = text.parse::<f64>().unwrap_or(0.0) as u64;
                            }
                            _ => {}
                        },
                        None => {
                            if current_tag == "revision" {
                                repomd.revision = text;
                            }
                        }
                    }
                }
                Ok(Event::End(ref e)) => {
                    if local_name(e.name().as_ref()) == "data" {
                        if let Some(entry) = current.take() {
                            repomd.data.push(entry);
                        }
                    }
                    current_tag.clear();
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(Error::Parse(format!("malformed repomd.xml: {e}"))),
                _ => {}
            }
            buf.clear();
        }

        Ok(repomd)
    }

    /// Href of the data entry with the given type, if present
    pub fn data_href(&self, data_type: &str) -> Option<&str> {
        self.data
            .iter()
            .find(|d| d.data_type == data_type)
            .map(|d| d.href.as_str())
    }
}

/// Strip a namespace prefix from a qualified tag name
pub(crate) fn local_name(name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

/// Read one attribute by local name, lossily decoded
pub(crate) fn attribute(e: &quick_xml::events::BytesStart<'_>, key: &str) -> Option<String> {
    e.attributes().filter_map(|a| a.ok()).find_map(|a| {
        if local_name(a.key.as_ref()) == key {
            Some(String::from_utf8_lossy(&a.value).into_owned())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo" xmlns:rpm="http://linux.duke.edu/metadata/rpm">
  <revision>1587512243</revision>
  <data type="primary">
    <checksum type="sha256">1e4b8c1f08ffc5d7a52e22a1aabaf9dff81b0ae372a21da38a2071b8a24fdd24</checksum>
    <open-checksum type="sha256">465ee0569a6d7c5a1aa87d6ec25a37835e80fa35e2396be8180a4c22bbd8ad7b</open-checksum>
    <location href="repodata/1e4b8c1f-primary.xml.gz"/>
    <timestamp>1587512243</timestamp>
    <size>3319920</size>
    <open-size>30067389</open-size>
  </data>
  <data type="group">
    <checksum type="sha256">f9a5b9038c1d2ba4bdef9d1e4774ba18cb4e75296496ac2d6a2bf9b32cc10b56</checksum>
    <location href="repodata/comps.xml"/>
    <timestamp>1587512230</timestamp>
    <size>1048576</size>
  </data>
</repomd>
"#;

    #[test]
    fn test_parse_data_entries() {
        let repomd = Repomd::parse(SAMPLE).unwrap();
        assert_eq!(repomd.revision, "1587512243");
        assert_eq!(repomd.data.len(), 2);

        let primary = &repomd.data[0];
        assert_eq!(primary.data_type, "primary");
        assert_eq!(primary.href, "repodata/1e4b8c1f-primary.xml.gz");
        assert_eq!(primary.checksum_type, "sha256");
        assert_eq!(
            primary.checksum,
            "1e4b8c1f08ffc5d7a52e22a1aabaf9dff81b0ae372a21da38a2071b8a24fdd24"
        );
        assert_eq!(
            primary.open_checksum,
            "465ee0569a6d7c5a1aa87d6ec25a37835e80fa35e2396be8180a4c22bbd8ad7b"
        );
        assert_eq!(primary.size, 3_319_920);
        assert_eq!(primary.open_size, 30_067_389);
        assert_eq!(primary.timestamp, 1_587_512_243);

        let group = &repomd.data[1];
        assert_eq!(group.data_type, "group");
        assert_eq!(group.open_checksum, "");
        assert_eq!(group.open_size, 0);
    }

    #[test]
    fn test_data_href_lookup() {
        let repomd = Repomd::parse(SAMPLE).unwrap();
        assert_eq!(
            repomd.data_href("primary"),
            Some("repodata/1e4b8c1f-primary.xml.gz")
        );
        assert_eq!(repomd.data_href("group"), Some("repodata/comps.xml"));
        assert_eq!(repomd.data_href("filelists"), None);
    }

    #[test]
    fn test_namespace_prefixed_elements() {
        let xml = r#"<repo:repomd xmlns:repo="http://linux.duke.edu/metadata/repo">
  <repo:revision>7</repo:revision>
  <repo:data type="primary">
    <repo:checksum type="sha256">AB12</repo:checksum>
    <repo:location href="repodata/primary.xml.gz"/>
    <repo:size>10</repo:size>
  </repo:data>
</repo:repomd>"#;
        let repomd = Repomd::parse(xml).unwrap();
        assert_eq!(repomd.revision, "7");
        assert_eq!(repomd.data[0].checksum, "ab12");
        assert_eq!(repomd.data_href("primary"), Some("repodata/primary.xml.gz"));
    }

    #[test]
    fn test_missing_fields_default() {
        let xml = r#"<repomd><data type="other"><location href="repodata/other.xml.gz"/></data></repomd>"#;
        let repomd = Repomd::parse(xml).unwrap();
        let entry = &repomd.data[0];
        assert_eq!(entry.checksum, "");
        assert_eq!(entry.checksum_type, "sha256");
        assert_eq!(entry.size, 0);
        assert_eq!(entry.timestamp, 0);
    }

    #[test]
    fn test_malformed_xml_is_parse_error() {
        let err = Repomd::parse("<repomd><revision>&bogus;</revision></repomd>").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}
