// tests/common/mod.rs

//! Shared test utilities: a minimal in-process HTTP server and builders
//! for upstream repository fixtures.

use flate2::write::GzEncoder;
use flate2::Compression;
use rpmirror::hash::sha256_bytes;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Static file server speaking just enough HTTP/1.1 for the fetcher
///
/// Keys are request paths without the leading slash; unknown paths get a
/// 404. The accept loop dies with the server handle.
pub struct TestServer {
    pub base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn serve(files: HashMap<String, Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let files = Arc::new(files);

        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let files = Arc::clone(&files);
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut chunk = [0u8; 1024];
                    loop {
                        let Ok(n) = stream.read(&mut chunk).await else {
                            return;
                        };
                        if n == 0 {
                            break;
                        }
                        request.extend_from_slice(&chunk[..n]);
                        if request.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }

                    let head = String::from_utf8_lossy(&request);
                    let path = head
                        .split_whitespace()
                        .nth(1)
                        .unwrap_or("/")
                        .trim_start_matches('/')
                        .to_string();

                    let response = match files.get(&path) {
                        Some(body) => {
                            let mut bytes = format!(
                                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                                body.len()
                            )
                            .into_bytes();
                            bytes.extend_from_slice(body);
                            bytes
                        }
                        None => {
                            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                                .to_vec()
                        }
                    };
                    let _ = stream.write_all(&response).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            handle,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Build the file map of an upstream repo from (filename, content) pairs
///
/// Packages land under `Packages/`, described by a gzipped primary index
/// and a repomd.xml whose declared checksums match the served bytes.
pub fn build_upstream(packages: &[(&str, &[u8])]) -> HashMap<String, Vec<u8>> {
    let mut files = HashMap::new();

    let mut package_xml = String::new();
    for (filename, content) in packages {
        let href = format!("Packages/{filename}");
        package_xml.push_str(&format!(
            r#"<package type="rpm">
  <name>{name}</name>
  <arch>x86_64</arch>
  <version epoch="0" ver="1" rel="1.el7"/>
  <checksum type="sha256" pkgid="YES">{checksum}</checksum>
  <summary>{name}</summary>
  <description>{name}</description>
  <time file="1600000000" build="1600000000"/>
  <size package="{size}" installed="{size}" archive="{size}"/>
  <location href="{href}"/>
</package>
"#,
            name = filename.split('-').next().unwrap_or(filename),
            checksum = sha256_bytes(content),
            size = content.len(),
        ));
        files.insert(href, content.to_vec());
    }

    let primary_xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<metadata xmlns=\"http://linux.duke.edu/metadata/common\" xmlns:rpm=\"http://linux.duke.edu/metadata/rpm\" packages=\"{}\">\n{}</metadata>\n",
        packages.len(),
        package_xml
    );

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(primary_xml.as_bytes()).unwrap();
    let primary_gz = encoder.finish().unwrap();

    let repomd_xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo" xmlns:rpm="http://linux.duke.edu/metadata/rpm">
  <revision>1600000000</revision>
  <data type="primary">
    <checksum type="sha256">{checksum}</checksum>
    <open-checksum type="sha256">{open_checksum}</open-checksum>
    <location href="repodata/primary.xml.gz"/>
    <timestamp>1600000000</timestamp>
    <size>{size}</size>
    <open-size>{open_size}</open-size>
  </data>
</repomd>
"#,
        checksum = sha256_bytes(&primary_gz),
        open_checksum = sha256_bytes(primary_xml.as_bytes()),
        size = primary_gz.len(),
        open_size = primary_xml.len(),
    );

    files.insert("repodata/primary.xml.gz".to_string(), primary_gz);
    files.insert("repodata/repomd.xml".to_string(), repomd_xml.into_bytes());
    files
}
