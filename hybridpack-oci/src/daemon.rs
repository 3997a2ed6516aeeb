use std::path::PathBuf;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::digest::hex_from_digest;
use crate::error::{OciError, Result};
use crate::image::Image;
use crate::registry::ImageRef;

/// Docker's default engine socket.
pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

/// Where the Docker engine API listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonEndpoint {
    Unix(PathBuf),
    Tcp(String),
}

impl DaemonEndpoint {
    /// Parse a `DOCKER_HOST` style value (`unix:///path` or `tcp://host:port`).
    pub fn parse(host: &str) -> Result<Self> {
        if let Some(path) = host.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(OciError::Daemon(format!("empty socket path in {}", host)));
            }
            Ok(Self::Unix(PathBuf::from(path)))
        } else if let Some(addr) = host.strip_prefix("tcp://") {
            let addr = addr.trim_end_matches('/');
            if addr.is_empty() {
                return Err(OciError::Daemon(format!("empty address in {}", host)));
            }
            Ok(Self::Tcp(addr.to_string()))
        } else {
            Err(OciError::Daemon(format!(
                "unsupported docker host {} (expected unix:// or tcp://)",
                host
            )))
        }
    }
}

/// Minimal Docker engine client: loads images through `POST /images/load`.
pub struct DaemonClient {
    endpoint: DaemonEndpoint,
}

impl DaemonClient {
    pub fn new(endpoint: DaemonEndpoint) -> Self {
        Self { endpoint }
    }

    pub fn from_host(host: &str) -> Result<Self> {
        Ok(Self::new(DaemonEndpoint::parse(host)?))
    }

    /// Load `image` into the daemon tagged as `image_ref`.  Returns the
    /// daemon's progress output (e.g. "Loaded image: …").
    pub async fn load(&self, image_ref: &ImageRef, image: &Image) -> Result<String> {
        image_ref.require_tag()?;
        let archive = docker_archive(image_ref, image)?;

        info!(
            reference = %image_ref,
            endpoint = ?self.endpoint,
            size = archive.len(),
            "loading image into daemon",
        );

        let head = format!(
            "POST /images/load?quiet=0 HTTP/1.1\r\nHost: docker\r\nContent-Type: application/x-tar\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            archive.len()
        );

        let raw = match &self.endpoint {
            #[cfg(unix)]
            DaemonEndpoint::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path).await.map_err(|e| {
                    OciError::Daemon(format!("connect {}: {}", path.display(), e))
                })?;
                round_trip(stream, &head, &archive).await?
            }
            #[cfg(not(unix))]
            DaemonEndpoint::Unix(path) => {
                return Err(OciError::Daemon(format!(
                    "unix sockets are not supported on this platform: {}",
                    path.display()
                )));
            }
            DaemonEndpoint::Tcp(addr) => {
                let stream = tokio::net::TcpStream::connect(addr)
                    .await
                    .map_err(|e| OciError::Daemon(format!("connect {}: {}", addr, e)))?;
                round_trip(stream, &head, &archive).await?
            }
        };

        let response = parse_response(&raw)?;
        debug!(status = response.status, "daemon responded");
        if response.status != 200 {
            return Err(OciError::Daemon(format!(
                "POST /images/load returned {}: {}",
                response.status,
                String::from_utf8_lossy(&response.body).trim()
            )));
        }
        load_output(&response.body)
    }
}

// ---------------------------------------------------------------------------
// docker-save archive
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SaveManifestEntry {
    #[serde(rename = "Config")]
    config: String,
    #[serde(rename = "RepoTags")]
    repo_tags: Vec<String>,
    #[serde(rename = "Layers")]
    layers: Vec<String>,
}

/// Build the `docker save` tarball layout understood by `/images/load`:
/// the config blob, one uncompressed `layer.tar` per layer, and a
/// `manifest.json` tying them to the tag.
pub fn docker_archive(image_ref: &ImageRef, image: &Image) -> Result<Vec<u8>> {
    let config_blob = image.config_blob()?;
    let config_name = format!("{}.json", hex_from_digest(&image.id()?));

    let mut builder = tar::Builder::new(Vec::new());
    append_file(&mut builder, &config_name, &config_blob)?;

    let mut layer_names = Vec::with_capacity(image.layers().len());
    for layer in image.layers() {
        let name = format!("{}/layer.tar", hex_from_digest(&layer.diff_id));
        append_file(&mut builder, &name, layer.tar())?;
        layer_names.push(name);
    }

    let save_manifest = vec![SaveManifestEntry {
        config: config_name,
        repo_tags: vec![image_ref.to_string()],
        layers: layer_names,
    }];
    append_file(
        &mut builder,
        "manifest.json",
        &serde_json::to_vec(&save_manifest)?,
    )?;

    Ok(builder.into_inner()?)
}

fn append_file(builder: &mut tar::Builder<Vec<u8>>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_ustar();
    header.set_path(name)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    builder.append(&header, data)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// HTTP/1.1 over a raw stream
// ---------------------------------------------------------------------------

async fn round_trip<S>(mut stream: S, head: &str, body: &[u8]) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    Ok(raw)
}

struct HttpResponse {
    status: u16,
    body: Vec<u8>,
}

fn parse_response(raw: &[u8]) -> Result<HttpResponse> {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(|| OciError::Daemon("truncated HTTP response".to_string()))?;
    let head = String::from_utf8_lossy(&raw[..split]);
    let body = &raw[split + 4..];

    let mut lines = head.lines();
    let status_line = lines.next().unwrap_or("");
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| OciError::Daemon(format!("bad status line: {}", status_line)))?;

    let chunked = lines.any(|line| {
        let lower = line.to_ascii_lowercase();
        lower.starts_with("transfer-encoding:") && lower.contains("chunked")
    });

    let body = if chunked {
        decode_chunked(body)?
    } else {
        body.to_vec()
    };
    Ok(HttpResponse { status, body })
}

fn decode_chunked(mut data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        let line_end = data
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or_else(|| OciError::Daemon("truncated chunk header".to_string()))?;
        let size_line = String::from_utf8_lossy(&data[..line_end]);
        let size_hex = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| OciError::Daemon(format!("bad chunk size: {}", size_hex)))?;
        data = &data[line_end + 2..];
        if size == 0 {
            return Ok(out);
        }
        if data.len() < size {
            return Err(OciError::Daemon("truncated chunk body".to_string()));
        }
        out.extend_from_slice(&data[..size]);
        data = data.get(size + 2..).unwrap_or(&[]);
    }
}

/// The load endpoint streams JSON messages; collect `stream` text and fail
/// on the first `error`.
fn load_output(body: &[u8]) -> Result<String> {
    let text = String::from_utf8_lossy(body);
    let mut output = String::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Ok(message) = serde_json::from_str::<serde_json::Value>(line) else {
            output.push_str(line);
            output.push('\n');
            continue;
        };
        if let Some(error) = message.get("error").and_then(|v| v.as_str()) {
            return Err(OciError::Daemon(error.to_string()));
        }
        if let Some(stream) = message.get("stream").and_then(|v| v.as_str()) {
            output.push_str(stream);
        }
    }
    Ok(output)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
