use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use crate::config::MEDIA_TYPE_OCI_LAYER_GZIP;
use crate::digest::sha256_digest;
use crate::error::{OciError, Result};

/// Gzip magic bytes (1f 8b).
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// An image layer held in memory, in both its uncompressed (diff) and
/// compressed (blob) forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    /// Digest of the uncompressed tar stream (the config `diff_ids` entry).
    pub diff_id: String,
    /// Digest of the gzip blob (the manifest descriptor digest).
    pub digest: String,
    /// OCI media type of the blob.
    pub media_type: String,
    tar: Vec<u8>,
    blob: Vec<u8>,
}

impl Layer {
    /// Wrap an uncompressed tar stream, compressing it for transport.
    ///
    /// Compression uses a fixed gzip header (no mtime, no file name), so the
    /// same tar always yields the same blob digest.
    pub fn from_tar(tar: Vec<u8>) -> Result<Self> {
        let diff_id = sha256_digest(&tar);
        Self::from_tar_with_diff_id(tar, diff_id)
    }

    /// Like [`Layer::from_tar`], for callers that already digested `tar`.
    /// `diff_id` is trusted as given.
    pub fn from_tar_with_diff_id(tar: Vec<u8>, diff_id: String) -> Result<Self> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&tar)
            .map_err(|e| OciError::Layer(format!("gzip layer: {}", e)))?;
        let blob = encoder
            .finish()
            .map_err(|e| OciError::Layer(format!("gzip layer: {}", e)))?;

        let layer = Self {
            diff_id,
            digest: sha256_digest(&blob),
            media_type: MEDIA_TYPE_OCI_LAYER_GZIP.to_string(),
            tar,
            blob,
        };
        debug!(
            diff_id = %layer.diff_id,
            digest = %layer.digest,
            size = layer.size(),
            "prepared layer",
        );
        Ok(layer)
    }

    /// Accept a layer that may already be gzip-compressed.  Compressed input
    /// is decoded first so the diff ID is always computed over the raw tar.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.len() >= 2 && data[..2] == GZIP_MAGIC {
            let mut tar = Vec::new();
            GzDecoder::new(&data[..])
                .read_to_end(&mut tar)
                .map_err(|e| OciError::Layer(format!("decompress layer: {}", e)))?;
            Self::from_tar(tar)
        } else {
            Self::from_tar(data)
        }
    }

    /// Compressed blob size in bytes.
    pub fn size(&self) -> u64 {
        self.blob.len() as u64
    }

    /// The uncompressed tar stream.
    pub fn tar(&self) -> &[u8] {
        &self.tar
    }

    /// The gzip blob as pushed to a registry.
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
