//! Layer Metadata Generator.
//!
//! Digests the finished layer and renders the two buildpack discovery
//! labels.  Pure: nothing here touches the filesystem or the network.

use std::collections::BTreeMap;
use std::fmt;

use hybridpack_oci::digest::sha256_digest;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::descriptor::{BuildpackDescriptor, Stack};
use crate::Result;

/// Label carrying the per-buildpack layer index.
pub const LAYERS_LABEL: &str = "io.buildpacks.buildpack.layers";

/// Label carrying the package-level identity.
pub const METADATA_LABEL: &str = "io.buildpacks.buildpackage.metadata";

/// `sha256:<lowercase hex>` digest of an uncompressed layer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerDigest(String);

impl LayerDigest {
    pub fn of(bytes: &[u8]) -> Self {
        Self(sha256_digest(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One `<id>/<version>` record of the layer index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerEntry {
    pub api: String,
    pub stacks: Vec<Stack>,
    #[serde(rename = "layerDiffID")]
    pub layer_diff_id: LayerDigest,
}

/// buildpack id → version → entry.
pub type LayerIndex = BTreeMap<String, BTreeMap<String, LayerEntry>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub id: String,
    pub version: String,
    pub stacks: Vec<Stack>,
}

/// Digest plus both rendered label documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerMetadata {
    digest: LayerDigest,
    layers_json: String,
    metadata_json: String,
}

impl LayerMetadata {
    /// Digest `layer` and render the labels for `descriptor`.
    pub fn generate(layer: &[u8], descriptor: &BuildpackDescriptor) -> Result<Self> {
        let digest = LayerDigest::of(layer);

        let mut versions = BTreeMap::new();
        versions.insert(
            descriptor.version.clone(),
            LayerEntry {
                api: descriptor.api.clone(),
                stacks: descriptor.stacks.clone(),
                layer_diff_id: digest.clone(),
            },
        );
        let mut index = LayerIndex::new();
        index.insert(descriptor.id.clone(), versions);

        let package = PackageMetadata {
            id: descriptor.id.clone(),
            version: descriptor.version.clone(),
            stacks: descriptor.stacks.clone(),
        };

        let layers_json = serde_json::to_string(&index)?;
        let metadata_json = serde_json::to_string(&package)?;
        debug!(digest = %digest, size = layer.len(), "generated layer metadata");

        Ok(Self {
            digest,
            layers_json,
            metadata_json,
        })
    }

    pub fn digest(&self) -> &LayerDigest {
        &self.digest
    }

    pub fn layers_json(&self) -> &str {
        &self.layers_json
    }

    pub fn metadata_json(&self) -> &str {
        &self.metadata_json
    }

    /// Label key/value pairs for the image config.
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LAYERS_LABEL.to_string(), self.layers_json.clone()),
            (METADATA_LABEL.to_string(), self.metadata_json.clone()),
        ])
    }
}
