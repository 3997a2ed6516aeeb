//! Sources for the Windows base layer that sits underneath the hybrid layer.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hybridpack_oci::Layer;
use tracing::{info, warn};

use crate::archive::{build_layer, ArchiveEntry};
use crate::planner::{Access, PermissionPolicy};
use crate::{Error, Result};

/// Directories every Windows container layer is expected to provide.
pub const SCRATCH_DIRECTORIES: &[&str] = &[
    "Files",
    "Files/Windows",
    "Files/Windows/System32",
    "Files/Windows/System32/config",
    "Hives",
    "UtilityVM",
    "UtilityVM/Files",
];

/// Produces the bottom layer of the image.
#[async_trait]
pub trait BaseLayerProvider: Send + Sync {
    async fn base_layer(&self) -> Result<Layer>;
}

/// A base layer tar read from disk.  Gzip input is detected and decoded.
#[derive(Debug, Clone)]
pub struct FileBaseLayer {
    path: PathBuf,
}

impl FileBaseLayer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BaseLayerProvider for FileBaseLayer {
    async fn base_layer(&self) -> Result<Layer> {
        let data = tokio::fs::read(&self.path).await.map_err(|e| {
            Error::BaseLayer(format!("read {}: {}", self.path.display(), e))
        })?;
        if data.is_empty() {
            return Err(Error::BaseLayer(format!(
                "{} is empty",
                self.path.display()
            )));
        }
        let layer = Layer::from_bytes(data)?;
        info!(path = %self.path.display(), diff_id = %layer.diff_id, "loaded windows base layer");
        Ok(layer)
    }
}

/// Minimal Windows directory skeleton, built in memory.
#[derive(Debug, Clone, Default)]
pub struct ScratchBaseLayer {
    policy: PermissionPolicy,
}

impl ScratchBaseLayer {
    pub fn new(policy: PermissionPolicy) -> Self {
        Self { policy }
    }

    fn entries(&self) -> Vec<ArchiveEntry> {
        SCRATCH_DIRECTORIES
            .iter()
            .map(|dir| self.policy.apply(ArchiveEntry::directory(*dir), Access::Windows))
            .collect()
    }
}

#[async_trait]
impl BaseLayerProvider for ScratchBaseLayer {
    async fn base_layer(&self) -> Result<Layer> {
        warn!("no windows base layer configured; using a scratch skeleton without registry hives");
        let tar = build_layer(&self.entries())?;
        Ok(Layer::from_tar(tar.into_bytes())?)
    }
}

/// File provider when `path` is set, scratch skeleton otherwise.
pub fn provider_for(path: Option<&Path>) -> Box<dyn BaseLayerProvider> {
    match path {
        Some(path) => Box::new(FileBaseLayer::new(path)),
        None => Box::new(ScratchBaseLayer::default()),
    }
}
