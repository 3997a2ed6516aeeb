//! Runtime options for a single build.

use std::path::PathBuf;

use hybridpack_oci::daemon::DEFAULT_DOCKER_HOST;
use hybridpack_oci::ImageRef;

/// Environment variable naming a Windows base layer tar.
pub const WINDOWS_BASE_LAYER_ENV: &str = "HYBRIDPACK_WINDOWS_BASE_LAYER";

/// Everything `run` needs besides the embedded payload.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Tag the image is written under.
    pub image_ref: ImageRef,
    /// Push to the registry instead of loading into the local daemon.
    pub publish: bool,
    /// Windows base layer tar (plain or gzip).  Scratch skeleton when unset.
    pub windows_base_layer: Option<PathBuf>,
    /// `DOCKER_HOST` style address of the engine API.
    pub docker_host: String,
}

impl BuildOptions {
    pub fn new(image_ref: ImageRef) -> Self {
        Self {
            image_ref,
            publish: false,
            windows_base_layer: None,
            docker_host: DEFAULT_DOCKER_HOST.to_string(),
        }
    }

    pub fn publish(mut self, publish: bool) -> Self {
        self.publish = publish;
        self
    }

    pub fn windows_base_layer(mut self, path: impl Into<PathBuf>) -> Self {
        self.windows_base_layer = Some(path.into());
        self
    }

    pub fn docker_host(mut self, host: impl Into<String>) -> Self {
        self.docker_host = host.into();
        self
    }
}
