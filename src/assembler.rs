//! Image Assembler: stacks the base and hybrid layers into an image and
//! hands it to a sink.

use async_trait::async_trait;
use hybridpack_oci::{Credentials, DaemonClient, Image, ImageRef, Layer, RegistryClient};
use tracing::{debug, info};

use crate::archive::HybridLayer;
use crate::metadata::LayerMetadata;
use crate::Result;

/// Empty image, then `base`, then the hybrid layer, then the labels.
///
/// The hybrid layer's diff ID is the digest `metadata` was generated from;
/// the layer is not hashed again.  No platform is recorded.
pub fn assemble(base: Layer, hybrid: HybridLayer, metadata: &LayerMetadata) -> Result<Image> {
    let hybrid =
        Layer::from_tar_with_diff_id(hybrid.into_bytes(), metadata.digest().to_string())?;

    debug!(base = %base.diff_id, hybrid = %hybrid.diff_id, "assembling image");
    Ok(Image::empty()
        .append_layers([base, hybrid])
        .with_labels(metadata.labels()))
}

/// Destination of a finished image.
#[async_trait]
pub trait ImageSink: Send + Sync {
    /// Write `image` under `image_ref`.  Returns sink output worth showing
    /// to the user, if any.
    async fn write(&self, image_ref: &ImageRef, image: &Image) -> Result<Option<String>>;

    fn name(&self) -> &'static str;
}

/// Loads images into a local Docker engine.
pub struct DaemonSink {
    client: DaemonClient,
}

impl DaemonSink {
    pub fn new(docker_host: &str) -> Result<Self> {
        Ok(Self {
            client: DaemonClient::from_host(docker_host)?,
        })
    }
}

#[async_trait]
impl ImageSink for DaemonSink {
    async fn write(&self, image_ref: &ImageRef, image: &Image) -> Result<Option<String>> {
        let output = self.client.load(image_ref, image).await?;
        info!(reference = %image_ref, "image loaded into daemon");
        Ok(Some(output))
    }

    fn name(&self) -> &'static str {
        "daemon"
    }
}

/// Pushes images to an OCI Distribution registry.
pub struct RegistrySink {
    client: RegistryClient,
}

impl RegistrySink {
    pub fn new(credentials: &Credentials) -> Self {
        Self {
            client: RegistryClient::new(credentials),
        }
    }
}

#[async_trait]
impl ImageSink for RegistrySink {
    async fn write(&self, image_ref: &ImageRef, image: &Image) -> Result<Option<String>> {
        let manifest_url = self.client.push(image_ref, image).await?;
        info!(reference = %image_ref, %manifest_url, "image pushed to registry");
        Ok(None)
    }

    fn name(&self) -> &'static str {
        "registry"
    }
}

/// Registry push when `publish`, daemon load otherwise.
pub fn select_sink(
    publish: bool,
    image_ref: &ImageRef,
    docker_host: &str,
) -> Result<Box<dyn ImageSink>> {
    if publish {
        let credentials = Credentials::resolve(&image_ref.registry)?;
        Ok(Box::new(RegistrySink::new(&credentials)))
    } else {
        Ok(Box::new(DaemonSink::new(docker_host)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{build_layer, ArchiveEntry};
    use crate::descriptor::BuildpackDescriptor;
    use crate::metadata::{LAYERS_LABEL, METADATA_LABEL};

    fn fixture() -> (Layer, HybridLayer, LayerMetadata) {
        let base = build_layer(&[ArchiveEntry::directory("Files").with_posix_mode(0o755)])
            .unwrap();
        let hybrid = build_layer(&[ArchiveEntry::directory("cnb").with_posix_mode(0o777)])
            .unwrap();
        let descriptor = BuildpackDescriptor::embedded().unwrap();
        let metadata = LayerMetadata::generate(hybrid.as_bytes(), &descriptor).unwrap();
        (Layer::from_tar(base.into_bytes()).unwrap(), hybrid, metadata)
    }

    #[test]
    fn base_layer_comes_first() {
        let (base, hybrid, metadata) = fixture();
        let base_diff = base.diff_id.clone();
        let image = assemble(base, hybrid, &metadata).unwrap();

        let diff_ids = &image.config().rootfs.diff_ids;
        assert_eq!(diff_ids.len(), 2);
        assert_eq!(diff_ids[0], base_diff);
        assert_eq!(diff_ids[1], metadata.digest().as_str());
        assert_eq!(image.config().os, "");
        assert_eq!(image.config().architecture, "");
    }

    #[test]
    fn labels_are_attached() {
        let (base, hybrid, metadata) = fixture();
        let image = assemble(base, hybrid, &metadata).unwrap();
        assert_eq!(image.labels()[LAYERS_LABEL], metadata.layers_json());
        assert_eq!(image.labels()[METADATA_LABEL], metadata.metadata_json());
    }

    #[test]
    fn hybrid_diff_id_is_the_metadata_digest() {
        let (base, hybrid, metadata) = fixture();
        let tar = hybrid.as_bytes().to_vec();
        let image = assemble(base, hybrid, &metadata).unwrap();

        let layer = &image.layers()[1];
        assert_eq!(layer.diff_id, metadata.digest().as_str());
        assert_eq!(layer.diff_id, hybridpack_oci::digest::sha256_digest(&tar));
        assert_eq!(layer.tar(), &tar[..]);
    }

    #[test]
    fn sink_selection() {
        let image_ref = ImageRef::parse("localhost:5000/hybrid:latest").unwrap();
        let daemon = select_sink(false, &image_ref, "unix:///tmp/docker.sock").unwrap();
        assert_eq!(daemon.name(), "daemon");
        assert!(select_sink(false, &image_ref, "ftp://nowhere").is_err());

        let registry = RegistrySink::new(&Credentials::Anonymous);
        assert_eq!(registry.name(), "registry");
    }
}
