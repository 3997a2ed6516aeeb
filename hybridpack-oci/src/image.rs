use std::collections::BTreeMap;

use crate::config::ImageConfig;
use crate::digest::sha256_digest;
use crate::error::Result;
use crate::layer::Layer;

/// An in-memory image: a config plus an ordered stack of layers.
///
/// Images are built by value: every mutation consumes the image and
/// returns the updated one.  The platform fields stay empty.
#[derive(Debug, Clone, Default)]
pub struct Image {
    config: ImageConfig,
    layers: Vec<Layer>,
}

impl Image {
    /// An image with no layers, no labels and an unset platform.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Merge `labels` into the config labels.
    pub fn with_labels<I>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.config.config.labels.extend(labels);
        self
    }

    /// Append layers on top of the existing stack, in order.
    pub fn append_layers<I>(mut self, layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        for layer in layers {
            self.config.rootfs.diff_ids.push(layer.diff_id.clone());
            self.layers.push(layer);
        }
        self
    }

    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.config.config.labels
    }

    /// Layers bottom-up.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Serialized config blob.
    pub fn config_blob(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.config)?)
    }

    /// Image ID: digest of the config blob.  Identical whether the image is
    /// loaded into a daemon or pushed to a registry.
    pub fn id(&self) -> Result<String> {
        Ok(sha256_digest(&self.config_blob()?))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(content: &[u8]) -> Layer {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_ustar();
        header.set_path("file").unwrap();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, content).unwrap();
        Layer::from_tar(builder.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn empty_image_has_no_layers() {
        let image = Image::empty();
        assert!(image.layers().is_empty());
        assert!(image.config().rootfs.diff_ids.is_empty());
        assert!(image.labels().is_empty());
        assert_eq!(image.config().os, "");
        assert_eq!(image.config().architecture, "");
    }

    #[test]
    fn layers_keep_append_order() {
        let base = layer(b"base");
        let top = layer(b"top");
        let image = Image::empty().append_layers([base.clone(), top.clone()]);

        assert_eq!(
            image.config().rootfs.diff_ids,
            vec![base.diff_id.clone(), top.diff_id.clone()]
        );
        assert_eq!(image.layers()[0].digest, base.digest);
        assert_eq!(image.layers()[1].digest, top.digest);
    }

    #[test]
    fn id_is_digest_of_config_blob() {
        let image = Image::empty()
            .with_labels([("a".to_string(), "b".to_string())])
            .append_layers([layer(b"x")]);

        let config_blob = image.config_blob().unwrap();
        assert_eq!(image.id().unwrap(), sha256_digest(&config_blob));

        let config: ImageConfig = serde_json::from_slice(&config_blob).unwrap();
        assert_eq!(config.config.labels.get("a").map(String::as_str), Some("b"));
    }

    #[test]
    fn labels_change_the_id() {
        let plain = Image::empty().append_layers([layer(b"x")]);
        let labelled = plain
            .clone()
            .with_labels([("k".to_string(), "v".to_string())]);
        assert_ne!(plain.id().unwrap(), labelled.id().unwrap());
        assert_eq!(plain.id().unwrap(), plain.id().unwrap());
    }
}
