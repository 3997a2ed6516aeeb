use std::fmt;
use std::net::IpAddr;

use oci_distribution::client::{ClientConfig, ClientProtocol, Config, ImageLayer};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference};
use tracing::{debug, info};

use crate::auth::Credentials;
use crate::config::MEDIA_TYPE_OCI_CONFIG;
use crate::error::{OciError, Result};
use crate::image::Image;

const DOCKER_HUB: &str = "registry-1.docker.io";

// ---------------------------------------------------------------------------
// ImageRef
// ---------------------------------------------------------------------------

/// A parsed OCI image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Registry hostname (e.g. "registry-1.docker.io").
    pub registry: String,
    /// Repository path (e.g. "library/alpine").
    pub repository: String,
    /// Tag or digest reference (e.g. "latest" or "sha256:abc123").
    pub reference: String,
}

impl ImageRef {
    /// Parse a raw image reference string.
    ///
    /// Supported formats:
    /// - `alpine:latest`
    /// - `ubuntu`
    /// - `ghcr.io/foo/bar:v1`
    /// - `localhost:5000/repo:tag`
    /// - `my.registry.io/org/repo@sha256:abc123…`
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(OciError::Reference("empty image reference".to_string()));
        }

        // Split off the reference (tag or digest).
        let (name_part, reference) = if let Some(at_pos) = raw.find('@') {
            (&raw[..at_pos], raw[at_pos + 1..].to_string())
        } else if let Some(colon_pos) = raw.rfind(':') {
            // A tag colon always comes after the last '/'; otherwise the
            // colon belongs to a registry port ("localhost:5000/repo").
            let after_last_slash = raw.rfind('/').map(|p| p + 1).unwrap_or(0);
            if colon_pos > after_last_slash {
                (&raw[..colon_pos], raw[colon_pos + 1..].to_string())
            } else {
                (raw, "latest".to_string())
            }
        } else {
            (raw, "latest".to_string())
        };

        // A first component is a registry hostname when it contains a dot or
        // a colon (port), or is literally "localhost".
        let (registry, repository) = if let Some(slash_pos) = name_part.find('/') {
            let first = &name_part[..slash_pos];
            if first.contains('.') || first.contains(':') || first == "localhost" {
                (first.to_string(), name_part[slash_pos + 1..].to_string())
            } else {
                (DOCKER_HUB.to_string(), name_part.to_string())
            }
        } else {
            (DOCKER_HUB.to_string(), format!("library/{}", name_part))
        };

        let registry = if registry == "docker.io" || registry == "index.docker.io" {
            DOCKER_HUB.to_string()
        } else {
            registry
        };

        let repository = if registry == DOCKER_HUB && !repository.contains('/') {
            format!("library/{}", repository)
        } else {
            repository
        };

        validate_repository(raw, &repository)?;
        validate_reference(raw, &reference)?;

        Ok(Self {
            registry,
            repository,
            reference,
        })
    }

    /// True when the reference pins a digest rather than naming a tag.
    pub fn is_digest(&self) -> bool {
        self.reference.contains(':')
    }

    /// Writing an image needs a tag to point at it.
    pub fn require_tag(&self) -> Result<&str> {
        if self.is_digest() {
            return Err(OciError::Reference(format!(
                "{} is a digest reference; a tag is required to write an image",
                self
            )));
        }
        Ok(&self.reference)
    }

    /// Loopback registries are spoken to over plain HTTP.
    pub fn is_loopback(&self) -> bool {
        let host = match self.registry.strip_prefix('[') {
            Some(bracketed) => bracketed.split(']').next().unwrap_or(bracketed),
            None => self.registry.split(':').next().unwrap_or(&self.registry),
        };
        host == "localhost" || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
    }
}

impl fmt::Display for ImageRef {
    /// Renders the familiar short form: Docker Hub names drop the registry
    /// and `library/` prefix.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.registry == DOCKER_HUB {
            let repo = self
                .repository
                .strip_prefix("library/")
                .unwrap_or(&self.repository);
            write!(f, "{}", repo)?;
        } else {
            write!(f, "{}/{}", self.registry, self.repository)?;
        }
        if self.is_digest() {
            write!(f, "@{}", self.reference)
        } else {
            write!(f, ":{}", self.reference)
        }
    }
}

fn validate_repository(raw: &str, repository: &str) -> Result<()> {
    let valid = !repository.is_empty()
        && repository.split('/').all(|component| {
            !component.is_empty()
                && component
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
                && component.chars().all(|c| {
                    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')
                })
        });
    if valid {
        Ok(())
    } else {
        Err(OciError::Reference(format!(
            "{}: repository must be lowercase alphanumerics separated by '.', '_', '-' or '/'",
            raw
        )))
    }
}

fn validate_reference(raw: &str, reference: &str) -> Result<()> {
    if let Some(hex) = reference.strip_prefix("sha256:") {
        if hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(());
        }
        return Err(OciError::Reference(format!("{}: malformed digest", raw)));
    }

    let valid = !reference.is_empty()
        && reference.len() <= 128
        && reference
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(OciError::Reference(format!("{}: malformed tag", raw)))
    }
}

// ---------------------------------------------------------------------------
// RegistryClient
// ---------------------------------------------------------------------------

/// Pushes assembled images through an OCI Distribution client.
pub struct RegistryClient {
    auth: RegistryAuth,
}

impl RegistryClient {
    pub fn new(credentials: &Credentials) -> Self {
        Self {
            auth: credentials.registry_auth(),
        }
    }

    /// Upload every layer blob and the config blob, then tag the manifest.
    /// Returns the manifest URL reported by the registry.
    pub async fn push(&self, image_ref: &ImageRef, image: &Image) -> Result<String> {
        let tag = image_ref.require_tag()?;
        let reference = Reference::with_tag(
            image_ref.registry.clone(),
            image_ref.repository.clone(),
            tag.to_string(),
        );

        let protocol = if image_ref.is_loopback() {
            ClientProtocol::Http
        } else {
            ClientProtocol::Https
        };
        let client = Client::new(ClientConfig {
            protocol,
            ..Default::default()
        });

        let layers: Vec<ImageLayer> = image
            .layers()
            .iter()
            .map(|layer| ImageLayer::new(layer.blob().to_vec(), layer.media_type.clone(), None))
            .collect();
        let config = Config::new(image.config_blob()?, MEDIA_TYPE_OCI_CONFIG.to_string(), None);

        info!(
            registry = %image_ref.registry,
            repository = %image_ref.repository,
            reference = %tag,
            layers = layers.len(),
            "pushing image",
        );
        let response = client
            .push(&reference, &layers, config, &self.auth, None)
            .await?;
        debug!(config_url = %response.config_url, "config blob uploaded");
        info!(manifest_url = %response.manifest_url, "image pushed");
        Ok(response.manifest_url)
    }
}
