//! Error types for hybridpack

use thiserror::Error;

/// Result type alias using hybridpack Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or publishing the hybrid image
#[derive(Error, Debug)]
pub enum Error {
    /// Buildpack descriptor is missing required fields
    #[error("Descriptor error: {0}")]
    Descriptor(String),

    /// Buildpack descriptor is not valid TOML
    #[error("Descriptor parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The planned layout cannot be expressed as a hybrid layer
    #[error("Layout error: {0}")]
    Layout(String),

    /// Writing an archive entry failed
    #[error("Archive error: {0}")]
    Archive(String),

    /// Windows base layer could not be obtained
    #[error("Base layer error: {0}")]
    BaseLayer(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Image assembly and publish errors
    #[error("Image error: {0}")]
    Oci(#[from] hybridpack_oci::OciError),
}
