/// Errors produced by the OCI image, registry and daemon clients.
#[derive(Debug, thiserror::Error)]
pub enum OciError {
    #[error("invalid image reference: {0}")]
    Reference(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("registry authentication failed: {0}")]
    Auth(String),

    #[error("daemon error: {0}")]
    Daemon(String),

    #[error("layer error: {0}")]
    Layer(String),

    #[error("registry push failed: {0}")]
    Distribution(#[from] oci_distribution::errors::OciDistributionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, OciError>;
