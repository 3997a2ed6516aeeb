//! Image plumbing for hybridpack: in-memory image assembly, OCI
//! Distribution push and Docker engine load.
//!
//! Nothing here knows about buildpacks; callers hand over finished tar
//! layers and a label map.

pub mod auth;
pub mod config;
pub mod daemon;
pub mod digest;
pub mod error;
pub mod image;
pub mod layer;
pub mod registry;

pub use auth::Credentials;
pub use daemon::{DaemonClient, DaemonEndpoint};
pub use error::{OciError, Result};
pub use image::Image;
pub use layer::Layer;
pub use registry::{ImageRef, RegistryClient};
