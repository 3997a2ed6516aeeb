//! hybridpack: builds a buildpack image whose single layer is readable by
//! both Linux and Windows containers.
//!
//! The layer is one tar stream carrying the union of what each OS needs:
//! POSIX modes for paths Linux resolves, `MSWINDOWS.rawsd` security
//! descriptors for paths Windows resolves.  The pipeline is linear:
//!
//! 1. [`planner`] lays out the buildpack tree and tags each path with the OS
//!    that reads it.
//! 2. [`archive`] writes the tagged entries into a [`archive::HybridLayer`].
//! 3. [`metadata`] digests the layer and renders the discovery labels.
//! 4. [`assembler`] stacks a Windows base layer and the hybrid layer into an
//!    image and hands it to the daemon or a registry.
//!
//! # Example
//!
//! ```no_run
//! use hybridpack::{config::BuildOptions, run};
//! use hybridpack_oci::ImageRef;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let opts = BuildOptions::new(ImageRef::parse("localhost:5000/hybrid:dev")?);
//!     let report = run(&opts).await?;
//!     println!("{} {}", report.reference, report.layer_digest);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod assembler;
pub mod base_layer;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod metadata;
pub mod payload;
pub mod planner;

pub use error::{Error, Result};

use tracing::info;

use crate::archive::{build_layer, HybridLayer};
use crate::config::BuildOptions;
use crate::descriptor::BuildpackDescriptor;
use crate::metadata::{LayerDigest, LayerMetadata};
use crate::payload::Payload;
use crate::planner::{LayoutPlan, PermissionPolicy};

/// Plan and write the hybrid layer for `descriptor`.
pub fn build_hybrid_layer(descriptor: &BuildpackDescriptor, payload: &Payload) -> Result<HybridLayer> {
    let entries = LayoutPlan::plan(descriptor, payload)?.into_entries(&PermissionPolicy::default());
    build_layer(&entries)
}

/// Outcome of a successful [`run`].
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Reference the image was written under.
    pub reference: String,
    /// Digest of the uncompressed hybrid layer.
    pub layer_digest: LayerDigest,
    /// Image ID: digest of the image config, the same for either sink.
    pub image_id: String,
    /// Progress text returned by the daemon; `None` for registry pushes.
    pub daemon_output: Option<String>,
}

/// Build the hybrid layer from the embedded payload, assemble the image and
/// write it to the sink `opts` selects.  Nothing is written unless every
/// earlier stage succeeded.
pub async fn run(opts: &BuildOptions) -> Result<BuildReport> {
    opts.image_ref.require_tag()?;

    let descriptor = BuildpackDescriptor::embedded()?;
    let payload = Payload::embedded();

    let layer = build_hybrid_layer(&descriptor, &payload)?;
    let metadata = LayerMetadata::generate(layer.as_bytes(), &descriptor)?;
    info!(
        entries = layer.entry_count(),
        size = layer.size(),
        digest = %metadata.digest(),
        "hybrid layer built",
    );

    let base = base_layer::provider_for(opts.windows_base_layer.as_deref())
        .base_layer()
        .await?;
    let image = assembler::assemble(base, layer, &metadata)?;
    let image_id = image.id()?;

    let sink = assembler::select_sink(opts.publish, &opts.image_ref, &opts.docker_host)?;
    info!(reference = %opts.image_ref, sink = sink.name(), "writing image");
    let daemon_output = sink.write(&opts.image_ref, &image).await?;

    Ok(BuildReport {
        reference: opts.image_ref.to_string(),
        layer_digest: metadata.digest().clone(),
        image_id,
        daemon_output,
    })
}
