//! hybridpack CLI: build the hybrid buildpack image and write it to the
//! local daemon or a registry.

use std::path::PathBuf;

use clap::Parser;
use hybridpack::config::{BuildOptions, WINDOWS_BASE_LAYER_ENV};
use hybridpack_oci::daemon::DEFAULT_DOCKER_HOST;
use hybridpack_oci::ImageRef;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "hybridpack", version, about)]
struct Cli {
    /// Image reference to write, e.g. `localhost:5000/hybrid:latest`
    #[arg(long = "ref", value_name = "IMAGE", value_parser = parse_image_ref)]
    image_ref: ImageRef,

    /// Push to the registry instead of loading into the local daemon
    #[arg(long)]
    publish: bool,

    /// Windows base layer tar (plain or gzip); a scratch skeleton is used when unset
    #[arg(long, value_name = "PATH", env = WINDOWS_BASE_LAYER_ENV)]
    windows_base_layer: Option<PathBuf>,

    /// Docker engine address
    #[arg(long, value_name = "URL", env = "DOCKER_HOST", default_value = DEFAULT_DOCKER_HOST)]
    docker_host: String,
}

fn parse_image_ref(raw: &str) -> Result<ImageRef, String> {
    let image_ref = ImageRef::parse(raw).map_err(|e| e.to_string())?;
    image_ref.require_tag().map_err(|e| e.to_string())?;
    Ok(image_ref)
}

impl From<Cli> for BuildOptions {
    fn from(cli: Cli) -> Self {
        Self {
            image_ref: cli.image_ref,
            publish: cli.publish,
            windows_base_layer: cli.windows_base_layer,
            docker_host: cli.docker_host,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let opts = BuildOptions::from(Cli::parse());

    match hybridpack::run(&opts).await {
        Ok(report) => {
            if let Some(output) = report.daemon_output.as_deref() {
                if !output.is_empty() {
                    eprintln!("{}", output.trim_end());
                }
            }
            info!(
                reference = %report.reference,
                layer = %report.layer_digest,
                image = %report.image_id,
                "build complete",
            );
            println!("image and layer written");
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
