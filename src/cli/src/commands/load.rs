//! `nydus-load load` command.

use std::path::PathBuf;

use clap::Args;
use nydus_load_core::{LoadConfig, WorkspaceRetention};
use nydus_loader::Loader;
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Source image reference; repeat for several sources
    #[arg(long = "source", value_name = "REF", required_unless_present = "config")]
    pub sources: Vec<String>,

    /// Use plain HTTP and skip certificate checks for the sources
    #[arg(long)]
    pub source_insecure: bool,

    /// Path to the nydus-image tool
    #[arg(long, value_name = "PATH")]
    pub nydus_image: Option<PathBuf>,

    /// Directory for per-source workspaces and the lifecycle blob
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Architecture to load from multi-platform sources (amd64, arm64)
    #[arg(long)]
    pub arch: Option<String>,

    /// YAML configuration file; flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Keep or remove workspaces created by a failed run (retain, discard)
    #[arg(long, value_name = "POLICY")]
    pub on_failure: Option<WorkspaceRetention>,

    /// Attempts per registry request, including the first
    #[arg(long, value_name = "N")]
    pub retry_attempts: Option<u32>,

    /// Delay between registry attempts in milliseconds
    #[arg(long, value_name = "MS")]
    pub retry_interval_ms: Option<u64>,
}

/// Merge the optional config file with command-line overrides.
fn build_config(args: &LoadArgs) -> Result<LoadConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => LoadConfig::from_yaml_file(path)?,
        None => LoadConfig::default(),
    };

    if !args.sources.is_empty() {
        config.sources = args.sources.clone();
    }
    if args.source_insecure {
        config.source_insecure = true;
    }
    if let Some(path) = &args.nydus_image {
        config.nydus_image_path = path.clone();
    }
    if let Some(dir) = &args.work_dir {
        config.work_dir = dir.clone();
    }
    if let Some(arch) = &args.arch {
        config.expected_arch = arch.clone();
    }
    if let Some(policy) = args.on_failure {
        config.on_failure = policy;
    }
    if let Some(attempts) = args.retry_attempts {
        config.retry.max_attempts = attempts;
    }
    if let Some(interval) = args.retry_interval_ms {
        config.retry.interval_ms = interval;
    }

    Ok(config)
}

pub async fn execute(args: LoadArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&args)?;
    let loader = Loader::new(config)?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling load");
            trigger.cancel();
        }
    });

    loader.load(&cancel).await?;

    println!(
        "Loaded {} image(s), lifecycle blob: {}",
        loader.config().sources.len(),
        loader.config().lifecycle_blob_path().display()
    );
    Ok(())
}
