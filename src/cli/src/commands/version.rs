//! `nydus-load version` command.

use clap::Args;

#[derive(Args)]
pub struct VersionArgs;

pub async fn execute(_args: VersionArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("nydus-load version {}", nydus_load_core::VERSION);
    Ok(())
}
