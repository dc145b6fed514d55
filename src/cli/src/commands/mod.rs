//! CLI command definitions and dispatch.

mod load;
mod version;

use clap::{Parser, Subcommand, ValueEnum};

/// Nydus load: pull nydus images and build their lifecycle blob.
#[derive(Parser)]
#[command(name = "nydus-load", version, about)]
pub struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Pull nydus source images and merge their bootstraps
    Load(load::LoadArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Load(args) => load::execute(args).await,
        Command::Version(args) => version::execute(args).await,
    }
}
