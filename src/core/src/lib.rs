//! Nydus Load Core - Foundational Types
//!
//! Configuration, error taxonomy and trace records shared by the loader
//! library and the command-line front end.

pub mod build_info;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use build_info::{BuildInfo, SourceReference};
pub use config::{LoadConfig, PlatformConfig, RetryConfig, WorkspaceRetention};
pub use error::{LoadError, Result, ResultExt};

/// Nydus load version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
