//! Nydus Loader
//!
//! Pulls nydus images from registries into per-source workspaces and merges
//! their bootstraps into a lifecycle blob with the `nydus-image` tool.
//!
//! ```text
//! LoadConfig ──► Loader ──► ImageParser (per source) ──► output ──► workspace
//!                   │                                                  │
//!                   └──────────── BootstrapMerger ◄── bootstrap paths ─┘
//! ```

pub mod load;
pub mod merge;
pub mod oci;
pub mod output;
pub mod parser;
pub mod retry;
pub mod workspace;

pub use load::Loader;
pub use merge::{BootstrapMerger, NydusImageMerger};
pub use oci::{NydusImage, ParsedImage, RegistryParser};
pub use output::{output, pretty_dump};
pub use parser::ImageParser;
pub use retry::{with_retry, Backoff, FixedBackoff, RetryPolicy};
pub use workspace::WorkspaceLayout;
