//! ImageParser - Trait for resolving a source reference into a nydus image.

use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use nydus_load_core::error::Result;
use tokio_util::sync::CancellationToken;

use crate::oci::{NydusImage, ParsedImage};

/// Resolves one source reference and pulls the layers of its nydus variant.
#[async_trait]
pub trait ImageParser: Send + Sync {
    /// Reference this parser was created for.
    fn reference(&self) -> &str;

    /// Resolve the reference into its index, manifest and config.
    ///
    /// A source that resolves but is not nydus for the requested platform
    /// yields a `ParsedImage` without `nydus_image`; that is not an error here.
    async fn parse(&self, cancel: &CancellationToken) -> Result<ParsedImage>;

    /// Open the bootstrap layer as a raw (possibly compressed) byte stream.
    async fn pull_bootstrap(
        &self,
        cancel: &CancellationToken,
        image: &NydusImage,
    ) -> Result<Box<dyn Read + Send>>;

    /// Store every blob layer of `image` under `dest_dir`, one file per digest.
    async fn pull_blobs(
        &self,
        cancel: &CancellationToken,
        image: &NydusImage,
        dest_dir: &Path,
    ) -> Result<()>;
}
