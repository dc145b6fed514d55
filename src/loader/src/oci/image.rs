//! Parsed nydus image representation.

use nydus_load_core::PlatformConfig;
use oci_distribution::config::ConfigFile;
use oci_distribution::manifest::{ImageIndexEntry, OciDescriptor, OciImageIndex, OciImageManifest};

use super::platform::match_nydus_platform;

/// Archive member holding the bootstrap inside a nydus bootstrap layer.
pub const BOOTSTRAP_FILE_NAME_IN_LAYER: &str = "image/image.boot";

/// Layer annotation marking the bootstrap layer of a nydus manifest.
pub const LAYER_ANNOTATION_NYDUS_BOOTSTRAP: &str = "containerd.io/snapshot/nydus-bootstrap";

/// Media type of nydus chunk-data layers.
pub const MEDIA_TYPE_NYDUS_BLOB: &str = "application/vnd.oci.image.layer.nydus.blob.v1";

/// Manifest and configuration of the nydus variant of an image.
#[derive(Debug, Clone)]
pub struct NydusImage {
    /// Image manifest
    pub manifest: OciImageManifest,

    /// Image configuration
    pub config: ConfigFile,
}

impl NydusImage {
    pub fn new(manifest: OciImageManifest, config: ConfigFile) -> Self {
        Self { manifest, config }
    }

    /// The layer carrying the bootstrap (last layer, annotated).
    pub fn bootstrap_layer(&self) -> Option<&OciDescriptor> {
        self.manifest
            .layers
            .last()
            .filter(|layer| is_bootstrap_layer(layer))
    }

    /// Chunk-data layers, in manifest order.
    pub fn blob_layers(&self) -> impl Iterator<Item = &OciDescriptor> {
        self.manifest
            .layers
            .iter()
            .filter(|layer| layer.media_type == MEDIA_TYPE_NYDUS_BLOB)
    }
}

/// Result of resolving one source reference.
#[derive(Debug, Clone)]
pub struct ParsedImage {
    /// Reference the image was resolved from
    pub reference: String,

    /// Manifest list, when the reference resolved to one
    pub index: Option<OciImageIndex>,

    /// Nydus variant; absent when the source is not a nydus image
    pub nydus_image: Option<NydusImage>,
}

/// Whether a layer is annotated as the nydus bootstrap.
pub fn is_bootstrap_layer(layer: &OciDescriptor) -> bool {
    layer
        .annotations
        .as_ref()
        .and_then(|a| a.get(LAYER_ANNOTATION_NYDUS_BOOTSTRAP))
        .map_or(false, |v| v == "true")
}

/// Whether a single-platform manifest is a nydus manifest.
pub fn is_nydus_manifest(manifest: &OciImageManifest) -> bool {
    manifest.layers.last().map_or(false, is_bootstrap_layer)
}

/// Pick the nydus entry for `arch` out of a manifest list.
pub fn select_nydus_manifest<'a>(
    config: &PlatformConfig,
    index: &'a OciImageIndex,
    arch: &str,
) -> Option<&'a ImageIndexEntry> {
    index
        .manifests
        .iter()
        .find(|entry| match_nydus_platform(config, entry, &config.os, arch))
}
