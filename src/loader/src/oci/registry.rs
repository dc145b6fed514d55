//! Registry-backed image parser.
//!
//! Resolves source references with the `oci-distribution` client, picks the
//! nydus variant for the requested platform and pulls its layers. Registry
//! access is anonymous. Manifest fetches and blob pulls go through
//! [`with_retry`].

use std::io::{Cursor, Read};
use std::path::Path;

use async_trait::async_trait;
use nydus_load_core::error::{LoadError, Result};
use nydus_load_core::PlatformConfig;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::config::ConfigFile;
use oci_distribution::manifest::{
    OciDescriptor, OciImageManifest, OciManifest, IMAGE_MANIFEST_LIST_MEDIA_TYPE,
    IMAGE_MANIFEST_MEDIA_TYPE, OCI_IMAGE_INDEX_MEDIA_TYPE, OCI_IMAGE_MEDIA_TYPE,
};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::image::{is_nydus_manifest, select_nydus_manifest, NydusImage, ParsedImage};
use crate::parser::ImageParser;
use crate::retry::{with_retry, RetryPolicy};

/// Manifest media types requested from the registry.
const ACCEPTED_MANIFEST_TYPES: &[&str] = &[
    OCI_IMAGE_INDEX_MEDIA_TYPE,
    OCI_IMAGE_MEDIA_TYPE,
    IMAGE_MANIFEST_LIST_MEDIA_TYPE,
    IMAGE_MANIFEST_MEDIA_TYPE,
];

/// Parses one source image from a remote registry.
pub struct RegistryParser {
    source: String,
    reference: Reference,
    client: Client,
    auth: RegistryAuth,
    arch: String,
    platform: PlatformConfig,
    retry: RetryPolicy,
}

impl RegistryParser {
    /// Create a parser for `source`.
    ///
    /// With `insecure` the registry is reached over plain HTTP and invalid
    /// certificates are accepted.
    pub fn new(
        source: &str,
        insecure: bool,
        arch: &str,
        platform: PlatformConfig,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let reference = source.parse::<Reference>().map_err(|e| {
            LoadError::ConfigError(format!("Invalid source reference '{}': {}", source, e))
        })?;

        let config = ClientConfig {
            protocol: if insecure {
                ClientProtocol::Http
            } else {
                ClientProtocol::Https
            },
            accept_invalid_certificates: insecure,
            ..Default::default()
        };

        Ok(Self {
            source: source.to_string(),
            reference,
            client: Client::new(config),
            auth: RegistryAuth::Anonymous,
            arch: arch.to_string(),
            platform,
            retry,
        })
    }

    fn network_error(&self, message: String) -> LoadError {
        LoadError::NetworkError {
            reference: self.source.clone(),
            message,
        }
    }

    fn parse_error(&self, message: String) -> LoadError {
        LoadError::ParseError {
            reference: self.source.clone(),
            message,
        }
    }

    async fn fetch_manifest(
        &self,
        cancel: &CancellationToken,
        reference: &Reference,
    ) -> Result<Vec<u8>> {
        tracing::debug!(reference = %reference, "Fetching manifest");

        with_retry(&self.retry, cancel, move || async move {
            self.client
                .pull_manifest_raw(reference, &self.auth, ACCEPTED_MANIFEST_TYPES)
                .await
                .map(|(raw, _digest)| raw.to_vec())
                .map_err(|e| self.network_error(format!("Failed to pull manifest: {}", e)))
        })
        .await
    }

    async fn fetch_blob(
        &self,
        cancel: &CancellationToken,
        layer: &OciDescriptor,
    ) -> Result<Vec<u8>> {
        with_retry(&self.retry, cancel, move || async move {
            let mut data: Vec<u8> = Vec::new();
            self.client
                .pull_blob(&self.reference, layer, &mut data)
                .await
                .map_err(|e| {
                    self.network_error(format!("Failed to pull blob {}: {}", layer.digest, e))
                })?;
            Ok(data)
        })
        .await
    }

    async fn fetch_config(
        &self,
        cancel: &CancellationToken,
        manifest: &OciImageManifest,
    ) -> Result<ConfigFile> {
        let raw = self.fetch_blob(cancel, &manifest.config).await?;
        serde_json::from_slice(&raw)
            .map_err(|e| self.parse_error(format!("Invalid image config: {}", e)))
    }

    async fn nydus_image(
        &self,
        cancel: &CancellationToken,
        manifest: OciImageManifest,
    ) -> Result<NydusImage> {
        let config = self.fetch_config(cancel, &manifest).await?;
        Ok(NydusImage::new(manifest, config))
    }
}

#[async_trait]
impl ImageParser for RegistryParser {
    fn reference(&self) -> &str {
        &self.source
    }

    async fn parse(&self, cancel: &CancellationToken) -> Result<ParsedImage> {
        tracing::info!(reference = %self.source, arch = %self.arch, "Parsing source image");

        let raw = self.fetch_manifest(cancel, &self.reference).await?;
        let manifest = decode_manifest(&raw).map_err(|e| self.parse_error(e))?;

        let mut parsed = ParsedImage {
            reference: self.source.clone(),
            index: None,
            nydus_image: None,
        };

        match manifest {
            OciManifest::ImageIndex(index) => {
                let child = select_nydus_manifest(&self.platform, &index, &self.arch).map(|entry| {
                    Reference::with_digest(
                        self.reference.registry().to_string(),
                        self.reference.repository().to_string(),
                        entry.digest.clone(),
                    )
                });

                if let Some(child) = child {
                    let raw = self.fetch_manifest(cancel, &child).await?;
                    let manifest: OciImageManifest = serde_json::from_slice(&raw)
                        .map_err(|e| self.parse_error(format!("Invalid nydus manifest: {}", e)))?;
                    parsed.nydus_image = Some(self.nydus_image(cancel, manifest).await?);
                } else {
                    tracing::debug!(
                        reference = %self.source,
                        arch = %self.arch,
                        "No nydus entry in image index"
                    );
                }
                parsed.index = Some(index);
            }
            OciManifest::Image(manifest) => {
                if is_nydus_manifest(&manifest) {
                    parsed.nydus_image = Some(self.nydus_image(cancel, manifest).await?);
                } else {
                    tracing::debug!(
                        reference = %self.source,
                        "Manifest has no nydus bootstrap layer"
                    );
                }
            }
        }

        Ok(parsed)
    }

    async fn pull_bootstrap(
        &self,
        cancel: &CancellationToken,
        image: &NydusImage,
    ) -> Result<Box<dyn Read + Send>> {
        let layer = image.bootstrap_layer().ok_or_else(|| {
            LoadError::FormatError(format!(
                "the {} has no nydus bootstrap layer",
                self.source
            ))
        })?;

        tracing::debug!(
            reference = %self.source,
            digest = %layer.digest,
            "Pulling bootstrap layer"
        );
        let data = self.fetch_blob(cancel, layer).await?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn pull_blobs(
        &self,
        cancel: &CancellationToken,
        image: &NydusImage,
        dest_dir: &Path,
    ) -> Result<()> {
        for layer in image.blob_layers() {
            let path = dest_dir.join(blob_file_name(&layer.digest));
            let path = path.as_path();

            tracing::debug!(
                reference = %self.source,
                digest = %layer.digest,
                size = layer.size,
                "Pulling blob layer"
            );

            with_retry(&self.retry, cancel, move || async move {
                let mut file = tokio::fs::File::create(path).await?;
                self.client
                    .pull_blob(&self.reference, layer, &mut file)
                    .await
                    .map_err(|e| {
                        self.network_error(format!("Failed to pull blob {}: {}", layer.digest, e))
                    })?;
                file.flush().await?;
                Ok(())
            })
            .await?;
        }

        Ok(())
    }
}

/// Decode a raw manifest as an image index or a single-platform manifest.
fn decode_manifest(raw: &[u8]) -> std::result::Result<OciManifest, String> {
    let value: serde_json::Value =
        serde_json::from_slice(raw).map_err(|e| format!("Invalid manifest: {}", e))?;

    if value.get("manifests").is_some() {
        serde_json::from_value(value)
            .map(OciManifest::ImageIndex)
            .map_err(|e| format!("Invalid image index: {}", e))
    } else {
        serde_json::from_value(value)
            .map(OciManifest::Image)
            .map_err(|e| format!("Invalid manifest: {}", e))
    }
}

/// File name of a blob inside `blobs/`: the digest without its algorithm.
fn blob_file_name(digest: &str) -> &str {
    digest.split_once(':').map_or(digest, |(_, hex)| hex)
}
