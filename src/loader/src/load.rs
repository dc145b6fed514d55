//! Load pipeline.
//!
//! Sources are handled one after another: parse, create the workspace,
//! output. The first failing source ends the run and later sources are never
//! touched. Only when every source succeeded are the collected bootstraps
//! handed to the merger, exactly once.

use std::path::PathBuf;

use nydus_load_core::error::{LoadError, Result, ResultExt};
use nydus_load_core::{BuildInfo, LoadConfig, SourceReference, WorkspaceRetention, VERSION};
use oci_distribution::manifest::OCI_IMAGE_MEDIA_TYPE;
use tokio_util::sync::CancellationToken;

use crate::merge::{BootstrapMerger, NydusImageMerger};
use crate::oci::{marshal_to_desc, ParsedImage, RegistryParser};
use crate::output::output;
use crate::parser::ImageParser;
use crate::retry::RetryPolicy;
use crate::workspace::WorkspaceLayout;

/// Loads nydus sources and merges their bootstraps.
pub struct Loader {
    config: LoadConfig,
    parsers: Vec<Box<dyn ImageParser>>,
    merger: Box<dyn BootstrapMerger>,
}

impl Loader {
    /// Create a loader backed by registry parsers and the `nydus-image` tool.
    pub fn new(config: LoadConfig) -> Result<Self> {
        config.validate()?;

        let retry = RetryPolicy::from_config(&config.retry);
        let mut parsers: Vec<Box<dyn ImageParser>> = Vec::with_capacity(config.sources.len());
        for source in &config.sources {
            let parser = RegistryParser::new(
                source,
                config.source_insecure,
                &config.expected_arch,
                config.platform.clone(),
                retry.clone(),
            )
            .context("Init source image parser")?;
            parsers.push(Box::new(parser));
        }

        let merger = NydusImageMerger::new(config.nydus_image_path.clone());
        Ok(Self {
            config,
            parsers,
            merger: Box::new(merger),
        })
    }

    /// Create a loader from explicit collaborators, one parser per source.
    pub fn with_parts(
        config: LoadConfig,
        parsers: Vec<Box<dyn ImageParser>>,
        merger: Box<dyn BootstrapMerger>,
    ) -> Result<Self> {
        if parsers.len() != config.sources.len() {
            return Err(LoadError::ConfigError(format!(
                "{} parsers given for {} sources",
                parsers.len(),
                config.sources.len()
            )));
        }
        Ok(Self {
            config,
            parsers,
            merger,
        })
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    /// Pull every source, then merge their bootstraps into the lifecycle blob.
    pub async fn load(&self, cancel: &CancellationToken) -> Result<()> {
        let mut created = Vec::new();
        let result = self.load_into(cancel, &mut created).await;
        self.finish(result, &created)
    }

    /// Pull every source and return their bootstrap paths in source order.
    pub async fn pull(&self, cancel: &CancellationToken) -> Result<Vec<PathBuf>> {
        let mut created = Vec::new();
        let result = self.pull_into(cancel, &mut created).await;
        self.finish(result, &created)
    }

    async fn load_into(
        &self,
        cancel: &CancellationToken,
        created: &mut Vec<PathBuf>,
    ) -> Result<()> {
        let bootstraps = self.pull_into(cancel, created).await?;

        let lifecycle_blob = self.config.lifecycle_blob_path();
        self.merger
            .merge(&bootstraps, &lifecycle_blob)
            .await
            .map_err(|e| LoadError::FormatError(format!("invalid nydus bootstrap format: {}", e)))?;

        tracing::info!(
            sources = bootstraps.len(),
            lifecycle_blob = %lifecycle_blob.display(),
            "Nydus images loaded"
        );
        Ok(())
    }

    async fn pull_into(
        &self,
        cancel: &CancellationToken,
        created: &mut Vec<PathBuf>,
    ) -> Result<Vec<PathBuf>> {
        let mut bootstraps = Vec::with_capacity(self.parsers.len());
        let builder_version = self.merger.version().await;

        for (index, (source, parser)) in self.config.sources.iter().zip(&self.parsers).enumerate() {
            if cancel.is_cancelled() {
                return Err(LoadError::Cancelled(format!(
                    "load cancelled before source {}",
                    source
                )));
            }

            tracing::info!(index = index, source = %source, "Loading source image");

            let parsed = parser.parse(cancel).await.context("parse Nydus image")?;

            let layout = WorkspaceLayout::for_source(&self.config.work_dir, source);
            if layout.create().context("create work directory")? {
                created.push(layout.root().to_path_buf());
            }

            output(parser.as_ref(), cancel, &parsed, &layout)
                .await
                .context("output image information")?;

            if let Some(info) = source_trace(&parsed, builder_version.as_deref())? {
                tracing::info!(annotations = ?info.dump(), "Recorded source trace");
            }
            bootstraps.push(layout.bootstrap_path());
        }

        Ok(bootstraps)
    }

    fn finish<T>(&self, result: Result<T>, created: &[PathBuf]) -> Result<T> {
        if result.is_err() && self.config.on_failure == WorkspaceRetention::Discard {
            for dir in created {
                match std::fs::remove_dir_all(dir) {
                    Ok(()) => tracing::debug!(workspace = %dir.display(), "Discarded workspace"),
                    Err(e) => tracing::warn!(
                        workspace = %dir.display(),
                        error = %e,
                        "Failed to discard workspace"
                    ),
                }
            }
        }
        result
    }
}

/// Trace record of a loaded nydus source; `None` for non-nydus sources.
fn source_trace(
    parsed: &ParsedImage,
    builder_version: Option<&str>,
) -> Result<Option<BuildInfo>> {
    let Some(image) = &parsed.nydus_image else {
        return Ok(None);
    };

    let (desc, _) = marshal_to_desc(&image.manifest, OCI_IMAGE_MEDIA_TYPE)?;
    let mut info = BuildInfo::new();
    info.set_tool_version(VERSION);
    if let Some(version) = builder_version {
        info.set_builder_version(version);
    }
    info.set_source_reference(SourceReference {
        reference: parsed.reference.clone(),
        digest: desc.digest,
    });
    Ok(Some(info))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_empty_sources() {
        let err = Loader::new(LoadConfig::default()).err().unwrap();
        assert!(matches!(err, LoadError::ConfigError(_)));
    }

    #[test]
    fn test_new_wraps_invalid_reference() {
        let config = LoadConfig {
            sources: vec!["Not A Reference".to_string()],
            expected_arch: "amd64".to_string(),
            ..Default::default()
        };
        let err = Loader::new(config).err().unwrap();
        assert!(err.to_string().starts_with("Init source image parser"));
        assert!(matches!(err.root(), LoadError::ConfigError(_)));
    }

    #[test]
    fn test_new_one_parser_per_source() {
        let config = LoadConfig {
            sources: vec![
                "ghcr.io/org/a:v1".to_string(),
                "ghcr.io/org/b:v1".to_string(),
            ],
            expected_arch: "arm64".to_string(),
            ..Default::default()
        };
        let loader = Loader::new(config).unwrap();
        let refs: Vec<&str> = loader.parsers.iter().map(|p| p.reference()).collect();
        assert_eq!(refs, vec!["ghcr.io/org/a:v1", "ghcr.io/org/b:v1"]);
    }

    fn parsed_nydus_image() -> ParsedImage {
        let manifest = serde_json::from_value(serde_json::json!({
            "schemaVersion": 2,
            "config": {
                "mediaType": "application/vnd.oci.image.config.v1+json",
                "digest": "sha256:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                "size": 100
            },
            "layers": []
        }))
        .unwrap();
        let config = serde_json::from_value(serde_json::json!({
            "architecture": "amd64",
            "os": "linux",
            "rootfs": {"type": "layers", "diff_ids": []}
        }))
        .unwrap();
        ParsedImage {
            reference: "ghcr.io/org/a:v1".to_string(),
            index: None,
            nydus_image: Some(crate::oci::NydusImage::new(manifest, config)),
        }
    }

    #[test]
    fn test_source_trace_records_builder_version() {
        let parsed = parsed_nydus_image();
        let info = source_trace(&parsed, Some("v2.2.4")).unwrap().unwrap();
        let data = info.dump();

        let (desc, _) = marshal_to_desc(
            &parsed.nydus_image.as_ref().unwrap().manifest,
            OCI_IMAGE_MEDIA_TYPE,
        )
        .unwrap();
        assert_eq!(data["nydus.trace.builder-version"], "v2.2.4");
        assert_eq!(data["nydus.trace.nydusify-version"], VERSION);
        assert_eq!(data["nydus.trace.source-reference"], "ghcr.io/org/a:v1");
        assert_eq!(data["nydus.trace.source-digest"], desc.digest);
    }

    #[test]
    fn test_source_trace_without_builder_version() {
        let info = source_trace(&parsed_nydus_image(), None).unwrap().unwrap();
        assert!(!info.dump().contains_key("nydus.trace.builder-version"));
    }

    #[test]
    fn test_source_trace_skips_plain_image() {
        let parsed = ParsedImage {
            reference: "docker.io/library/nginx:latest".to_string(),
            index: None,
            nydus_image: None,
        };
        assert!(source_trace(&parsed, Some("v2.2.4")).unwrap().is_none());
    }

    #[test]
    fn test_with_parts_count_mismatch() {
        let config = LoadConfig {
            sources: vec!["ghcr.io/org/a:v1".to_string()],
            ..Default::default()
        };
        let err = Loader::with_parts(config, Vec::new(), Box::new(NydusImageMerger::new("x")))
            .err()
            .unwrap();
        assert!(matches!(err, LoadError::ConfigError(_)));
    }
}
