//! Materializes one parsed source into its workspace.

use std::io::Write;
use std::path::Path;

use nydus_load_core::error::{LoadError, Result, ResultExt};
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

use crate::oci::{unpack_file, ParsedImage, BOOTSTRAP_FILE_NAME_IN_LAYER};
use crate::parser::ImageParser;
use crate::workspace::WorkspaceLayout;

/// Write `value` as 2-space indented JSON to `path`.
///
/// The content goes to a temporary file in the same directory first and is
/// renamed into place, so `path` is either absent or complete.
pub fn pretty_dump<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&data)?;
    tmp.flush()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o644))?;
    }

    tmp.persist(path).map_err(|e| LoadError::IoError(e.error))?;
    Ok(())
}

/// Persist the parsed metadata of one source and pull its layers.
///
/// Writes the index (if any), manifest and config as JSON, extracts the
/// bootstrap into `nydus_bootstrap` and fills `blobs/`. A source without a
/// nydus variant fails with a format error naming its reference.
pub async fn output(
    parser: &dyn ImageParser,
    cancel: &CancellationToken,
    parsed: &ParsedImage,
    layout: &WorkspaceLayout,
) -> Result<()> {
    if let Some(index) = &parsed.index {
        pretty_dump(index, &layout.index_path()).context("output nydus index")?;
    }

    let Some(image) = &parsed.nydus_image else {
        return Err(LoadError::FormatError(format!(
            "the {} is not a Nydus image",
            parsed.reference
        )));
    };

    pretty_dump(&image.manifest, &layout.manifest_path()).context("output nydus manifest")?;
    pretty_dump(&image.config, &layout.config_path()).context("output nydus config")?;

    let reader = parser
        .pull_bootstrap(cancel, image)
        .await
        .context("pull Nydus bootstrap layer")?;

    let target = layout.bootstrap_path();
    tokio::task::spawn_blocking(move || unpack_file(reader, BOOTSTRAP_FILE_NAME_IN_LAYER, &target))
        .await
        .map_err(|e| LoadError::Other(format!("bootstrap extraction task failed: {}", e)))?
        .context("unpack Nydus bootstrap layer")?;

    let blobs_dir = layout.blobs_dir();
    std::fs::create_dir_all(&blobs_dir).context("create blobs directory")?;
    parser
        .pull_blobs(cancel, image, &blobs_dir)
        .await
        .context("pull Nydus blobs")?;

    tracing::info!(
        reference = %parsed.reference,
        workspace = %layout.root().display(),
        "Output image information"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_pretty_dump_two_space_indent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nydus_manifest.json");

        pretty_dump(&json!({"layers": [1]}), &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\n  \"layers\": [\n    1\n  ]\n}");
    }

    #[test]
    fn test_pretty_dump_replaces_existing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nydus_config.json");
        std::fs::write(&path, b"stale content that is longer than the new one").unwrap();

        pretty_dump(&json!({"os": "linux"}), &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(value, json!({"os": "linux"}));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_pretty_dump_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nydus_index.json");

        pretty_dump(&json!({}), &path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_pretty_dump_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing").join("nydus_index.json");

        let err = pretty_dump(&json!({}), &path).unwrap_err();
        assert!(matches!(err, LoadError::IoError(_)));
    }
}
