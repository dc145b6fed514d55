//! Bootstrap merging through the external `nydus-image` tool.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use nydus_load_core::error::{LoadError, Result};

/// Stitches the bootstraps of all loaded sources into one lifecycle blob.
#[async_trait]
pub trait BootstrapMerger: Send + Sync {
    /// Merge `bootstrap_paths`, in order, writing the result to `lifecycle_blob_path`.
    async fn merge(&self, bootstrap_paths: &[PathBuf], lifecycle_blob_path: &Path) -> Result<()>;

    /// Version of the merging tool, when it can be determined.
    async fn version(&self) -> Option<String> {
        None
    }
}

/// Runs `nydus-image load` as a child process.
#[derive(Debug, Clone)]
pub struct NydusImageMerger {
    nydus_image_path: PathBuf,
}

impl NydusImageMerger {
    pub fn new(nydus_image_path: impl Into<PathBuf>) -> Self {
        Self {
            nydus_image_path: nydus_image_path.into(),
        }
    }

    /// Arguments passed to the tool, one `--bootstrap` per path.
    pub fn command_args(bootstrap_paths: &[PathBuf], lifecycle_blob_path: &Path) -> Vec<OsString> {
        let mut args = vec![OsString::from("load")];
        for path in bootstrap_paths {
            args.push(OsString::from("--bootstrap"));
            args.push(path.as_os_str().to_os_string());
        }
        args.push(OsString::from("--lifecycle-blob"));
        args.push(lifecycle_blob_path.as_os_str().to_os_string());
        args
    }
}

/// Pick the version out of `nydus-image --version` output.
///
/// Prefers the `Version:` line; otherwise the first non-empty line.
fn parse_tool_version(stdout: &str) -> Option<String> {
    let lines = stdout.lines().map(str::trim).filter(|l| !l.is_empty());

    let mut first = None;
    for line in lines {
        if let Some(rest) = line.strip_prefix("Version:") {
            let version = rest.trim();
            if !version.is_empty() {
                return Some(version.to_string());
            }
        }
        first.get_or_insert(line);
    }
    first.map(str::to_string)
}

#[async_trait]
impl BootstrapMerger for NydusImageMerger {
    async fn merge(&self, bootstrap_paths: &[PathBuf], lifecycle_blob_path: &Path) -> Result<()> {
        let args = Self::command_args(bootstrap_paths, lifecycle_blob_path);

        tracing::info!(
            tool = %self.nydus_image_path.display(),
            bootstraps = bootstrap_paths.len(),
            lifecycle_blob = %lifecycle_blob_path.display(),
            "Merging nydus bootstraps"
        );

        let output = tokio::process::Command::new(&self.nydus_image_path)
            .args(&args)
            .output()
            .await
            .map_err(|e| {
                LoadError::ExternalProcessError(format!(
                    "Failed to run {}: {}",
                    self.nydus_image_path.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LoadError::ExternalProcessError(format!(
                "{} exited with {}: {}",
                self.nydus_image_path.display(),
                output.status,
                stderr.trim()
            )));
        }

        tracing::debug!(
            stdout = %String::from_utf8_lossy(&output.stdout).trim(),
            "nydus-image load finished"
        );
        Ok(())
    }

    async fn version(&self) -> Option<String> {
        let output = match tokio::process::Command::new(&self.nydus_image_path)
            .arg("--version")
            .output()
            .await
        {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                tracing::debug!(status = %output.status, "nydus-image --version failed");
                return None;
            }
            Err(e) => {
                tracing::debug!(
                    tool = %self.nydus_image_path.display(),
                    error = %e,
                    "Cannot query nydus-image version"
                );
                return None;
            }
        };

        parse_tool_version(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_args() {
        let args = NydusImageMerger::command_args(
            &[PathBuf::from("w/a:b/nydus_bootstrap"), PathBuf::from("w/c:d/nydus_bootstrap")],
            Path::new("w/lifecycle_blob"),
        );
        let args: Vec<String> = args.into_iter().map(|a| a.into_string().unwrap()).collect();
        assert_eq!(
            args,
            vec![
                "load",
                "--bootstrap",
                "w/a:b/nydus_bootstrap",
                "--bootstrap",
                "w/c:d/nydus_bootstrap",
                "--lifecycle-blob",
                "w/lifecycle_blob",
            ]
        );
    }

    #[test]
    fn test_command_args_no_bootstraps() {
        let args = NydusImageMerger::command_args(&[], Path::new("lifecycle_blob"));
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_parse_tool_version() {
        let stdout = "\nVersion: \tv2.2.4\nGit Commit: \t1f8a2c\nBuild Time: \t2024-01-10\n";
        assert_eq!(parse_tool_version(stdout).as_deref(), Some("v2.2.4"));
    }

    #[test]
    fn test_parse_tool_version_without_label() {
        assert_eq!(
            parse_tool_version("  \nnydus-image 2.1.0\n").as_deref(),
            Some("nydus-image 2.1.0")
        );
        assert_eq!(parse_tool_version(" \n\n"), None);
    }

    #[tokio::test]
    async fn test_version_missing_tool() {
        let merger = NydusImageMerger::new("/nonexistent/nydus-image");
        assert_eq!(merger.version().await, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_version_failing_tool() {
        assert_eq!(NydusImageMerger::new("false").version().await, None);
    }

    #[tokio::test]
    async fn test_merge_missing_tool() {
        let merger = NydusImageMerger::new("/nonexistent/nydus-image");
        let err = merger
            .merge(&[PathBuf::from("bootstrap")], Path::new("lifecycle_blob"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::ExternalProcessError(_)));
        assert!(err.to_string().contains("/nonexistent/nydus-image"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_merge_success_exit() {
        let merger = NydusImageMerger::new("true");
        merger
            .merge(&[PathBuf::from("bootstrap")], Path::new("lifecycle_blob"))
            .await
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_merge_failure_exit() {
        let merger = NydusImageMerger::new("false");
        let err = merger
            .merge(&[PathBuf::from("bootstrap")], Path::new("lifecycle_blob"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::ExternalProcessError(_)));
    }
}
