use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LoadError, Result};

/// OS every nydus image is built for.
pub const DEFAULT_OS: &str = "linux";

/// OS feature that marks an index entry as the nydus variant.
pub const DEFAULT_NYDUS_OS_FEATURE: &str = "nydus.remoteimage.v1";

/// Architecture names accepted by default.
pub const PLATFORM_ARCH_AMD64: &str = "amd64";
pub const PLATFORM_ARCH_ARM64: &str = "arm64";

/// Load configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Source image references, processed in order
    pub sources: Vec<String>,

    /// Talk plain HTTP and skip certificate checks for all sources
    pub source_insecure: bool,

    /// Path to the `nydus-image` tool that merges bootstraps
    pub nydus_image_path: PathBuf,

    /// Root directory for per-source workspaces and the lifecycle blob
    pub work_dir: PathBuf,

    /// Architecture to select from multi-platform sources
    pub expected_arch: String,

    /// Platform matching rules
    pub platform: PlatformConfig,

    /// Retry policy for registry pulls
    pub retry: RetryConfig,

    /// What to do with workspaces of a run that failed part way
    pub on_failure: WorkspaceRetention,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            source_insecure: false,
            nydus_image_path: PathBuf::from("nydus-image"),
            work_dir: PathBuf::from("./tmp"),
            expected_arch: host_arch().to_string(),
            platform: PlatformConfig::default(),
            retry: RetryConfig::default(),
            on_failure: WorkspaceRetention::default(),
        }
    }
}

impl LoadConfig {
    /// Read a configuration from a YAML file. Missing keys take defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LoadError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: LoadConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(LoadError::ConfigError(
                "At least one source image is required".to_string(),
            ));
        }
        if let Some(pos) = self.sources.iter().position(|s| s.trim().is_empty()) {
            return Err(LoadError::ConfigError(format!(
                "Source #{} has an empty reference",
                pos
            )));
        }
        if !self.platform.is_supported_arch(&self.expected_arch) {
            return Err(LoadError::ConfigError(format!(
                "Unsupported architecture '{}' (supported: {})",
                self.expected_arch,
                self.platform.supported_archs.join(", ")
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(LoadError::ConfigError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Path handed to the merge tool for its lifecycle output.
    pub fn lifecycle_blob_path(&self) -> PathBuf {
        self.work_dir.join("lifecycle_blob")
    }
}

/// Immutable platform rules used to recognize nydus images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Required OS of a matching index entry
    pub os: String,

    /// OS feature string that marks a nydus entry
    pub nydus_os_feature: String,

    /// Architectures a load may target
    pub supported_archs: Vec<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            os: DEFAULT_OS.to_string(),
            nydus_os_feature: DEFAULT_NYDUS_OS_FEATURE.to_string(),
            supported_archs: vec![
                PLATFORM_ARCH_AMD64.to_string(),
                PLATFORM_ARCH_ARM64.to_string(),
            ],
        }
    }
}

impl PlatformConfig {
    pub fn is_supported_arch(&self, arch: &str) -> bool {
        self.supported_archs.iter().any(|a| a == arch)
    }
}

/// Bounded retry settings for registry pulls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds
    pub interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            interval_ms: 2000,
        }
    }
}

impl RetryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Policy for workspaces created by a run that later failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkspaceRetention {
    /// Leave every workspace on disk for inspection.
    #[default]
    Retain,
    /// Remove the workspaces this run created.
    Discard,
}

impl std::fmt::Display for WorkspaceRetention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retain => write!(f, "retain"),
            Self::Discard => write!(f, "discard"),
        }
    }
}

impl std::str::FromStr for WorkspaceRetention {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "retain" => Ok(Self::Retain),
            "discard" => Ok(Self::Discard),
            _ => Err(format!(
                "unknown workspace retention: '{}' (supported: retain, discard)",
                s
            )),
        }
    }
}

/// OCI architecture name of the running host.
pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => PLATFORM_ARCH_AMD64,
        "aarch64" => PLATFORM_ARCH_ARM64,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_with_sources(sources: &[&str]) -> LoadConfig {
        LoadConfig {
            sources: sources.iter().map(|s| s.to_string()).collect(),
            expected_arch: PLATFORM_ARCH_AMD64.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = LoadConfig::default();
        assert!(config.sources.is_empty());
        assert!(!config.source_insecure);
        assert_eq!(config.nydus_image_path, PathBuf::from("nydus-image"));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.interval(), Duration::from_secs(2));
        assert_eq!(config.on_failure, WorkspaceRetention::Retain);
    }

    #[test]
    fn test_default_platform() {
        let platform = PlatformConfig::default();
        assert_eq!(platform.os, "linux");
        assert_eq!(platform.nydus_os_feature, "nydus.remoteimage.v1");
        assert!(platform.is_supported_arch("amd64"));
        assert!(platform.is_supported_arch("arm64"));
        assert!(!platform.is_supported_arch("riscv64"));
        assert!(!platform.is_supported_arch(""));
    }

    #[test]
    fn test_validate_ok() {
        let config = config_with_sources(&["docker.io/library/nginx:latest"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_sources() {
        let config = config_with_sources(&[]);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, LoadError::ConfigError(_)));
    }

    #[test]
    fn test_validate_rejects_blank_reference() {
        let config = config_with_sources(&["nginx", "  "]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Source #1"));
    }

    #[test]
    fn test_validate_rejects_unsupported_arch() {
        let mut config = config_with_sources(&["nginx"]);
        config.expected_arch = "s390x".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("s390x"));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = config_with_sources(&["nginx"]);
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lifecycle_blob_path() {
        let mut config = LoadConfig::default();
        config.work_dir = PathBuf::from("/var/lib/nydus-load");
        assert_eq!(
            config.lifecycle_blob_path(),
            PathBuf::from("/var/lib/nydus-load/lifecycle_blob")
        );
    }

    #[test]
    fn test_from_yaml_file_partial_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "sources:\n  - ghcr.io/org/a:v1\n  - ghcr.io/org/b:v1\nexpected_arch: arm64\non_failure: discard\nretry:\n  interval_ms: 0"
        )
        .unwrap();

        let config = LoadConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.expected_arch, "arm64");
        assert_eq!(config.on_failure, WorkspaceRetention::Discard);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.interval_ms, 0);
        assert_eq!(config.platform, PlatformConfig::default());
    }

    #[test]
    fn test_from_yaml_file_missing() {
        let err = LoadConfig::from_yaml_file("/nonexistent/nydus-load.yaml").unwrap_err();
        assert!(matches!(err, LoadError::ConfigError(_)));
    }

    #[test]
    fn test_workspace_retention_roundtrip_str() {
        assert_eq!("retain".parse::<WorkspaceRetention>(), Ok(WorkspaceRetention::Retain));
        assert_eq!("discard".parse::<WorkspaceRetention>(), Ok(WorkspaceRetention::Discard));
        assert!("keep".parse::<WorkspaceRetention>().is_err());
        assert_eq!(WorkspaceRetention::Discard.to_string(), "discard");
    }

    #[test]
    fn test_host_arch_is_oci_name() {
        let arch = host_arch();
        assert_ne!(arch, "x86_64");
        assert_ne!(arch, "aarch64");
    }
}
