//! Per-source workspace layout.
//!
//! ```text
//! <work_dir>/
//! ├── lifecycle_blob
//! └── <registry>:<repository>:<tag>/
//!     ├── nydus_index.json      (only for manifest lists)
//!     ├── nydus_manifest.json
//!     ├── nydus_config.json
//!     ├── nydus_bootstrap
//!     └── blobs/
//!         └── <digest hex>
//! ```

use std::path::{Path, PathBuf};

use nydus_load_core::error::Result;

/// Paths of one source's workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    /// Workspace for `reference` under `work_dir`; every `/` becomes `:`.
    pub fn for_source(work_dir: &Path, reference: &str) -> Self {
        Self {
            root: work_dir.join(reference.replace('/', ":")),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join("nydus_index.json")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("nydus_manifest.json")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("nydus_config.json")
    }

    pub fn bootstrap_path(&self) -> PathBuf {
        self.root.join("nydus_bootstrap")
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.root.join("blobs")
    }

    /// Create the workspace directory and its parents.
    ///
    /// Returns true if the directory did not exist before.
    pub fn create(&self) -> Result<bool> {
        let existed = self.root.is_dir();
        std::fs::create_dir_all(&self.root)?;
        Ok(!existed)
    }
}
