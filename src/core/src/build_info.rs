//! Trace information recorded for each loaded source.

use std::collections::BTreeMap;

/// Reference and resolved manifest digest of one source image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceReference {
    pub reference: String,
    pub digest: String,
}

/// Build environment trace, dumped as `nydus.trace.*` annotations.
#[derive(Debug, Clone, Default)]
pub struct BuildInfo {
    builder_version: String,
    tool_version: String,
    source_reference: SourceReference,
}

impl BuildInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_builder_version(&mut self, val: impl Into<String>) {
        self.builder_version = val.into();
    }

    pub fn set_tool_version(&mut self, val: impl Into<String>) {
        self.tool_version = val.into();
    }

    pub fn set_source_reference(&mut self, val: SourceReference) {
        self.source_reference = val;
    }

    /// Annotation map with only the non-empty fields.
    pub fn dump(&self) -> BTreeMap<String, String> {
        let mut data = BTreeMap::new();

        if !self.source_reference.reference.is_empty() {
            data.insert(
                "nydus.trace.source-reference".to_string(),
                self.source_reference.reference.clone(),
            );
        }
        if !self.source_reference.digest.is_empty() {
            data.insert(
                "nydus.trace.source-digest".to_string(),
                self.source_reference.digest.clone(),
            );
        }
        if !self.tool_version.is_empty() {
            data.insert(
                "nydus.trace.nydusify-version".to_string(),
                self.tool_version.clone(),
            );
        }
        // The merge tool may never run, so its version can be unknown.
        if !self.builder_version.is_empty() {
            data.insert(
                "nydus.trace.builder-version".to_string(),
                self.builder_version.clone(),
            );
        }

        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_dump() {
        assert!(BuildInfo::new().dump().is_empty());
    }

    #[test]
    fn test_full_dump() {
        let mut info = BuildInfo::new();
        info.set_builder_version("v2.1.0");
        info.set_tool_version("0.1.0");
        info.set_source_reference(SourceReference {
            reference: "ghcr.io/org/app:v1".to_string(),
            digest: "sha256:abc".to_string(),
        });

        let data = info.dump();
        assert_eq!(data.len(), 4);
        assert_eq!(data["nydus.trace.source-reference"], "ghcr.io/org/app:v1");
        assert_eq!(data["nydus.trace.source-digest"], "sha256:abc");
        assert_eq!(data["nydus.trace.nydusify-version"], "0.1.0");
        assert_eq!(data["nydus.trace.builder-version"], "v2.1.0");
    }

    #[test]
    fn test_dump_skips_missing_digest() {
        let mut info = BuildInfo::new();
        info.set_source_reference(SourceReference {
            reference: "nginx".to_string(),
            digest: String::new(),
        });
        let data = info.dump();
        assert_eq!(data.len(), 1);
        assert!(!data.contains_key("nydus.trace.source-digest"));
    }
}
