//! Nydus platform recognition.
//!
//! A nydus variant in a manifest list is an ordinary entry whose platform
//! carries the nydus OS feature next to the usual os/architecture pair.

use nydus_load_core::PlatformConfig;
use oci_distribution::manifest::{ImageIndexEntry, Platform};

/// Whether `platform` lists the nydus OS feature.
///
/// Returns false for a missing platform and for an absent or empty feature list.
pub fn is_nydus_platform(config: &PlatformConfig, platform: Option<&Platform>) -> bool {
    platform
        .and_then(|p| p.os_features.as_ref())
        .map_or(false, |features| {
            features.iter().any(|f| *f == config.nydus_os_feature)
        })
}

/// Whether an index entry is the nydus variant for `os`/`arch`.
///
/// Never fails: an entry without a platform simply does not match.
pub fn match_nydus_platform(
    config: &PlatformConfig,
    entry: &ImageIndexEntry,
    os: &str,
    arch: &str,
) -> bool {
    let Some(platform) = entry.platform.as_ref() else {
        return false;
    };

    if platform.architecture != arch || platform.os != os {
        return false;
    }

    is_nydus_platform(config, Some(platform))
}
