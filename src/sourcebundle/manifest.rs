//! Serialization types for the bundle manifest.
//!
//! The manifest (`terraform-sources.json`) is the sole source of truth for
//! an opened bundle: it maps every remote package to the local directory
//! holding its content, and records how each registry package version
//! resolved to a remote source. These types stay private to the crate; any
//! caller that needs manifest data goes through
//! [`Bundle`](super::Bundle).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The manifest file name inside a bundle directory.
pub(super) const MANIFEST_FILENAME: &str = "terraform-sources.json";

/// The only format version this crate reads and writes.
pub(super) const MANIFEST_FORMAT_VERSION: u64 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct ManifestRoot {
    #[serde(rename = "terraform_source_bundle")]
    pub format_version: u64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<ManifestRemotePackage>,

    #[serde(default, rename = "registry", skip_serializing_if = "Vec::is_empty")]
    pub registry_meta: Vec<ManifestRegistryMeta>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct ManifestRemotePackage {
    /// The address of an entire remote package, never carrying a sub-path.
    pub source: String,

    /// The name of the bundle subdirectory holding this package's content:
    /// always a single path segment.
    pub local: String,

    #[serde(default, skip_serializing_if = "ManifestPackageMeta::is_empty")]
    pub meta: ManifestPackageMeta,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(super) struct ManifestPackageMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_commit_id: Option<String>,
}

impl ManifestPackageMeta {
    pub(super) fn is_empty(&self) -> bool {
        self.git_commit_id.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct ManifestRegistryMeta {
    /// The address of an entire registry package, never carrying a
    /// sub-path.
    pub source: String,

    /// Keyed by exact version string. The map is ordered so serialization
    /// is deterministic.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub versions: BTreeMap<String, ManifestRegistryVersion>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct ManifestRegistryVersion {
    /// A full source address, possibly with a sub-path, to combine with
    /// any sub-path in the user's own registry source address.
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_fields_ignored() {
        let json = r#"{
            "terraform_source_bundle": 1,
            "future_field": {"anything": true},
            "packages": [
                {"source": "git::https://example.com/repo.git", "local": "abc123"}
            ]
        }"#;
        let root: ManifestRoot = serde_json::from_str(json).unwrap();
        assert_eq!(root.format_version, 1);
        assert_eq!(root.packages.len(), 1);
        assert!(root.registry_meta.is_empty());
    }

    #[test]
    fn test_meta_omitted_when_empty() {
        let root = ManifestRoot {
            format_version: MANIFEST_FORMAT_VERSION,
            packages: vec![ManifestRemotePackage {
                source: "git::https://example.com/repo.git".to_string(),
                local: "abc".to_string(),
                meta: ManifestPackageMeta::default(),
            }],
            registry_meta: Vec::new(),
        };
        let json = serde_json::to_string(&root).unwrap();
        assert!(!json.contains("\"meta\""));
        assert!(!json.contains("\"registry\""));
    }
}
