//! # Version Manifest Store
//!
//! A manifest is the immutable record of one snapshot: the exact content
//! hash of every included path, the file identity behind each path, and the
//! lineage pointer to the version it was taken on top of. Manifests live as
//! one JSON file each under `versions/` and are immutable after creation
//! except for their human-facing label.

use crate::error::{DraftError, Result};
use crate::repo::{self, RepoLayout};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

/// One immutable snapshot record.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VersionManifest {
    /// Opaque monotonic identifier, also the manifest's filename stem.
    pub id: String,

    /// Human-facing `major.minor` number. Absent on manifests written by
    /// pre-numbering versions of the engine; history assigns placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_number: Option<String>,

    /// User-supplied label. The only mutable field.
    pub label: String,

    /// Creation time.
    pub timestamp: DateTime<Utc>,

    /// Normalized path → content hash.
    pub files: BTreeMap<String, String>,

    /// Normalized path → file identity. Absent entries mean the manifest
    /// predates identity tracking; restore falls back to metadata chasing.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub file_ids: BTreeMap<String, Uuid>,

    /// The version this snapshot was taken on top of.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Present only for folder snapshots: the normalized folder path, or
    /// `"."` for the whole project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Filesystem path of a manifest.
pub fn manifest_path(layout: &RepoLayout, id: &str) -> PathBuf {
    layout.versions_dir().join(format!("{id}.json"))
}

pub fn exists(layout: &RepoLayout, id: &str) -> bool {
    manifest_path(layout, id).is_file()
}

/// Atomically persists a manifest.
pub fn save(layout: &RepoLayout, manifest: &VersionManifest) -> Result<()> {
    repo::write_json_atomic(&manifest_path(layout, &manifest.id), manifest)
}

/// Loads one manifest by id.
pub fn load(layout: &RepoLayout, id: &str) -> Result<VersionManifest> {
    let path = manifest_path(layout, id);
    if !path.exists() {
        return Err(DraftError::VersionNotFound(id.to_string()));
    }
    let content = std::fs::read_to_string(&path).map_err(|e| DraftError::io_at(&path, e))?;
    serde_json::from_str(&content).map_err(|e| DraftError::CorruptManifest {
        id: id.to_string(),
        source: e,
    })
}

/// Lists every manifest, sorted ascending by timestamp (creation order).
/// Individual corrupt files are skipped with a warning so one bad manifest
/// cannot hide the rest of history.
pub fn list(layout: &RepoLayout) -> Result<Vec<VersionManifest>> {
    let dir = layout.versions_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut manifests = Vec::new();
    for entry in std::fs::read_dir(&dir).map_err(|e| DraftError::io_at(&dir, e))? {
        let entry = entry.map_err(|e| DraftError::io_at(&dir, e))?;
        let path = entry.path();
        if !path.extension().is_some_and(|ext| ext == "json") {
            continue;
        }
        let Some(id) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        match load(layout, &id) {
            Ok(manifest) => manifests.push(manifest),
            Err(e) => log::warn!("skipping unreadable manifest {}: {e}", path.display()),
        }
    }

    manifests.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
    Ok(manifests)
}

/// Finds a manifest by exact id or unique id prefix.
///
/// Returns `Ok(None)` when nothing matches; an ambiguous prefix is an
/// error naming the number of candidates.
pub fn find_by_prefix(layout: &RepoLayout, id_prefix: &str) -> Result<Option<VersionManifest>> {
    if exists(layout, id_prefix) {
        return load(layout, id_prefix).map(Some);
    }

    let matches: Vec<VersionManifest> = list(layout)?
        .into_iter()
        .filter(|m| m.id.starts_with(id_prefix))
        .collect();

    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.into_iter().next()),
        n => Err(anyhow::anyhow!(
            "ambiguous version prefix '{id_prefix}': matched {n} versions"
        )
        .into()),
    }
}

/// Changes a manifest's label. Everything else is immutable.
pub fn rename(layout: &RepoLayout, id: &str, new_label: &str) -> Result<()> {
    if new_label.trim().is_empty() {
        return Err(DraftError::EmptyLabel);
    }
    let mut manifest = load(layout, id)?;
    manifest.label = new_label.to_string();
    save(layout, &manifest)
}

/// Removes the manifest file. The caller pairs this with refcount release;
/// see the garbage collector.
pub fn delete_file(layout: &RepoLayout, id: &str) -> Result<()> {
    let path = manifest_path(layout, id);
    std::fs::remove_file(&path).map_err(|e| DraftError::io_at(&path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_layout() -> (tempfile::TempDir, RepoLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepoLayout::init(dir.path(), None).unwrap();
        (dir, layout)
    }

    fn sample(id: &str, ts_millis: i64) -> VersionManifest {
        VersionManifest {
            id: id.to_string(),
            version_number: Some("1.0".into()),
            label: "first pass".into(),
            timestamp: DateTime::from_timestamp_millis(ts_millis).unwrap(),
            files: BTreeMap::from([("art/hero.png".to_string(), "ab".repeat(32))]),
            file_ids: BTreeMap::from([("art/hero.png".to_string(), Uuid::new_v4())]),
            parent_id: None,
            scope: None,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn save_load_roundtrip() {
        let (_dir, layout) = test_layout();
        let manifest = sample("1700000000000", 1_700_000_000_000);
        save(&layout, &manifest).unwrap();

        let loaded = load(&layout, "1700000000000").unwrap();
        assert_eq!(loaded.label, "first pass");
        assert_eq!(loaded.files.len(), 1);
        assert_eq!(loaded.file_ids.len(), 1);
    }

    #[test]
    fn missing_version_is_typed() {
        let (_dir, layout) = test_layout();
        assert!(matches!(
            load(&layout, "nope"),
            Err(DraftError::VersionNotFound(_))
        ));
    }

    #[test]
    fn list_sorts_by_timestamp() {
        let (_dir, layout) = test_layout();
        save(&layout, &sample("20", 2_000)).unwrap();
        save(&layout, &sample("10", 1_000)).unwrap();
        save(&layout, &sample("30", 3_000)).unwrap();

        let ids: Vec<_> = list(&layout).unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["10", "20", "30"]);
    }

    #[test]
    fn list_skips_corrupt_manifest() {
        let (_dir, layout) = test_layout();
        save(&layout, &sample("10", 1_000)).unwrap();
        std::fs::write(layout.versions_dir().join("bad.json"), "{").unwrap();

        let listed = list(&layout).unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn prefix_lookup_requires_uniqueness() {
        let (_dir, layout) = test_layout();
        save(&layout, &sample("1700001", 1_000)).unwrap();
        save(&layout, &sample("1700002", 2_000)).unwrap();

        assert!(find_by_prefix(&layout, "1700001").unwrap().is_some());
        assert!(find_by_prefix(&layout, "9").unwrap().is_none());
        assert!(find_by_prefix(&layout, "17").is_err());
    }

    #[test]
    fn rename_changes_label_only() {
        let (_dir, layout) = test_layout();
        let manifest = sample("10", 1_000);
        save(&layout, &manifest).unwrap();

        rename(&layout, "10", "final final v2").unwrap();
        let loaded = load(&layout, "10").unwrap();
        assert_eq!(loaded.label, "final final v2");
        assert_eq!(loaded.files, manifest.files);
    }

    #[test]
    fn rename_rejects_empty_label() {
        let (_dir, layout) = test_layout();
        save(&layout, &sample("10", 1_000)).unwrap();
        assert!(matches!(
            rename(&layout, "10", "  "),
            Err(DraftError::EmptyLabel)
        ));
    }

    #[test]
    fn legacy_manifest_without_number_loads() {
        let (_dir, layout) = test_layout();
        let raw = r#"{
  "id": "9",
  "label": "old",
  "timestamp": "2023-01-01T00:00:00Z",
  "files": {}
}
"#;
        std::fs::write(layout.versions_dir().join("9.json"), raw).unwrap();

        let loaded = load(&layout, "9").unwrap();
        assert!(loaded.version_number.is_none());
        assert!(loaded.file_ids.is_empty());
    }
}
