//! # Repository Index
//!
//! The central `index.json` carries one record per stored blob plus the two
//! HEAD pointers. It is rewritten atomically after every mutation, and it is
//! always written *after* the manifest it refers to, so readers never observe
//! an index entry pointing at a missing manifest.
//!
//! Unknown JSON fields are captured and re-emitted on save, keeping the file
//! forward-compatible with newer engine versions.

use crate::error::{DraftError, Result};
use crate::repo::{self, RepoLayout};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-blob bookkeeping in the central index.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRecord {
    /// Original (uncompressed) size in bytes.
    pub size: u64,

    /// Size of the stored blob on disk.
    pub compressed_size: u64,

    /// Whether the blob on disk is brotli-compressed. Blobs written by old
    /// repositories may be raw; extraction honors this flag, never guesses.
    pub is_compressed: bool,

    /// Number of distinct (manifest × path-entry) references across all
    /// live manifests. Zero means the blob is garbage.
    pub ref_count: u64,

    /// The first working-tree path this content was observed at. Purely
    /// diagnostic.
    pub first_seen_path: String,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The repository's central index: object records plus HEAD pointers.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryIndex {
    /// Content hash → bookkeeping record.
    #[serde(default)]
    pub objects: BTreeMap<String, ObjectRecord>,

    /// The most recently created version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,

    /// The version currently materialized on the working tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_head: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl RepositoryIndex {
    /// Loads the index from disk.
    pub fn load(layout: &RepoLayout) -> Result<Self> {
        let path = layout.index_path();
        let content =
            std::fs::read_to_string(&path).map_err(|e| DraftError::io_at(&path, e))?;
        serde_json::from_str(&content).map_err(|e| DraftError::CorruptIndex { source: e })
    }

    /// Atomically persists the index.
    pub fn save(&self, layout: &RepoLayout) -> Result<()> {
        repo::write_json_atomic(&layout.index_path(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_layout() -> (tempfile::TempDir, RepoLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepoLayout::init(dir.path(), None).unwrap();
        (dir, layout)
    }

    #[test]
    fn fresh_index_is_empty() {
        let (_dir, layout) = test_layout();
        let index = RepositoryIndex::load(&layout).unwrap();
        assert!(index.objects.is_empty());
        assert!(index.latest_version.is_none());
        assert!(index.current_head.is_none());
    }

    #[test]
    fn save_load_roundtrip() {
        let (_dir, layout) = test_layout();
        let mut index = RepositoryIndex::load(&layout).unwrap();
        index.objects.insert(
            "ab".repeat(32),
            ObjectRecord {
                size: 100,
                compressed_size: 40,
                is_compressed: true,
                ref_count: 2,
                first_seen_path: "art/hero.png".into(),
                extra: BTreeMap::new(),
            },
        );
        index.latest_version = Some("1700000000000".into());
        index.save(&layout).unwrap();

        let reloaded = RepositoryIndex::load(&layout).unwrap();
        let rec = reloaded.objects.get(&"ab".repeat(32)).unwrap();
        assert_eq!(rec.ref_count, 2);
        assert_eq!(rec.first_seen_path, "art/hero.png");
        assert_eq!(reloaded.latest_version.as_deref(), Some("1700000000000"));
    }

    #[test]
    fn unknown_fields_survive_rewrite() {
        let (_dir, layout) = test_layout();
        let raw = r#"{
  "objects": {},
  "futureField": {"nested": true}
}
"#;
        std::fs::write(layout.index_path(), raw).unwrap();

        let index = RepositoryIndex::load(&layout).unwrap();
        index.save(&layout).unwrap();

        let reread = std::fs::read_to_string(layout.index_path()).unwrap();
        assert!(reread.contains("futureField"));
    }

    #[test]
    fn corrupt_index_is_typed() {
        let (_dir, layout) = test_layout();
        std::fs::write(layout.index_path(), "{ not json").unwrap();
        assert!(matches!(
            RepositoryIndex::load(&layout),
            Err(DraftError::CorruptIndex { .. })
        ));
    }
}
