//! # History Query
//!
//! Answers the questions a version browser asks: every version in
//! chronological order, the versions a particular file or folder appears in
//! (across renames, by identity), and how much storage each snapshot
//! represents.
//!
//! Filtering matches on *identity keys*, not bare strings: the target's FID,
//! its current path, every previous path, and the forward pointer of a
//! tombstone all count, each with a case-insensitive twin to tolerate
//! Windows-originated records.

use crate::error::Result;
use crate::index::RepositoryIndex;
use crate::manifests::VersionManifest;
use crate::repo::RepoLayout;
use crate::{manifests, metadata, paths};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

/// One row of history, sized and numbered for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub id: String,

    /// Always present: legacy manifests without a number get positional
    /// placeholders (`"1"`, `"2"`, …) assigned in creation order.
    pub version_number: String,

    pub label: String,
    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    pub file_count: usize,

    /// Sum of original sizes across the counted path entries.
    pub total_size: u64,

    /// Sum of on-disk blob sizes across the counted distinct hashes.
    pub total_compressed_size: u64,
}

/// Lists versions newest-first, optionally filtered to those containing a
/// given file or folder (by identity, across renames).
pub fn history(layout: &RepoLayout, filter_path: Option<&str>) -> Result<Vec<VersionSummary>> {
    let index = RepositoryIndex::load(layout)?;
    let mut all = manifests::list(layout)?;

    // Legacy tolerance: manifests from before numbering get positional
    // placeholders in creation order.
    for (position, manifest) in all.iter_mut().enumerate() {
        if manifest.version_number.is_none() {
            manifest.version_number = Some((position + 1).to_string());
        }
    }

    let filter = match filter_path {
        Some(raw) => Some(FilterKeys::build(layout, raw, &all)?),
        None => None,
    };

    let mut rows = Vec::new();
    for manifest in &all {
        match &filter {
            None => rows.push(summarize(manifest, &index, None)),
            Some(keys) => {
                if let Some(matched) = keys.match_manifest(manifest) {
                    rows.push(summarize(manifest, &index, Some(&matched)));
                }
            }
        }
    }

    rows.reverse();
    Ok(rows)
}

/// Returns the version number of the newest version containing `path`,
/// preferring HEAD when HEAD is among them.
pub fn latest_version_for_file(layout: &RepoLayout, path: &str) -> Result<Option<String>> {
    let rows = history(layout, Some(path))?;
    if rows.is_empty() {
        return Ok(None);
    }

    let index = RepositoryIndex::load(layout)?;
    if let Some(head) = index.current_head.as_deref() {
        if let Some(row) = rows.iter().find(|r| r.id == head) {
            return Ok(Some(row.version_number.clone()));
        }
    }
    Ok(Some(rows[0].version_number.clone()))
}

fn summarize(
    manifest: &VersionManifest,
    index: &RepositoryIndex,
    restrict_to: Option<&BTreeSet<String>>,
) -> VersionSummary {
    let mut total_size = 0u64;
    let mut total_compressed = 0u64;
    let mut counted_hashes = BTreeSet::new();
    let mut file_count = 0usize;

    for (path, hash) in &manifest.files {
        if let Some(keep) = restrict_to {
            if !keep.contains(path) {
                continue;
            }
        }
        file_count += 1;
        if let Some(record) = index.objects.get(hash) {
            total_size += record.size;
            if counted_hashes.insert(hash.clone()) {
                total_compressed += record.compressed_size;
            }
        }
    }

    VersionSummary {
        id: manifest.id.clone(),
        version_number: manifest
            .version_number
            .clone()
            .unwrap_or_else(|| "?".to_string()),
        label: manifest.label.clone(),
        timestamp: manifest.timestamp,
        scope: manifest.scope.clone(),
        parent_id: manifest.parent_id.clone(),
        file_count,
        total_size,
        total_compressed_size: total_compressed,
    }
}

/// The identity key set for one filter target.
struct FilterKeys {
    /// Normalized path keys, each stored with its lowercase twin.
    keys: BTreeSet<String>,
    lower_keys: BTreeSet<String>,
    fid: Option<Uuid>,
    is_directory: bool,
}

impl FilterKeys {
    fn build(layout: &RepoLayout, raw: &str, all: &[VersionManifest]) -> Result<Self> {
        let target = paths::normalize(raw)?;

        let mut keys = BTreeSet::from([target.clone()]);
        let mut fid = None;

        if let Some(record) = metadata::load_record(layout, &target)? {
            fid = record.id;
            keys.insert(record.path.clone());
            if let Some(forward) = &record.renamed_to {
                keys.insert(forward.clone());
            }
            keys.extend(record.previous_paths.iter().cloned());
        }

        let on_disk_dir = crate::snapshot::scope_dir(layout, &target).is_dir();
        let behaves_as_folder = all.iter().any(|m| {
            m.files
                .keys()
                .any(|p| paths::is_ancestor(&target, p))
        });

        let lower_keys = keys.iter().map(|k| k.to_lowercase()).collect();
        Ok(Self {
            keys,
            lower_keys,
            fid,
            is_directory: on_disk_dir || behaves_as_folder,
        })
    }

    fn contains_path(&self, path: &str) -> bool {
        self.keys.contains(path) || self.lower_keys.contains(&path.to_lowercase())
    }

    fn is_under_key(&self, path: &str) -> bool {
        self.keys.iter().any(|k| paths::is_ancestor(k, path))
            || self
                .lower_keys
                .iter()
                .any(|k| paths::is_ancestor(k, &path.to_lowercase()))
    }

    /// Returns the matching path entries if this manifest matches at all.
    fn match_manifest(&self, manifest: &VersionManifest) -> Option<BTreeSet<String>> {
        let scope_match = manifest
            .scope
            .as_deref()
            .is_some_and(|s| self.contains_path(s));

        let mut matched: BTreeSet<String> = BTreeSet::new();
        for (path, _) in &manifest.files {
            let by_fid = self
                .fid
                .is_some_and(|fid| manifest.file_ids.get(path) == Some(&fid));
            let by_path = self.contains_path(path);
            let by_prefix = self.is_directory && self.is_under_key(path);
            if by_fid || by_path || by_prefix {
                matched.insert(path.clone());
            }
        }

        let fid_anywhere = self
            .fid
            .is_some_and(|fid| manifest.file_ids.values().any(|v| *v == fid));

        if matched.is_empty() && !scope_match && !fid_anywhere {
            return None;
        }
        if matched.is_empty() {
            // Scope-level match (or fid recorded under a path we could not
            // line up): size the whole manifest.
            matched.extend(manifest.files.keys().cloned());
        }
        Some(matched)
    }
}

// ─── Version diff ───────────────────────────────────────────────────────────

/// Path-level differences between two versions. Contents are compared by
/// hash; there is no byte-level diffing for binary assets.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDiff {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,

    /// Original bytes introduced by added entries.
    pub added_size: u64,

    /// Net original-size change across modified entries.
    pub modified_size_delta: i64,

    /// Original bytes dropped with removed entries.
    pub removed_size: u64,
}

impl VersionDiff {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.modified.is_empty() || !self.removed.is_empty()
    }
}

/// Compares two versions path by path.
pub fn diff_versions(layout: &RepoLayout, older_id: &str, newer_id: &str) -> Result<VersionDiff> {
    let older = manifests::load(layout, older_id)?;
    let newer = manifests::load(layout, newer_id)?;
    let index = RepositoryIndex::load(layout)?;

    let size_of = |hash: &str| index.objects.get(hash).map_or(0, |r| r.size);
    let mut diff = VersionDiff::default();

    for (path, new_hash) in &newer.files {
        match older.files.get(path) {
            None => {
                diff.added.push(path.clone());
                diff.added_size += size_of(new_hash);
            }
            Some(old_hash) if old_hash != new_hash => {
                diff.modified.push(path.clone());
                diff.modified_size_delta +=
                    size_of(new_hash) as i64 - size_of(old_hash) as i64;
            }
            Some(_) => {}
        }
    }

    for (path, old_hash) in &older.files {
        if !newer.files.contains_key(path) {
            diff.removed.push(path.clone());
            diff.removed_size += size_of(old_hash);
        }
    }

    Ok(diff)
}

// ─── Storage report ─────────────────────────────────────────────────────────

/// Per-blob row of the storage report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReportRow {
    pub hash: String,
    pub size: u64,
    pub compressed_size: u64,
    pub ref_count: u64,
    pub first_seen_path: String,
}

/// Repository-wide storage accounting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageReport {
    pub total_size: u64,
    pub total_compressed_size: u64,

    /// `compressed / original`; 1.0 for an empty store.
    pub compression_ratio: f64,

    pub files: Vec<ObjectReportRow>,
    pub snapshots: Vec<VersionSummary>,
}

/// Computes the storage report from the index and full history.
pub fn storage_report(layout: &RepoLayout) -> Result<StorageReport> {
    let index = RepositoryIndex::load(layout)?;

    let mut total_size = 0u64;
    let mut total_compressed = 0u64;
    let mut files = Vec::new();
    for (hash, record) in &index.objects {
        total_size += record.size;
        total_compressed += record.compressed_size;
        files.push(ObjectReportRow {
            hash: hash.clone(),
            size: record.size,
            compressed_size: record.compressed_size,
            ref_count: record.ref_count,
            first_seen_path: record.first_seen_path.clone(),
        });
    }

    let compression_ratio = if total_size > 0 {
        total_compressed as f64 / total_size as f64
    } else {
        1.0
    };

    Ok(StorageReport {
        total_size,
        total_compressed_size: total_compressed,
        compression_ratio,
        files,
        snapshots: history(layout, None)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{commit, create_snapshot};
    use std::fs;
    use std::path::PathBuf;

    fn test_layout() -> (tempfile::TempDir, RepoLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepoLayout::init(dir.path(), None).unwrap();
        (dir, layout)
    }

    #[test]
    fn history_is_newest_first() {
        let (dir, layout) = test_layout();
        fs::write(dir.path().join("f.txt"), b"1").unwrap();
        let v1 = commit(&layout, "one", &[PathBuf::from("f.txt")], None).unwrap();
        fs::write(dir.path().join("f.txt"), b"2").unwrap();
        let v2 = commit(&layout, "two", &[PathBuf::from("f.txt")], None).unwrap();

        let rows = history(&layout, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, v2.version_id);
        assert_eq!(rows[1].id, v1.version_id);
        assert_eq!(rows[0].version_number, "2.0");
    }

    #[test]
    fn rollups_count_entries_logically_and_blobs_physically() {
        let (dir, layout) = test_layout();
        fs::write(dir.path().join("a.bin"), b"same-bytes").unwrap();
        fs::write(dir.path().join("b.bin"), b"same-bytes").unwrap();
        commit(
            &layout,
            "dedup",
            &[PathBuf::from("a.bin"), PathBuf::from("b.bin")],
            None,
        )
        .unwrap();

        let rows = history(&layout, None).unwrap();
        let index = RepositoryIndex::load(&layout).unwrap();
        let record = index.objects.values().next().unwrap();

        assert_eq!(rows[0].total_size, record.size * 2);
        assert_eq!(rows[0].total_compressed_size, record.compressed_size);
    }

    #[test]
    fn filter_follows_rename_by_identity() {
        let (dir, layout) = test_layout();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/a.txt"), b"one").unwrap();
        let v1 = commit(&layout, "v1", &[PathBuf::from("src/a.txt")], None).unwrap();

        fs::rename(dir.path().join("src/a.txt"), dir.path().join("src/b.txt")).unwrap();
        metadata::move_metadata(&layout, "src/a.txt", "src/b.txt").unwrap();
        fs::write(dir.path().join("src/b.txt"), b"two").unwrap();
        let v2 = commit(&layout, "v2", &[PathBuf::from("src/b.txt")], None).unwrap();

        let rows = history(&layout, Some("src/b.txt")).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![v2.version_id.as_str(), v1.version_id.as_str()]);
    }

    #[test]
    fn filter_by_folder_prefix() {
        let (dir, layout) = test_layout();
        fs::create_dir_all(dir.path().join("assets")).unwrap();
        fs::write(dir.path().join("assets/x.png"), b"x").unwrap();
        fs::write(dir.path().join("readme.txt"), b"r").unwrap();

        let v1 = create_snapshot(&layout, "assets", "s1", None).unwrap();
        let v2 = commit(&layout, "other", &[PathBuf::from("readme.txt")], None).unwrap();

        let rows = history(&layout, Some("assets")).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains(&v1.version_id.as_str()));
        assert!(!ids.contains(&v2.version_id.as_str()));
    }

    #[test]
    fn filter_restricts_rollups_to_matching_entries() {
        let (dir, layout) = test_layout();
        fs::write(dir.path().join("big.bin"), vec![7u8; 4096]).unwrap();
        fs::write(dir.path().join("small.txt"), b"s").unwrap();
        commit(
            &layout,
            "mixed",
            &[PathBuf::from("big.bin"), PathBuf::from("small.txt")],
            None,
        )
        .unwrap();

        let all = history(&layout, None).unwrap();
        let filtered = history(&layout, Some("small.txt")).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].file_count, 1);
        assert!(filtered[0].total_size < all[0].total_size);
    }

    #[test]
    fn latest_version_prefers_head() {
        let (dir, layout) = test_layout();
        fs::write(dir.path().join("f.txt"), b"1").unwrap();
        let v1 = commit(&layout, "one", &[PathBuf::from("f.txt")], None).unwrap();
        fs::write(dir.path().join("f.txt"), b"2").unwrap();
        commit(&layout, "two", &[PathBuf::from("f.txt")], None).unwrap();

        assert_eq!(
            latest_version_for_file(&layout, "f.txt").unwrap().as_deref(),
            Some("2.0")
        );

        // Move HEAD back; the answer follows it.
        crate::restore::restore(&layout, &v1.version_id, None).unwrap();
        assert_eq!(
            latest_version_for_file(&layout, "f.txt").unwrap().as_deref(),
            Some("1.0")
        );

        assert!(latest_version_for_file(&layout, "never.txt")
            .unwrap()
            .is_none());
    }

    #[test]
    fn legacy_manifests_get_positional_numbers() {
        let (_dir, layout) = test_layout();
        let raw = r#"{
  "id": "500",
  "label": "old",
  "timestamp": "2020-05-01T00:00:00Z",
  "files": {}
}
"#;
        fs::write(layout.versions_dir().join("500.json"), raw).unwrap();

        let rows = history(&layout, None).unwrap();
        assert_eq!(rows[0].version_number, "1");
    }

    #[test]
    fn diff_classifies_added_modified_removed() {
        let (dir, layout) = test_layout();
        fs::write(dir.path().join("keep.txt"), b"same").unwrap();
        fs::write(dir.path().join("change.txt"), b"before").unwrap();
        fs::write(dir.path().join("drop.txt"), b"going away").unwrap();
        let v1 = create_snapshot(&layout, ".", "v1", None).unwrap();

        fs::write(dir.path().join("change.txt"), b"after with more bytes").unwrap();
        fs::remove_file(dir.path().join("drop.txt")).unwrap();
        fs::write(dir.path().join("new.txt"), b"brand new").unwrap();
        let v2 = create_snapshot(&layout, ".", "v2", None).unwrap();

        let diff = diff_versions(&layout, &v1.version_id, &v2.version_id).unwrap();
        assert!(diff.has_changes());
        assert_eq!(diff.added, vec!["new.txt"]);
        assert_eq!(diff.modified, vec!["change.txt"]);
        assert_eq!(diff.removed, vec!["drop.txt"]);
        assert_eq!(diff.added_size, b"brand new".len() as u64);
        assert!(diff.modified_size_delta > 0);
        assert_eq!(diff.removed_size, b"going away".len() as u64);
    }

    #[test]
    fn storage_report_totals() {
        let (dir, layout) = test_layout();
        let payload: Vec<u8> = (0..10_000u32).flat_map(|i| i.to_le_bytes()).collect();
        fs::write(dir.path().join("data.bin"), &payload).unwrap();
        commit(&layout, "v1", &[PathBuf::from("data.bin")], None).unwrap();

        let report = storage_report(&layout).unwrap();
        assert_eq!(report.files.len(), 1);
        assert_eq!(report.total_size, payload.len() as u64);
        assert!(report.total_compressed_size < report.total_size);
        assert!(report.compression_ratio < 1.0);
        assert_eq!(report.snapshots.len(), 1);
    }
}
