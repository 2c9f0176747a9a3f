//! # Metadata Store
//!
//! Per-path sidecar records carrying the stable file identity that travels
//! through history across renames, plus user-facing annotations (tags, tasks,
//! attachments). Sidecar filenames derive from the hash of the normalized
//! path; the record stores the path in cleartext so files remain
//! self-describing.
//!
//! Renames never destroy records. The old sidecar becomes a tombstone whose
//! `renamedTo` points forward to the new location, and the new record lists
//! the old path in `previousPaths`, so the linkage is navigable in both
//! directions. Tombstone chains are bounded; hand-edited metadata cannot send
//! the engine into a cycle.

use crate::error::{DraftError, Result};
use crate::hashing;
use crate::paths;
use crate::repo::{self, RepoLayout};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use uuid::Uuid;

/// Upper bound on `renamedTo` hops followed by resolution. Chains longer
/// than this indicate corrupted or hand-edited metadata.
pub const RENAME_CHAIN_LIMIT: usize = 50;

/// A single todo item attached to a file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskItem {
    pub label: String,
    #[serde(default)]
    pub done: bool,
}

/// The sidecar record for one working-tree path.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    /// Stable file identity. Minted at first observation; absent only in
    /// records written by pre-identity versions of the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,

    /// The normalized path this record describes.
    pub path: String,

    /// Every path this file has previously lived at.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub previous_paths: BTreeSet<String>,

    /// Set when this record is a tombstone: the path the file moved to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renamed_to: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskItem>,

    /// Internal relative paths under the repository's attachments dir.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl MetadataRecord {
    fn new(path: &str) -> Self {
        Self {
            id: Some(Uuid::new_v4()),
            path: path.to_string(),
            previous_paths: BTreeSet::new(),
            renamed_to: None,
            tags: Vec::new(),
            tasks: Vec::new(),
            attachments: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// True when this record describes the file's current location.
    pub fn is_live(&self) -> bool {
        self.renamed_to.is_none()
    }
}

/// Caller-supplied field updates for `update_fields`. `None` leaves the
/// existing value untouched.
#[derive(Debug, Default, Clone)]
pub struct MetadataPatch {
    pub tags: Option<Vec<String>>,
    pub tasks: Option<Vec<TaskItem>>,
    pub attachments: Option<Vec<String>>,
}

/// Sidecar file for a normalized path.
pub fn sidecar_path(layout: &RepoLayout, normalized_path: &str) -> PathBuf {
    layout
        .metadata_dir()
        .join(format!("{}.json", hashing::hash_path(normalized_path)))
}

/// Loads the record stored for exactly this path, if any.
pub fn load_record(layout: &RepoLayout, normalized_path: &str) -> Result<Option<MetadataRecord>> {
    let path = sidecar_path(layout, normalized_path);
    if !path.exists() {
        return Ok(None);
    }
    repo::read_json(&path).map(Some)
}

/// Persists a record at its own path's sidecar. The record is always
/// self-describing: `record.path` is the key it is stored under.
pub fn save_record(layout: &RepoLayout, record: &MetadataRecord) -> Result<()> {
    repo::write_json_atomic(&sidecar_path(layout, &record.path), record)
}

/// Returns the file identity for a path, creating the record (or minting a
/// missing identity on a legacy record) as needed.
pub fn get_or_create_fid(layout: &RepoLayout, normalized_path: &str) -> Result<Uuid> {
    match load_record(layout, normalized_path)? {
        Some(mut record) => match record.id {
            Some(fid) => Ok(fid),
            None => {
                let fid = Uuid::new_v4();
                record.id = Some(fid);
                save_record(layout, &record)?;
                Ok(fid)
            }
        },
        None => {
            let fid = Uuid::new_v4();
            let mut record = MetadataRecord::new(normalized_path);
            record.id = Some(fid);
            save_record(layout, &record)?;
            Ok(fid)
        }
    }
}

/// Merges caller-supplied fields into the record for `path`, creating it on
/// first touch.
pub fn update_fields(
    layout: &RepoLayout,
    normalized_path: &str,
    patch: MetadataPatch,
) -> Result<()> {
    let mut record = match load_record(layout, normalized_path)? {
        Some(record) => record,
        None => MetadataRecord::new(normalized_path),
    };

    if let Some(tags) = patch.tags {
        record.tags = tags;
    }
    if let Some(tasks) = patch.tasks {
        record.tasks = tasks;
    }
    if let Some(attachments) = patch.attachments {
        record.attachments = attachments;
    }

    save_record(layout, &record)
}

/// Reads every sidecar in the store. Individual corrupt sidecars are skipped
/// with a warning; one bad file must not take down a whole scan.
pub fn scan(layout: &RepoLayout) -> Result<Vec<MetadataRecord>> {
    let dir = layout.metadata_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for entry in std::fs::read_dir(&dir).map_err(|e| DraftError::io_at(&dir, e))? {
        let entry = entry.map_err(|e| DraftError::io_at(&dir, e))?;
        let path = entry.path();
        if !path.extension().is_some_and(|ext| ext == "json") {
            continue;
        }
        match repo::read_json::<MetadataRecord>(&path) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("skipping corrupt metadata sidecar {}: {e}", path.display()),
        }
    }
    Ok(records)
}

// ─── The rename pivot ───────────────────────────────────────────────────────

/// Records that `old_path` (a file, or a directory and everything under it)
/// now lives at `new_path`.
///
/// Matching is case-sensitive first; if nothing matches, a case-insensitive
/// pass tolerates Windows-originated records. Each matched record is split
/// into a forwarding tombstone at the old location and a live record at the
/// new one, both sharing the file identity.
pub fn move_metadata(layout: &RepoLayout, old_path: &str, new_path: &str) -> Result<()> {
    let old = paths::normalize(old_path)?;
    let new = paths::normalize(new_path)?;
    if old == new {
        return Ok(());
    }

    let all = scan(layout)?;

    let mut matched: Vec<&MetadataRecord> = all
        .iter()
        .filter(|r| paths::equals(&r.path, &old) || paths::is_ancestor(&old, &r.path))
        .collect();

    if matched.is_empty() {
        matched = all
            .iter()
            .filter(|r| paths::iequals(&r.path, &old) || paths::is_iancestor(&old, &r.path))
            .collect();
    }

    if matched.is_empty() {
        // Path never observed (or only present in pre-identity manifests):
        // still record the forwarding so old manifests can chase the rename.
        pivot_one(layout, &MetadataRecord::new(&old), &new)?;
        return Ok(());
    }

    let owned: Vec<MetadataRecord> = matched.into_iter().cloned().collect();
    for record in owned {
        // The old path may be a directory: rebase the matched record's path
        // onto the new prefix, keeping the remainder.
        let dest = if paths::equals(&record.path, &old) || paths::iequals(&record.path, &old) {
            new.clone()
        } else {
            let remainder = &record.path[old.len() + 1..];
            format!("{new}/{remainder}")
        };
        pivot_one(layout, &record, &dest)?;
    }

    Ok(())
}

fn pivot_one(layout: &RepoLayout, old_record: &MetadataRecord, dest: &str) -> Result<()> {
    let fid = old_record.id.unwrap_or_else(Uuid::new_v4);

    let mut fresh = old_record.clone();
    fresh.id = Some(fid);
    fresh.previous_paths.insert(old_record.path.clone());
    fresh.path = dest.to_string();
    fresh.renamed_to = None;
    save_record(layout, &fresh)?;

    let mut tombstone = old_record.clone();
    tombstone.id = Some(fid);
    tombstone.renamed_to = Some(dest.to_string());
    save_record(layout, &tombstone)?;

    log::debug!("metadata pivot: {} -> {}", old_record.path, dest);
    Ok(())
}

/// Follows the tombstone chain from `path` to the terminal record.
///
/// Returns the terminal record and its path. A terminal record with no
/// `renamedTo` is the file's current location; a terminal record that still
/// points forward means the chain dangles (target sidecar missing). Chains
/// over the hop limit abort with `RenameChainTooLong`.
pub fn resolve_current(
    layout: &RepoLayout,
    normalized_path: &str,
) -> Result<Option<(MetadataRecord, String)>> {
    let Some(mut record) = load_record(layout, normalized_path)? else {
        return Ok(None);
    };
    let mut current_path = normalized_path.to_string();

    for _ in 0..RENAME_CHAIN_LIMIT {
        let Some(next_path) = record.renamed_to.clone() else {
            return Ok(Some((record, current_path)));
        };
        match load_record(layout, &next_path)? {
            Some(next) => {
                record = next;
                current_path = next_path;
            }
            None => return Ok(Some((record, current_path))),
        }
    }

    Err(DraftError::RenameChainTooLong {
        path: normalized_path.to_string(),
        limit: RENAME_CHAIN_LIMIT,
    })
}

/// Finds the unique live record carrying `fid`.
///
/// Multiple live records with the same identity (possible after hand-edited
/// metadata) is an error the caller must see, not a coin flip.
pub fn find_by_fid(layout: &RepoLayout, fid: Uuid) -> Result<Option<MetadataRecord>> {
    let mut live: Vec<MetadataRecord> = scan(layout)?
        .into_iter()
        .filter(|r| r.is_live() && r.id == Some(fid))
        .collect();

    match live.len() {
        0 => Ok(None),
        1 => Ok(Some(live.remove(0))),
        _ => {
            let mut paths: Vec<String> = live.into_iter().map(|r| r.path).collect();
            paths.sort();
            Err(DraftError::AmbiguousFid { fid, paths })
        }
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
    fn fid_is_minted_once() {
        let (_dir, layout) = test_layout();
        let a = get_or_create_fid(&layout, "art/hero.png").unwrap();
        let b = get_or_create_fid(&layout, "art/hero.png").unwrap();
        assert_eq!(a, b);

        let other = get_or_create_fid(&layout, "art/villain.png").unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn legacy_record_without_id_gets_one() {
        let (_dir, layout) = test_layout();
        let legacy = MetadataRecord {
            id: None,
            ..MetadataRecord::new("old.psd")
        };
        save_record(&layout, &legacy).unwrap();

        let fid = get_or_create_fid(&layout, "old.psd").unwrap();
        let reloaded = load_record(&layout, "old.psd").unwrap().unwrap();
        assert_eq!(reloaded.id, Some(fid));
    }

    #[test]
    fn file_rename_leaves_tombstone() {
        let (_dir, layout) = test_layout();
        let fid = get_or_create_fid(&layout, "src/a.txt").unwrap();

        move_metadata(&layout, "src/a.txt", "src/b.txt").unwrap();

        let tombstone = load_record(&layout, "src/a.txt").unwrap().unwrap();
        assert_eq!(tombstone.renamed_to.as_deref(), Some("src/b.txt"));
        assert_eq!(tombstone.id, Some(fid));

        let fresh = load_record(&layout, "src/b.txt").unwrap().unwrap();
        assert!(fresh.is_live());
        assert_eq!(fresh.id, Some(fid));
        assert!(fresh.previous_paths.contains("src/a.txt"));
    }

    #[test]
    fn directory_rename_rebases_children() {
        let (_dir, layout) = test_layout();
        let fid_x = get_or_create_fid(&layout, "assets/x.png").unwrap();
        let fid_y = get_or_create_fid(&layout, "assets/deep/y.png").unwrap();

        move_metadata(&layout, "assets", "artwork").unwrap();

        let x = load_record(&layout, "artwork/x.png").unwrap().unwrap();
        assert_eq!(x.id, Some(fid_x));
        let y = load_record(&layout, "artwork/deep/y.png").unwrap().unwrap();
        assert_eq!(y.id, Some(fid_y));

        let old_x = load_record(&layout, "assets/x.png").unwrap().unwrap();
        assert_eq!(old_x.renamed_to.as_deref(), Some("artwork/x.png"));
    }

    #[test]
    fn case_insensitive_fallback() {
        let (_dir, layout) = test_layout();
        let fid = get_or_create_fid(&layout, "Assets/Hero.png").unwrap();

        // Windows-originated caller refers to the file with different case.
        move_metadata(&layout, "assets/hero.png", "art/hero.png").unwrap();

        let fresh = load_record(&layout, "art/hero.png").unwrap().unwrap();
        assert_eq!(fresh.id, Some(fid));
    }

    #[test]
    fn resolve_follows_chain_transitively() {
        let (_dir, layout) = test_layout();
        let fid = get_or_create_fid(&layout, "a.txt").unwrap();
        move_metadata(&layout, "a.txt", "b.txt").unwrap();
        move_metadata(&layout, "b.txt", "c.txt").unwrap();

        let (record, path) = resolve_current(&layout, "a.txt").unwrap().unwrap();
        assert_eq!(path, "c.txt");
        assert!(record.is_live());
        assert_eq!(record.id, Some(fid));
    }

    #[test]
    fn resolve_chain_is_bounded() {
        let (_dir, layout) = test_layout();
        // Hand-edit a two-node cycle.
        let mut a = MetadataRecord::new("loop/a");
        a.renamed_to = Some("loop/b".into());
        save_record(&layout, &a).unwrap();
        let mut b = MetadataRecord::new("loop/b");
        b.renamed_to = Some("loop/a".into());
        save_record(&layout, &b).unwrap();

        assert!(matches!(
            resolve_current(&layout, "loop/a"),
            Err(DraftError::RenameChainTooLong { .. })
        ));
    }

    #[test]
    fn find_by_fid_reports_ambiguity() {
        let (_dir, layout) = test_layout();
        let fid = Uuid::new_v4();
        for path in ["one.txt", "two.txt"] {
            let mut record = MetadataRecord::new(path);
            record.id = Some(fid);
            save_record(&layout, &record).unwrap();
        }

        assert!(matches!(
            find_by_fid(&layout, fid),
            Err(DraftError::AmbiguousFid { .. })
        ));
    }

    #[test]
    fn find_by_fid_ignores_tombstones() {
        let (_dir, layout) = test_layout();
        let fid = get_or_create_fid(&layout, "a.txt").unwrap();
        move_metadata(&layout, "a.txt", "b.txt").unwrap();

        let found = find_by_fid(&layout, fid).unwrap().unwrap();
        assert_eq!(found.path, "b.txt");
    }

    #[test]
    fn patch_merges_fields() {
        let (_dir, layout) = test_layout();
        update_fields(
            &layout,
            "art/hero.png",
            MetadataPatch {
                tags: Some(vec!["wip".into()]),
                ..MetadataPatch::default()
            },
        )
        .unwrap();
        update_fields(
            &layout,
            "art/hero.png",
            MetadataPatch {
                tasks: Some(vec![TaskItem {
                    label: "fix rigging".into(),
                    done: false,
                }]),
                ..MetadataPatch::default()
            },
        )
        .unwrap();

        let record = load_record(&layout, "art/hero.png").unwrap().unwrap();
        assert_eq!(record.tags, vec!["wip"]);
        assert_eq!(record.tasks.len(), 1);
    }
}
