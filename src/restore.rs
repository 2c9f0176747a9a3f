//! # Restore Engine
//!
//! Materializes a manifest back onto the working tree. Destinations are not
//! the recorded paths but the *current* location of each file identity: a
//! file snapshotted at `src/a.txt` and later renamed to `src/b.txt` gets its
//! old bytes written to `src/b.txt`, and `src/a.txt` is not resurrected.
//!
//! Folder snapshots additionally clean their scope: files that did not exist
//! at snapshot time are deleted and emptied directories pruned, so the
//! subtree's shape matches snapshot time exactly.
//!
//! Restore is best-effort and idempotent rather than transactional: entries
//! whose content already matches are not rewritten, entries whose blob is
//! missing are skipped with a warning, and a file held open by another
//! process surfaces as the retriable `DestinationBusy` naming the blocked
//! path.

use crate::cancel::{self, CancelToken};
use crate::error::{DraftError, Result};
use crate::index::RepositoryIndex;
use crate::manifests::VersionManifest;
use crate::repo::RepoLayout;
use crate::snapshot::scope_dir;
use crate::{hashing, manifests, metadata, objects, paths};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use walkdir::WalkDir;

/// What a restore actually did.
#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    /// Entries whose bytes were written.
    pub restored: u64,

    /// Entries already at the manifest's content, left untouched.
    pub unchanged: u64,

    /// Manifest paths skipped because no destination exists any more, or
    /// because their blob is missing.
    pub skipped: Vec<String>,

    /// Files deleted by scoped cleaning.
    pub cleaned: u64,
}

/// Restores a version onto the working tree and moves HEAD to it.
pub fn restore(
    layout: &RepoLayout,
    version_id: &str,
    cancel_token: Option<&CancelToken>,
) -> Result<RestoreReport> {
    let manifest = manifests::load(layout, version_id)?;
    let mut report = RestoreReport::default();

    // Chase every entry to its current location first; scoped cleaning
    // must know the real destination set before it deletes anything.
    let mut targets: Vec<(String, String, String)> = Vec::new();
    for (recorded_path, hash) in &manifest.files {
        match resolve_destination(layout, &manifest, recorded_path)? {
            Some(dest) => targets.push((recorded_path.clone(), hash.clone(), dest)),
            None => {
                log::warn!(
                    "skipping '{recorded_path}': renamed away with no forwarding record"
                );
                report.skipped.push(recorded_path.clone());
            }
        }
    }

    if let Some(scope) = manifest.scope.as_deref() {
        report.cleaned = clean_scope(layout, scope, &targets)?;
    }

    let index = RepositoryIndex::load(layout)?;
    for (recorded_path, hash, dest) in &targets {
        cancel::check(cancel_token)?;

        let dest_path = layout.project_root().join(dest);
        if dest_path.is_file() && hashing::hash_file(&dest_path)? == *hash {
            report.unchanged += 1;
            continue;
        }

        let is_compressed = index
            .objects
            .get(hash)
            .map_or(true, |record| record.is_compressed);

        match objects::extract(layout, hash, &dest_path, is_compressed) {
            Ok(()) => report.restored += 1,
            Err(DraftError::MissingBlob(missing)) => {
                log::warn!("skipping '{recorded_path}': blob {missing} is missing");
                report.skipped.push(recorded_path.clone());
            }
            Err(e) => return Err(e),
        }
    }

    let mut index = RepositoryIndex::load(layout)?;
    index.current_head = Some(version_id.to_string());
    index.save(layout)?;

    Ok(report)
}

/// Extracts a single file from a version to an arbitrary destination,
/// without touching HEAD or the working tree.
pub fn extract_file(
    layout: &RepoLayout,
    version_id: &str,
    relative_path: &str,
    dest_path: &std::path::Path,
) -> Result<()> {
    let manifest = manifests::load(layout, version_id)?;
    let normalized = paths::normalize(relative_path)?;

    let Some(hash) = manifest.files.get(&normalized) else {
        return Err(DraftError::FileNotFoundInVersion {
            version_id: version_id.to_string(),
            path: normalized,
        });
    };

    let index = RepositoryIndex::load(layout)?;
    let is_compressed = index
        .objects
        .get(hash)
        .map_or(true, |record| record.is_compressed);

    objects::extract(layout, hash, dest_path, is_compressed)
}

/// Decides where a manifest entry should land today.
///
/// Identity lookup wins; the metadata tombstone chase covers manifests from
/// before identity tracking. A path with no metadata at all was never
/// renamed, so it restores in place. `None` means the file was renamed away
/// and the trail is gone; the entry is skipped rather than resurrected as
/// a ghost.
fn resolve_destination(
    layout: &RepoLayout,
    manifest: &VersionManifest,
    recorded_path: &str,
) -> Result<Option<String>> {
    if let Some(fid) = manifest.file_ids.get(recorded_path) {
        if let Some(record) = metadata::find_by_fid(layout, *fid)? {
            return Ok(Some(record.path));
        }
    }

    match metadata::resolve_current(layout, recorded_path)? {
        None => Ok(Some(recorded_path.to_string())),
        Some((record, terminal_path)) if record.is_live() => Ok(Some(terminal_path)),
        Some(_) => Ok(None),
    }
}

/// Deletes files under `scope` that are not restore destinations, then
/// prunes directories the deletions emptied. The repository directory and
/// the project pointer file are never touched.
fn clean_scope(
    layout: &RepoLayout,
    scope: &str,
    targets: &[(String, String, String)],
) -> Result<u64> {
    let root = scope_dir(layout, scope);
    if !root.is_dir() {
        return Err(DraftError::ScopeNotFound(scope.to_string()));
    }

    let keep: BTreeSet<&str> = targets.iter().map(|(_, _, dest)| dest.as_str()).collect();
    let mut deleted = 0u64;
    let mut emptied_candidates: Vec<PathBuf> = Vec::new();

    for entry in WalkDir::new(&root)
        .contents_first(true)
        .into_iter()
        .filter_entry(|e| !layout.contains(e.path()))
    {
        let entry = entry.map_err(|e| anyhow::anyhow!("walk failed under {scope}: {e}"))?;
        if entry.file_type().is_dir() {
            if entry.path() != root {
                emptied_candidates.push(entry.path().to_path_buf());
            }
            continue;
        }
        if entry.file_name() == crate::config::CONFIG_FILE {
            continue;
        }

        let relative = paths::relative_to(layout.project_root(), entry.path())?;
        if !keep.contains(relative.as_str()) {
            fs::remove_file(entry.path())
                .map_err(|e| DraftError::io_at(entry.path(), e))?;
            deleted += 1;
            log::debug!("scoped clean removed {relative}");
        }
    }

    // contents_first yields children before parents, so one pass suffices.
    for dir in emptied_candidates {
        let is_empty = fs::read_dir(&dir)
            .map(|mut d| d.next().is_none())
            .unwrap_or(false);
        if is_empty {
            let _ = fs::remove_dir(&dir);
        }
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{commit, create_snapshot};
    use std::path::PathBuf;

    fn test_layout() -> (tempfile::TempDir, RepoLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = RepoLayout::init(dir.path(), None).unwrap();
        (dir, layout)
    }

    #[test]
    fn restore_follows_rename() {
        let (dir, layout) = test_layout();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/a.txt"), b"version one").unwrap();
        let v1 = commit(&layout, "v1", &[PathBuf::from("src/a.txt")], None).unwrap();

        // Rename, modify, commit again.
        fs::rename(dir.path().join("src/a.txt"), dir.path().join("src/b.txt")).unwrap();
        metadata::move_metadata(&layout, "src/a.txt", "src/b.txt").unwrap();
        fs::write(dir.path().join("src/b.txt"), b"version two").unwrap();
        commit(&layout, "v2", &[PathBuf::from("src/b.txt")], None).unwrap();

        let report = restore(&layout, &v1.version_id, None).unwrap();
        assert_eq!(report.restored, 1);

        assert!(!dir.path().join("src/a.txt").exists());
        assert_eq!(
            fs::read(dir.path().join("src/b.txt")).unwrap(),
            b"version one"
        );
    }

    #[test]
    fn restore_is_idempotent() {
        let (dir, layout) = test_layout();
        fs::write(dir.path().join("f.bin"), b"stuff").unwrap();
        let v1 = commit(&layout, "v1", &[PathBuf::from("f.bin")], None).unwrap();

        let first = restore(&layout, &v1.version_id, None).unwrap();
        assert_eq!(first.restored + first.unchanged, 1);

        let second = restore(&layout, &v1.version_id, None).unwrap();
        assert_eq!(second.restored, 0);
        assert_eq!(second.unchanged, 1);
        assert_eq!(fs::read(dir.path().join("f.bin")).unwrap(), b"stuff");
    }

    #[test]
    fn folder_restore_cleans_scope() {
        let (dir, layout) = test_layout();
        fs::create_dir_all(dir.path().join("assets")).unwrap();
        fs::write(dir.path().join("assets/x.png"), b"x-bytes").unwrap();
        fs::write(dir.path().join("assets/y.png"), b"y-bytes").unwrap();
        let v1 = create_snapshot(&layout, "assets", "s1", None).unwrap();

        // New file and a new empty-able directory appear after the snapshot.
        fs::create_dir_all(dir.path().join("assets/later")).unwrap();
        fs::write(dir.path().join("assets/later/z.png"), b"z-bytes").unwrap();
        fs::write(dir.path().join("assets/x.png"), b"modified").unwrap();

        let report = restore(&layout, &v1.version_id, None).unwrap();
        assert_eq!(report.cleaned, 1);

        assert!(!dir.path().join("assets/later/z.png").exists());
        assert!(!dir.path().join("assets/later").exists());
        assert_eq!(fs::read(dir.path().join("assets/x.png")).unwrap(), b"x-bytes");
        assert_eq!(fs::read(dir.path().join("assets/y.png")).unwrap(), b"y-bytes");
    }

    #[test]
    fn restore_moves_head() {
        let (dir, layout) = test_layout();
        fs::write(dir.path().join("f.txt"), b"1").unwrap();
        let v1 = commit(&layout, "v1", &[PathBuf::from("f.txt")], None).unwrap();
        fs::write(dir.path().join("f.txt"), b"2").unwrap();
        commit(&layout, "v2", &[PathBuf::from("f.txt")], None).unwrap();

        restore(&layout, &v1.version_id, None).unwrap();
        let index = RepositoryIndex::load(&layout).unwrap();
        assert_eq!(index.current_head.as_deref(), Some(v1.version_id.as_str()));
    }

    #[test]
    fn renamed_away_without_forwarding_is_skipped() {
        let (dir, layout) = test_layout();
        fs::write(dir.path().join("ghost.txt"), b"boo").unwrap();
        let v1 = commit(&layout, "v1", &[PathBuf::from("ghost.txt")], None).unwrap();

        // Dangling tombstone: renamedTo points at a path with no record,
        // and the identity has no live record either.
        let mut record = metadata::load_record(&layout, "ghost.txt").unwrap().unwrap();
        record.renamed_to = Some("vanished.txt".into());
        metadata::save_record(&layout, &record).unwrap();
        fs::remove_file(dir.path().join("ghost.txt")).unwrap();

        let report = restore(&layout, &v1.version_id, None).unwrap();
        assert_eq!(report.skipped, vec!["ghost.txt".to_string()]);
        assert!(!dir.path().join("ghost.txt").exists());
        assert!(!dir.path().join("vanished.txt").exists());
    }

    #[test]
    fn missing_scope_at_restore_is_typed() {
        let (dir, layout) = test_layout();
        fs::create_dir_all(dir.path().join("assets")).unwrap();
        fs::write(dir.path().join("assets/x.png"), b"x").unwrap();
        let v1 = create_snapshot(&layout, "assets", "s1", None).unwrap();

        fs::remove_file(dir.path().join("assets/x.png")).unwrap();
        fs::remove_dir(dir.path().join("assets")).unwrap();

        assert!(matches!(
            restore(&layout, &v1.version_id, None),
            Err(DraftError::ScopeNotFound(_))
        ));
    }

    #[test]
    fn extract_file_to_arbitrary_destination() {
        let (dir, layout) = test_layout();
        fs::write(dir.path().join("model.obj"), b"vertices").unwrap();
        let v1 = commit(&layout, "v1", &[PathBuf::from("model.obj")], None).unwrap();

        let out = dir.path().join("preview/model.obj");
        extract_file(&layout, &v1.version_id, "model.obj", &out).unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"vertices");

        assert!(matches!(
            extract_file(&layout, &v1.version_id, "absent.obj", &out),
            Err(DraftError::FileNotFoundInVersion { .. })
        ));
    }
}
