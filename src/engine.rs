//! # Engine Facade
//!
//! `DraftEngine` is the typed API surface consumed by shells (CLI, local
//! HTTP, desktop). It owns the repository layout, enforces the per-repo
//! advisory lock around every operation (exclusive for mutations, shared
//! for reads, failing fast with `RepoBusy` on contention), and forwards to
//! the component modules.
//!
//! The engine is oblivious to file watching and UI concerns; callers decide
//! when to snapshot and how to present errors.

use crate::cancel::CancelToken;
use crate::error::{DraftError, Result};
use crate::gc::{GcOutcome, IntegrityReport};
use crate::history::{StorageReport, VersionDiff, VersionSummary};
use crate::index::RepositoryIndex;
use crate::metadata::{MetadataPatch, MetadataRecord};
use crate::repo::{RepoLayout, RepoLock};
use crate::restore::RestoreReport;
use crate::snapshot::SnapshotOutcome;
use crate::{gc, hashing, history, manifests, metadata, paths, repo, restore, snapshot};
use std::fs;
use std::path::{Path, PathBuf};

/// Handle to one project's draft repository.
#[derive(Debug)]
pub struct DraftEngine {
    layout: RepoLayout,
    cancel: Option<CancelToken>,
}

impl DraftEngine {
    /// Initializes (or re-opens) the repository for a project, optionally
    /// placing the draft root out of tree.
    pub fn init(project_root: &Path, draft_root: Option<&Path>) -> Result<Self> {
        Ok(Self {
            layout: RepoLayout::init(project_root, draft_root)?,
            cancel: None,
        })
    }

    /// Opens an existing repository.
    pub fn open(project_root: &Path) -> Result<Self> {
        Ok(Self {
            layout: RepoLayout::open(project_root)?,
            cancel: None,
        })
    }

    /// Walks up from `start` to the project root containing a repository.
    pub fn find_project_root(start: &Path) -> Option<PathBuf> {
        repo::find_project_root(start)
    }

    /// Attaches a cancellation token checked by long mutations.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn layout(&self) -> &RepoLayout {
        &self.layout
    }

    pub fn project_root(&self) -> &Path {
        self.layout.project_root()
    }

    // ─── Mutations (exclusive lock) ─────────────────────────────────────

    /// Snapshots an explicit file set.
    pub fn commit(&self, label: &str, explicit_files: &[PathBuf]) -> Result<SnapshotOutcome> {
        let _lock = RepoLock::exclusive(&self.layout)?;
        snapshot::commit(&self.layout, label, explicit_files, self.cancel.as_ref())
    }

    /// Snapshots a folder subtree (`"."` for the whole project).
    pub fn create_snapshot(&self, folder_relative: &str, label: &str) -> Result<SnapshotOutcome> {
        let _lock = RepoLock::exclusive(&self.layout)?;
        snapshot::create_snapshot(&self.layout, folder_relative, label, self.cancel.as_ref())
    }

    /// Materializes a version onto the working tree and moves HEAD.
    pub fn restore(&self, version_id: &str) -> Result<RestoreReport> {
        let _lock = RepoLock::exclusive(&self.layout)?;
        restore::restore(&self.layout, version_id, self.cancel.as_ref())
    }

    /// Deletes a version and reclaims blobs it solely referenced.
    pub fn delete_version(&self, version_id: &str) -> Result<GcOutcome> {
        let _lock = RepoLock::exclusive(&self.layout)?;
        gc::delete_version(&self.layout, version_id)
    }

    /// Changes a version's label.
    pub fn rename_version(&self, version_id: &str, new_label: &str) -> Result<()> {
        let _lock = RepoLock::exclusive(&self.layout)?;
        manifests::rename(&self.layout, version_id, new_label)
    }

    /// Records that a file or folder was renamed.
    pub fn move_metadata(&self, old_path: &str, new_path: &str) -> Result<()> {
        let _lock = RepoLock::exclusive(&self.layout)?;
        metadata::move_metadata(&self.layout, old_path, new_path)
    }

    /// Merges annotation fields (tags, tasks, attachments) into a path's
    /// metadata record.
    pub fn save_metadata(&self, path: &str, patch: MetadataPatch) -> Result<()> {
        let _lock = RepoLock::exclusive(&self.layout)?;
        let normalized = paths::normalize(path)?;
        metadata::update_fields(&self.layout, &normalized, patch)
    }

    /// Copies a local file into the repository's attachment area, keyed by
    /// content hash with the original extension preserved. Returns the
    /// internal relative path to store in metadata.
    pub fn save_attachment(&self, local_file: &Path) -> Result<String> {
        let _lock = RepoLock::exclusive(&self.layout)?;

        let hash = hashing::hash_file(local_file)?;
        let ext = local_file
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let name = format!("{hash}{ext}");
        let dest = self.layout.attachments_dir().join(&name);

        if !dest.exists() {
            let tmp = repo::temp_sibling(&dest);
            fs::copy(local_file, &tmp).map_err(|e| DraftError::io_at(local_file, e))?;
            repo::rename_replacing(&tmp, &dest)?;
        }

        Ok(format!("attachments/{name}"))
    }

    // ─── Reads (shared lock) ────────────────────────────────────────────

    /// Lists versions newest-first, optionally filtered by file identity.
    pub fn history(&self, filter_path: Option<&str>) -> Result<Vec<VersionSummary>> {
        let _lock = RepoLock::shared(&self.layout)?;
        history::history(&self.layout, filter_path)
    }

    /// Path-level differences between two versions.
    pub fn diff_versions(&self, older_id: &str, newer_id: &str) -> Result<VersionDiff> {
        let _lock = RepoLock::shared(&self.layout)?;
        history::diff_versions(&self.layout, older_id, newer_id)
    }

    /// Resolves an id prefix to a full version id; `None` when nothing
    /// matches, an error when the prefix is ambiguous.
    pub fn resolve_version_prefix(&self, id_prefix: &str) -> Result<Option<String>> {
        let _lock = RepoLock::shared(&self.layout)?;
        Ok(manifests::find_by_prefix(&self.layout, id_prefix)?.map(|m| m.id))
    }

    /// The version currently materialized on the working tree.
    pub fn get_current_head(&self) -> Result<Option<String>> {
        let _lock = RepoLock::shared(&self.layout)?;
        Ok(RepositoryIndex::load(&self.layout)?.current_head)
    }

    /// Newest version number containing `path`, preferring HEAD.
    pub fn get_latest_version_for_file(&self, path: &str) -> Result<Option<String>> {
        let _lock = RepoLock::shared(&self.layout)?;
        history::latest_version_for_file(&self.layout, path)
    }

    /// Extracts one file from a version to an arbitrary destination.
    pub fn extract_file(
        &self,
        version_id: &str,
        relative_path: &str,
        dest_path: &Path,
    ) -> Result<()> {
        let _lock = RepoLock::shared(&self.layout)?;
        restore::extract_file(&self.layout, version_id, relative_path, dest_path)
    }

    /// The metadata record for a path, if the path was ever observed.
    pub fn get_metadata(&self, path: &str) -> Result<Option<MetadataRecord>> {
        let _lock = RepoLock::shared(&self.layout)?;
        let normalized = paths::normalize(path)?;
        metadata::load_record(&self.layout, &normalized)
    }

    /// Repository-wide storage accounting.
    pub fn get_storage_report(&self) -> Result<StorageReport> {
        let _lock = RepoLock::shared(&self.layout)?;
        history::storage_report(&self.layout)
    }

    /// Offline cross-check of index, blobs, and manifests.
    pub fn validate_integrity(&self) -> Result<IntegrityReport> {
        let _lock = RepoLock::shared(&self.layout)?;
        gc::validate_integrity(&self.layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_requires_initialized_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DraftEngine::open(dir.path()),
            Err(DraftError::RepoNotFound(_))
        ));

        DraftEngine::init(dir.path(), None).unwrap();
        assert!(DraftEngine::open(dir.path()).is_ok());
    }

    #[test]
    fn attachment_is_content_keyed() {
        let dir = tempfile::tempdir().unwrap();
        let engine = DraftEngine::init(dir.path(), None).unwrap();

        let local = dir.path().join("ref.jpg");
        fs::write(&local, b"jpeg bytes").unwrap();

        let first = engine.save_attachment(&local).unwrap();
        let second = engine.save_attachment(&local).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("attachments/"));
        assert!(first.ends_with(".jpg"));

        let stored = engine.layout().repo_dir().join(&first);
        assert_eq!(fs::read(stored).unwrap(), b"jpeg bytes");
    }

    #[test]
    fn head_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let engine = DraftEngine::init(dir.path(), None).unwrap();
        assert!(engine.get_current_head().unwrap().is_none());
    }
}
