//! # Snapshot Engine
//!
//! Both snapshot flavors share one backbone: ingest content into the object
//! store, couple every path to its file identity, compute the next version
//! number, and commit manifest plus index.
//!
//! - `commit` snapshots an explicit file set; listed files that no longer
//!   exist are skipped with a warning.
//! - `create_snapshot` walks a folder subtree (or the whole project for the
//!   `"."` scope), never descending into the repository directory.
//!
//! ## Commit protocol
//!
//! The mutation happens in three persisted steps, each an atomic write:
//!
//! 1. object records and reference counts are merged into the index,
//! 2. the manifest file is written,
//! 3. the index is rewritten with the advanced `latestVersion`/`currentHead`.
//!
//! A crash between any two steps leaves the repository openable with no
//! manifest referencing an unrecorded blob: worst case is a leaked refcount
//! or an orphan manifest not yet named by the index, both reclaimable.

use crate::cancel::{self, CancelToken};
use crate::error::{DraftError, Result};
use crate::index::RepositoryIndex;
use crate::manifests::VersionManifest;
use crate::objects::IngestOutcome;
use crate::repo::RepoLayout;
use crate::{manifests, metadata, objects, paths, version};
use chrono::DateTime;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Summary of a completed snapshot, for callers that report to humans.
#[derive(Debug, Clone)]
pub struct SnapshotOutcome {
    pub version_id: String,
    pub version_number: String,
    pub label: String,
    pub file_count: usize,
    pub new_blobs: usize,
    pub total_size: u64,
    pub stored_size: u64,
}

/// Snapshots an explicit set of files. Paths may be absolute (inside the
/// project) or relative to the project root. Missing files are skipped.
pub fn commit(
    layout: &RepoLayout,
    label: &str,
    explicit_files: &[PathBuf],
    cancel_token: Option<&CancelToken>,
) -> Result<SnapshotOutcome> {
    let mut entries = Vec::new();
    for given in explicit_files {
        let absolute = resolve_in_project(layout, given)?;
        if !absolute.is_file() {
            log::warn!("skipping missing file: {}", absolute.display());
            continue;
        }
        let relative = paths::relative_to(layout.project_root(), &absolute)?;
        entries.push((absolute, relative));
    }

    write_snapshot(layout, label, entries, None, cancel_token)
}

/// Snapshots a whole folder subtree. `folder_relative` of `"."` means the
/// entire project.
pub fn create_snapshot(
    layout: &RepoLayout,
    folder_relative: &str,
    label: &str,
    cancel_token: Option<&CancelToken>,
) -> Result<SnapshotOutcome> {
    let scope = version::normalize_scope(folder_relative)?;
    let walk_root = scope_dir(layout, &scope);
    if !walk_root.is_dir() {
        return Err(DraftError::ScopeNotFound(scope));
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(&walk_root)
        .into_iter()
        .filter_entry(|e| !layout.contains(e.path()))
    {
        let entry = entry.map_err(|e| anyhow::anyhow!("walk failed under {scope}: {e}"))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name() == crate::config::CONFIG_FILE {
            continue;
        }
        let absolute = entry.path().to_path_buf();
        let relative = paths::relative_to(layout.project_root(), &absolute)?;
        entries.push((absolute, relative));
    }

    write_snapshot(layout, label, entries, Some(scope), cancel_token)
}

/// Filesystem directory a scope denotes.
pub fn scope_dir(layout: &RepoLayout, scope: &str) -> PathBuf {
    if scope == paths::ROOT_SCOPE {
        layout.project_root().to_path_buf()
    } else {
        layout.project_root().join(scope)
    }
}

fn resolve_in_project(layout: &RepoLayout, given: &Path) -> Result<PathBuf> {
    if given.is_absolute() {
        if !given.starts_with(layout.project_root()) {
            return Err(DraftError::InvalidPath {
                path: given.to_string_lossy().into_owned(),
                reason: "file lies outside the project root".to_string(),
            });
        }
        Ok(given.to_path_buf())
    } else {
        Ok(layout.project_root().join(given))
    }
}

fn write_snapshot(
    layout: &RepoLayout,
    label: &str,
    entries: Vec<(PathBuf, String)>,
    scope: Option<String>,
    cancel_token: Option<&CancelToken>,
) -> Result<SnapshotOutcome> {
    if label.trim().is_empty() {
        return Err(DraftError::EmptyLabel);
    }

    // Ingest phase: hash and store content, couple each path to its
    // identity. Interruptible; orphan blobs are reclaimed by a later GC.
    let mut files = BTreeMap::new();
    let mut file_ids = BTreeMap::new();
    let mut outcomes: BTreeMap<String, IngestOutcome> = BTreeMap::new();
    let mut ingest_order = Vec::new();
    let mut total_size = 0u64;
    let mut stored_size = 0u64;
    let mut new_blobs = 0usize;

    for (absolute, relative) in &entries {
        cancel::check(cancel_token)?;
        if files.contains_key(relative) {
            // Same path listed twice: one manifest entry, one reference.
            continue;
        }

        let outcome = objects::ingest(layout, absolute)?;
        let fid = metadata::get_or_create_fid(layout, relative)?;

        total_size += outcome.size;
        if !outcome.deduplicated && !outcomes.contains_key(&outcome.hash) {
            stored_size += outcome.stored_size;
            new_blobs += 1;
        }

        files.insert(relative.clone(), outcome.hash.clone());
        file_ids.insert(relative.clone(), fid);
        outcomes.entry(outcome.hash.clone()).or_insert(outcome);
        ingest_order.push(relative.clone());
    }

    cancel::check(cancel_token)?;

    // Commit phase, step 1: merge object records and reference counts.
    // One increment per path entry; a hash referenced twice counts twice.
    let mut index = RepositoryIndex::load(layout)?;
    let all = manifests::list(layout)?;
    let version_number = version::next_version_number(&index, &all);
    let parent_id = index.current_head.clone();

    for relative in &ingest_order {
        let hash = &files[relative];
        let outcome = &outcomes[hash];
        objects::add_ref(
            &mut index,
            hash,
            outcome.size,
            outcome.stored_size,
            true,
            relative,
        );
    }
    index.save(layout)?;

    // Step 2: the manifest itself.
    let version_id = version::mint_version_id(layout);
    let timestamp = version_id
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(chrono::Utc::now);

    let manifest = VersionManifest {
        id: version_id.clone(),
        version_number: Some(version_number.clone()),
        label: label.to_string(),
        timestamp,
        files,
        file_ids,
        parent_id,
        scope,
        extra: BTreeMap::new(),
    };
    manifests::save(layout, &manifest)?;

    // Step 3: advance the pointers.
    index.latest_version = Some(version_id.clone());
    index.current_head = Some(version_id.clone());
    index.save(layout)?;

    log::debug!(
        "snapshot {version_id} ({version_number}) with {} files, {new_blobs} new blobs",
        manifest.files.len()
    );

    Ok(SnapshotOutcome {
        version_id,
        version_number,
        label: label.to_string(),
        file_count: manifest.files.len(),
        new_blobs,
        total_size,
        stored_size,
    })
}
