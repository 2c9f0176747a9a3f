//! # Garbage Collection & Integrity
//!
//! Deleting a version releases one reference per path entry of its manifest;
//! blobs whose count reaches zero are unlinked together with their records.
//! Because reference counts mirror live manifests exactly, no mark phase is
//! needed: delete is the collector.
//!
//! Integrity validation is the offline cross-check of the same invariant:
//! every indexed blob must exist on disk at its recorded size, and every
//! hash named by any manifest must have an index record. Problems are
//! reported structurally, never thrown one at a time.

use crate::error::Result;
use crate::index::RepositoryIndex;
use crate::repo::RepoLayout;
use crate::{manifests, objects};
use serde::Serialize;

/// Result of deleting one version.
#[derive(Debug, Clone, Default)]
pub struct GcOutcome {
    /// Blobs unlinked because their last reference went away.
    pub reclaimed_blobs: u64,

    /// On-disk bytes those blobs occupied.
    pub freed_bytes: u64,
}

/// Deletes a version and garbage-collects blobs it solely referenced.
pub fn delete_version(layout: &RepoLayout, version_id: &str) -> Result<GcOutcome> {
    let manifest = manifests::load(layout, version_id)?;
    manifests::delete_file(layout, version_id)?;

    let mut index = RepositoryIndex::load(layout)?;
    let mut outcome = GcOutcome::default();

    // One release per path entry, mirroring the per-entry increment at
    // snapshot time.
    for hash in manifest.files.values() {
        let stored = index.objects.get(hash).map(|r| r.compressed_size);
        if objects::release(layout, &mut index, hash)? {
            outcome.reclaimed_blobs += 1;
            outcome.freed_bytes += stored.unwrap_or(0);
        }
    }

    if index.latest_version.as_deref() == Some(version_id) {
        index.latest_version = manifests::list(layout)?.last().map(|m| m.id.clone());
    }
    if index.current_head.as_deref() == Some(version_id) {
        // The deleted version can no longer be named as HEAD; the working
        // tree keeps its bytes but the pointer is dropped.
        index.current_head = None;
    }

    index.save(layout)?;

    log::debug!(
        "deleted version {version_id}: reclaimed {} blobs ({} bytes)",
        outcome.reclaimed_blobs,
        outcome.freed_bytes
    );
    Ok(outcome)
}

/// One problem found by `validate_integrity`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IntegrityIssue {
    /// The index records a blob whose file is gone.
    #[serde(rename_all = "camelCase")]
    MissingBlobFile { hash: String },

    /// A blob file's size disagrees with its record.
    #[serde(rename_all = "camelCase")]
    SizeMismatch {
        hash: String,
        expected: u64,
        actual: u64,
    },

    /// A manifest references a hash with no index record.
    #[serde(rename_all = "camelCase")]
    UnrecordedHash {
        version_id: String,
        path: String,
        hash: String,
    },
}

/// Structured integrity report. `ok` is simply `errors.is_empty()`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub ok: bool,
    pub errors: Vec<IntegrityIssue>,
}

/// Cross-checks the index, the object files, and every manifest.
pub fn validate_integrity(layout: &RepoLayout) -> Result<IntegrityReport> {
    let index = RepositoryIndex::load(layout)?;
    let mut errors = Vec::new();

    for (hash, record) in &index.objects {
        let path = objects::blob_path(layout, hash);
        match std::fs::metadata(&path) {
            Ok(meta) => {
                if meta.len() != record.compressed_size {
                    errors.push(IntegrityIssue::SizeMismatch {
                        hash: hash.clone(),
                        expected: record.compressed_size,
                        actual: meta.len(),
                    });
                }
            }
            Err(_) => errors.push(IntegrityIssue::MissingBlobFile { hash: hash.clone() }),
        }
    }

    for manifest in manifests::list(layout)? {
        for (path, hash) in &manifest.files {
            if !index.objects.contains_key(hash) {
                errors.push(IntegrityIssue::UnrecordedHash {
                    version_id: manifest.id.clone(),
                    path: path.clone(),
                    hash: hash.clone(),
                });
            }
        }
    }

    Ok(IntegrityReport {
        ok: errors.is_empty(),
        errors,
    })
}
