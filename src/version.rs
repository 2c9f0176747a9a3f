//! # Version Identity & Numbering
//!
//! Two naming schemes coexist. The *version id* is an opaque monotonic
//! identifier (millisecond clock, re-minted on collision) that names the
//! manifest file and appears in lineage pointers. The *version number* is
//! the human-facing `major.minor` string:
//!
//! - extending the tip bumps the major and resets minor to zero,
//! - snapshotting on top of a non-tip version branches: the parent's major
//!   is kept and the next free minor under that major is taken.
//!
//! The numbering rule is load-bearing for UI compatibility and must not
//! drift.

use crate::index::RepositoryIndex;
use crate::manifests::VersionManifest;
use crate::repo::RepoLayout;
use crate::{manifests, paths};
use chrono::Utc;

/// Mints a unique version id from the current clock, probing past
/// collisions (two snapshots within one millisecond).
pub fn mint_version_id(layout: &RepoLayout) -> String {
    let mut candidate = Utc::now().timestamp_millis().max(1);
    loop {
        let id = candidate.to_string();
        if !manifests::exists(layout, &id) {
            return id;
        }
        candidate += 1;
    }
}

/// Parses a `major.minor` version number.
pub fn parse_version_number(s: &str) -> Option<(u32, u32)> {
    let (major, minor) = s.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Computes the `major.minor` number for a snapshot taken with
/// `index.current_head` as parent, given all existing manifests.
pub fn next_version_number(index: &RepositoryIndex, all: &[VersionManifest]) -> String {
    let Some(parent_id) = index.current_head.as_deref() else {
        return "1.0".to_string();
    };

    let parent_number = all
        .iter()
        .find(|m| m.id == parent_id)
        .and_then(|m| m.version_number.as_deref())
        .and_then(parse_version_number);

    let Some((p_major, _)) = parent_number else {
        // Parent missing or unnumbered (legacy): continue the sequence past
        // everything we can see.
        let max_major = known_numbers(all).map(|(major, _)| major).max().unwrap_or(0);
        return format!("{}.0", max_major + 1);
    };

    let extending_tip = index.current_head == index.latest_version;
    if extending_tip {
        return format!("{}.0", p_major + 1);
    }

    // Branching off a non-tip version: next free minor under the parent's
    // major.
    let max_minor = known_numbers(all)
        .filter(|(major, _)| *major == p_major)
        .map(|(_, minor)| minor)
        .max()
        .unwrap_or(0);
    format!("{p_major}.{}", max_minor + 1)
}

fn known_numbers(all: &[VersionManifest]) -> impl Iterator<Item = (u32, u32)> + '_ {
    all.iter()
        .filter_map(|m| m.version_number.as_deref())
        .filter_map(parse_version_number)
}

/// Normalizes a snapshot scope argument (`"."` stays the root sentinel).
pub fn normalize_scope(folder: &str) -> crate::error::Result<String> {
    paths::normalize(folder)
}
