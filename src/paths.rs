//! # Path Codec
//!
//! Every path that crosses the engine boundary is normalized to forward-slash
//! form so that repositories written on Windows and Unix agree byte-for-byte
//! on manifest keys and metadata sidecar names.
//!
//! Comparisons are case-sensitive by default. Rename detection and history
//! filtering additionally use a case-insensitive comparator to tolerate
//! Windows-originated data where the same file may have been recorded with
//! differing case over time.

use crate::error::{DraftError, Result};
use std::path::Path;

/// Sentinel scope value meaning "the whole project root".
pub const ROOT_SCOPE: &str = ".";

/// Normalizes a relative path to canonical engine form.
///
/// Backslashes become forward slashes, redundant separators collapse,
/// leading `./` and trailing `/` are stripped, and case is preserved as
/// supplied. The bare `"."` survives normalization; it is the repository-root
/// sentinel used only in snapshot scopes.
///
/// Fails with `InvalidPath` on empty input or on absolute paths.
pub fn normalize(path: &str) -> Result<String> {
    if path.is_empty() {
        return Err(invalid(path, "empty path"));
    }

    let unified = path.replace('\\', "/");

    if is_absolute(&unified) {
        return Err(invalid(path, "expected a relative path"));
    }

    if unified == "." || unified == "./" {
        return Ok(ROOT_SCOPE.to_string());
    }

    let mut parts = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => continue,
            ".." => return Err(invalid(path, "parent traversal not allowed")),
            p => parts.push(p),
        }
    }

    if parts.is_empty() {
        return Err(invalid(path, "path has no components"));
    }

    Ok(parts.join("/"))
}

/// Case-sensitive equality over normalized paths.
pub fn equals(a: &str, b: &str) -> bool {
    a == b
}

/// Case-insensitive equality over normalized paths.
pub fn iequals(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.to_lowercase() == b.to_lowercase()
}

/// True if `parent` is an ancestor directory of `child`.
///
/// Requires a `/` boundary: `"art"` is an ancestor of `"art/hero.png"` but
/// not of `"artwork.png"`. The root sentinel `"."` is an ancestor of
/// everything except itself.
pub fn is_ancestor(parent: &str, child: &str) -> bool {
    if parent == ROOT_SCOPE {
        return child != ROOT_SCOPE;
    }
    child.len() > parent.len()
        && child.starts_with(parent)
        && child.as_bytes()[parent.len()] == b'/'
}

/// Case-insensitive ancestor test, for Windows-originated metadata.
pub fn is_iancestor(parent: &str, child: &str) -> bool {
    is_ancestor(&parent.to_lowercase(), &child.to_lowercase())
}

/// Converts a filesystem path relative to `base` into normalized engine form.
pub fn relative_to(base: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(base).unwrap_or(path);
    normalize(&rel.to_string_lossy())
}

fn is_absolute(unified: &str) -> bool {
    if unified.starts_with('/') {
        return true;
    }
    // Windows drive prefix (C:/...) or UNC remnant.
    let bytes = unified.as_bytes();
    bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic()
}

fn invalid(path: &str, reason: &str) -> DraftError {
    DraftError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}
