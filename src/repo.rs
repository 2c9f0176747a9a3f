//! # Repository Layout
//!
//! Creates, detects, and locks the on-disk repository. Every persistent
//! write in the system goes through the atomic JSON primitive defined here:
//! serialize to a temporary sibling file, then rename over the target.
//! Rename is atomic on POSIX (and effectively so on NTFS after the
//! remove-then-rename fallback), so a crash at any point leaves either the
//! old contents or the new contents, never a torn file.
//!
//! ## Layout
//!
//! ```text
//! <draftRoot>/
//! └── .draftvault/
//!     ├── objects/        (brotli-compressed blobs, named by content hash)
//!     ├── versions/       (one JSON manifest per snapshot)
//!     ├── metadata/       (per-path sidecar records, named by path hash)
//!     ├── attachments/    (opaque user attachments, named by content hash)
//!     ├── index.json      (object records + HEAD pointers)
//!     └── lock            (advisory lock file)
//! ```

use crate::config;
use crate::error::{DraftError, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Name of the hidden repository directory under the draft root.
pub const REPO_DIR: &str = ".draftvault";

const SUBDIRS: &[&str] = &["objects", "versions", "metadata", "attachments"];

/// Resolved filesystem locations for one repository.
#[derive(Debug, Clone)]
pub struct RepoLayout {
    project_root: PathBuf,
    repo_dir: PathBuf,
}

impl RepoLayout {
    /// Initializes (or re-opens) the repository for a project.
    ///
    /// `draft_root` defaults to the project root; an out-of-tree choice is
    /// recorded in the project's pointer file so later opens find it again.
    /// Creates the directory skeleton and an empty index if absent.
    pub fn init(project_root: &Path, draft_root: Option<&Path>) -> Result<Self> {
        let draft_root = match draft_root {
            Some(root) => root.to_path_buf(),
            None => match config::load(project_root)? {
                Some(cfg) => cfg.draft_root,
                None => project_root.to_path_buf(),
            },
        };

        if draft_root != project_root {
            config::save(project_root, &config::ProjectConfig::new(draft_root.clone()))?;
        }

        let repo_dir = draft_root.join(REPO_DIR);
        for sub in SUBDIRS {
            let dir = repo_dir.join(sub);
            fs::create_dir_all(&dir).map_err(|e| DraftError::io_at(&dir, e))?;
        }

        mark_hidden(&repo_dir);

        let layout = Self {
            project_root: project_root.to_path_buf(),
            repo_dir,
        };

        if !layout.index_path().exists() {
            crate::index::RepositoryIndex::default().save(&layout)?;
        }

        Ok(layout)
    }

    /// Opens an existing repository, following the project's pointer file
    /// if the draft root lives out of tree.
    pub fn open(project_root: &Path) -> Result<Self> {
        let draft_root = match config::load(project_root)? {
            Some(cfg) => cfg.draft_root,
            None => project_root.to_path_buf(),
        };

        let repo_dir = draft_root.join(REPO_DIR);
        if !repo_dir.is_dir() {
            return Err(DraftError::RepoNotFound(project_root.to_path_buf()));
        }

        Ok(Self {
            project_root: project_root.to_path_buf(),
            repo_dir,
        })
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.repo_dir.join("objects")
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.repo_dir.join("versions")
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.repo_dir.join("metadata")
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.repo_dir.join("attachments")
    }

    pub fn index_path(&self) -> PathBuf {
        self.repo_dir.join("index.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.repo_dir.join("lock")
    }

    /// True if `path` lies inside the repository directory. The working
    /// tree walk and scoped cleaning must never descend in here.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.repo_dir)
    }
}

/// Walks up from `start` looking for a repository marker (an in-tree repo
/// directory or a pointer file) and returns the containing project root.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start.to_path_buf()
    };

    loop {
        if current.join(REPO_DIR).is_dir() || current.join(config::CONFIG_FILE).is_file() {
            return Some(current);
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return None,
        }
    }
}

// ─── Atomic JSON ────────────────────────────────────────────────────────────

/// Serializes `value` as pretty-printed JSON (2-space indent, trailing
/// newline) and atomically replaces `path` with it.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value)
        .map_err(|e| anyhow::anyhow!("failed to serialize {}: {e}", path.display()))?;
    json.push('\n');

    let tmp = temp_sibling(path);
    fs::write(&tmp, &json).map_err(|e| DraftError::io_at(&tmp, e))?;
    rename_replacing(&tmp, path)
}

/// Reads a JSON file written by `write_json_atomic`. Unknown fields survive
/// round-trips because every persistent struct captures them.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| DraftError::io_at(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()).into())
}

/// Picks a temp file name in the same directory as `dest` so the final
/// rename never crosses a filesystem boundary.
pub fn temp_sibling(dest: &Path) -> PathBuf {
    let stem = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let nonce: u32 = rand::random();
    dest.with_file_name(format!("{stem}.tmp-{nonce:08x}"))
}

/// Renames `from` over `to`, tolerating the Windows quirk where rename
/// refuses to replace an existing file.
pub fn rename_replacing(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists || cfg!(windows) => {
            let _ = fs::remove_file(to);
            fs::rename(from, to).map_err(|e| DraftError::io_at(to, e))
        }
        Err(e) => {
            let _ = fs::remove_file(from);
            Err(DraftError::io_at(to, e))
        }
    }
}

// ─── Advisory lock ──────────────────────────────────────────────────────────

/// Holds the repository's advisory lock for the duration of an operation.
///
/// Mutations take the lock exclusively; read-only operations share it. On
/// contention the engine fails fast with `RepoBusy` rather than queueing;
/// retry policy is the caller's.
#[derive(Debug)]
pub struct RepoLock {
    file: File,
}

impl RepoLock {
    /// Acquires the exclusive (mutation) lock, or fails with `RepoBusy`.
    pub fn exclusive(layout: &RepoLayout) -> Result<Self> {
        let file = Self::open_lock_file(layout)?;
        file.try_lock_exclusive().map_err(|_| DraftError::RepoBusy)?;
        Ok(Self { file })
    }

    /// Acquires the shared (read) lock, or fails with `RepoBusy` if a
    /// mutation is in flight.
    pub fn shared(layout: &RepoLayout) -> Result<Self> {
        let file = Self::open_lock_file(layout)?;
        file.try_lock_shared().map_err(|_| DraftError::RepoBusy)?;
        Ok(Self { file })
    }

    fn open_lock_file(layout: &RepoLayout) -> Result<File> {
        let path = layout.lock_path();
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| DraftError::io_at(&path, e))
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// Marks the repository directory hidden on Windows. Best-effort; the repo
/// works fine without the attribute.
fn mark_hidden(repo_dir: &Path) {
    #[cfg(windows)]
    {
        let status = std::process::Command::new("attrib")
            .arg("+h")
            .arg(repo_dir)
            .status();
        if let Err(e) = status {
            log::debug!("could not hide {}: {e}", repo_dir.display());
        }
    }
    #[cfg(not(windows))]
    {
        // Dot-prefixed directories are already hidden on Unix.
        let _ = repo_dir;
    }
}
