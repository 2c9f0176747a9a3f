//! # Error Types
//!
//! Defines the structured error taxonomy for the draft engine using `thiserror`.
//! Each variant carries enough context to diagnose the failure without the
//! caller having to parse message strings: version ids, paths, blob hashes,
//! and OS error codes travel as fields.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Top-level error type encompassing all failure modes in the draft engine.
#[derive(Error, Debug)]
pub enum DraftError {
    // ─── NotFound ───────────────────────────────────────────────────────
    #[error("version not found: {0}")]
    VersionNotFound(String),

    #[error("file '{path}' not found in version {version_id}")]
    FileNotFoundInVersion { version_id: String, path: String },

    #[error("blob missing from object store: {0}")]
    MissingBlob(String),

    #[error("snapshot scope no longer exists on disk: {0}")]
    ScopeNotFound(String),

    #[error("no repository found for {0}")]
    RepoNotFound(PathBuf),

    // ─── InvalidInput ───────────────────────────────────────────────────
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("label must not be empty")]
    EmptyLabel,

    #[error("corrupt manifest {id}: {source}")]
    CorruptManifest {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("corrupt repository index: {source}")]
    CorruptIndex {
        #[source]
        source: serde_json::Error,
    },

    #[error("rename chain for '{path}' exceeds {limit} hops (cycle in metadata?)")]
    RenameChainTooLong { path: String, limit: usize },

    #[error("file identity {fid} resolves to multiple live paths: {paths:?}")]
    AmbiguousFid { fid: Uuid, paths: Vec<String> },

    // ─── Retriable ──────────────────────────────────────────────────────
    #[error("destination busy (held by another process): {path} (os error {os_code})")]
    DestinationBusy { path: PathBuf, os_code: i32 },

    #[error("repository is busy with another operation")]
    RepoBusy,

    // ─── Integrity ──────────────────────────────────────────────────────
    #[error("integrity error for blob {hash}: {detail}")]
    Integrity { hash: String, detail: String },

    // ─── Control flow ───────────────────────────────────────────────────
    #[error("operation cancelled")]
    Cancelled,

    // ─── Unclassified ───────────────────────────────────────────────────
    #[error("io error at {path}: {source}")]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DraftError {
    /// Wraps an `io::Error` with the path it occurred at.
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DraftError::IoAt {
            path: path.into(),
            source,
        }
    }

    /// True for errors the caller may meaningfully retry; retry policy
    /// belongs to callers, not the engine.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            DraftError::DestinationBusy { .. } | DraftError::RepoBusy
        )
    }
}

pub type Result<T> = std::result::Result<T, DraftError>;
