//! # draftvault
//!
//! A local-first, snapshot-based version control engine for creative
//! projects (art, 3D, game assets) where files are predominantly large
//! binaries that cannot be textually merged.
//!
//! A single working directory (the *project root*) is versioned by taking
//! atomic snapshots of either an explicit file set or a whole folder
//! subtree. Snapshots reference content by SHA-256 into a deduplicating,
//! brotli-compressed object store; history is navigable, restorable,
//! renameable, and garbage-collected by reference counting. A stable file
//! identity minted at first observation travels through history, so renames
//! neither break restore destinations nor hide a file's past versions.
//!
//! ## Architecture
//!
//! ```text
//!                      ┌─────────────┐
//!                      │ DraftEngine │   (typed API + per-repo lock)
//!                      └──────┬──────┘
//!            ┌────────────────┼────────────────┐
//!            ▼                ▼                ▼
//!       ┌──────────┐    ┌─────────┐      ┌──────────┐
//!       │ Snapshot │    │ Restore │      │ History  │
//!       └─────┬────┘    └────┬────┘      └────┬─────┘
//!             │              │                │
//!      ┌──────┴──────┬───────┴───────┬────────┘
//!      ▼             ▼               ▼
//! ┌─────────┐  ┌──────────┐   ┌───────────┐      ┌────┐
//! │ Objects │  │ Metadata │   │ Manifests │      │ GC │
//! │(SHA-256 │  │  (FIDs,  │   │ (versions)│      └─┬──┘
//! │+ brotli)│  │ renames) │   └─────┬─────┘        │
//! └────┬────┘  └─────┬────┘         │              │
//!      └─────────────┴──────────────┴──────────────┘
//!                          │
//!                          ▼
//!                  ┌───────────────┐
//!                  │ Repo (layout, │
//!                  │ atomic JSON,  │
//!                  │ advisory lock)│
//!                  └───────────────┘
//! ```
//!
//! Everything persistent lives under a hidden repository directory at the
//! *draft root*: the project root by default, or an out-of-tree location
//! recorded once per project. All JSON on disk is pretty-printed, newline
//! terminated, and preserves unknown fields across rewrites.
//!
//! Out of scope by design: distributed replication, merging of divergent
//! histories, textual diffs, network transport, access control, and
//! encryption at rest.

pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod gc;
pub mod hashing;
pub mod history;
pub mod index;
pub mod manifests;
pub mod metadata;
pub mod objects;
pub mod paths;
pub mod repo;
pub mod restore;
pub mod snapshot;
pub mod version;

pub use cancel::CancelToken;
pub use engine::DraftEngine;
pub use error::{DraftError, Result};
pub use gc::{GcOutcome, IntegrityIssue, IntegrityReport};
pub use history::{ObjectReportRow, StorageReport, VersionDiff, VersionSummary};
pub use index::{ObjectRecord, RepositoryIndex};
pub use manifests::VersionManifest;
pub use metadata::{MetadataPatch, MetadataRecord, TaskItem};
pub use restore::RestoreReport;
pub use snapshot::SnapshotOutcome;
