//! # Object Store
//!
//! Content-addressable storage for immutable blobs. A blob's address is the
//! SHA-256 of its raw bytes; identical content is stored exactly once no
//! matter how many paths or versions reference it.
//!
//! Blobs are brotli-compressed at a fixed quality; that quality is part of
//! the on-disk format. Whether a given blob is compressed is recorded in its
//! `ObjectRecord`, never re-decided at extraction time; repositories created
//! before compression landed carry raw blobs with `isCompressed: false`.
//!
//! Reference counts are *not* touched by ingest. They change only with
//! manifest creation and deletion, which keeps the accounting invariant
//! simple: refCount equals the number of live (manifest × path-entry)
//! references.

use crate::error::{DraftError, Result};
use crate::hashing::{self, BUF_SIZE};
use crate::index::{ObjectRecord, RepositoryIndex};
use crate::repo::{self, RepoLayout};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Fixed brotli quality for all newly stored blobs.
pub const BROTLI_QUALITY: u32 = 5;

/// Fixed brotli window size (log2).
pub const BROTLI_LGWIN: u32 = 22;

/// Result of ingesting one file into the store.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Content hash (lowercase hex SHA-256).
    pub hash: String,

    /// Original (uncompressed) size in bytes.
    pub size: u64,

    /// On-disk size of the stored blob.
    pub stored_size: u64,

    /// True if the blob was already present and no bytes were written.
    pub deduplicated: bool,
}

/// Filesystem location of a blob.
pub fn blob_path(layout: &RepoLayout, hash: &str) -> PathBuf {
    layout.objects_dir().join(hash)
}

/// Stores a file's content, returning its hash and sizes.
///
/// Streams the file twice at most: once through the digest, and, only when
/// the content is new, once through the compressor into a temporary file
/// that is renamed into place. Re-ingesting known content is a hash plus a
/// stat.
pub fn ingest(layout: &RepoLayout, file_path: &Path) -> Result<IngestOutcome> {
    let hash = hashing::hash_file(file_path)?;
    let size = fs::metadata(file_path)
        .map_err(|e| DraftError::io_at(file_path, e))?
        .len();

    let dest = blob_path(layout, &hash);
    if dest.exists() {
        let stored_size = fs::metadata(&dest)
            .map_err(|e| DraftError::io_at(&dest, e))?
            .len();
        return Ok(IngestOutcome {
            hash,
            size,
            stored_size,
            deduplicated: true,
        });
    }

    let tmp = repo::temp_sibling(&dest);
    let write_result = compress_into(file_path, &tmp);
    if let Err(e) = write_result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    repo::rename_replacing(&tmp, &dest)?;

    let stored_size = fs::metadata(&dest)
        .map_err(|e| DraftError::io_at(&dest, e))?
        .len();

    log::debug!(
        "stored blob {} ({} -> {} bytes)",
        hashing::short_hash(&hash, 12),
        size,
        stored_size
    );

    Ok(IngestOutcome {
        hash,
        size,
        stored_size,
        deduplicated: false,
    })
}

fn compress_into(source: &Path, tmp: &Path) -> Result<()> {
    let mut input = File::open(source).map_err(|e| DraftError::io_at(source, e))?;
    let out = File::create(tmp).map_err(|e| DraftError::io_at(tmp, e))?;
    let mut encoder =
        brotli::CompressorWriter::new(out, BUF_SIZE, BROTLI_QUALITY, BROTLI_LGWIN);

    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = input.read(&mut buf).map_err(|e| DraftError::io_at(source, e))?;
        if n == 0 {
            break;
        }
        encoder
            .write_all(&buf[..n])
            .map_err(|e| DraftError::io_at(tmp, e))?;
    }
    encoder.flush().map_err(|e| DraftError::io_at(tmp, e))?;
    Ok(())
}

/// Materializes a blob at `dest_path`, decompressing unless the record says
/// the blob was stored raw.
///
/// Writes to a temporary sibling and renames, so the destination is either
/// absent, its previous content, or fully written, never truncated. A
/// destination held open by another process surfaces as the retriable
/// `DestinationBusy`.
pub fn extract(
    layout: &RepoLayout,
    hash: &str,
    dest_path: &Path,
    is_compressed: bool,
) -> Result<()> {
    let source = blob_path(layout, hash);
    if !source.exists() {
        return Err(DraftError::MissingBlob(hash.to_string()));
    }

    if let Some(parent) = dest_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| DraftError::io_at(parent, e))?;
        }
    }

    let tmp = repo::temp_sibling(dest_path);
    let result = write_decoded(&source, &tmp, is_compressed)
        .and_then(|()| match fs::rename(&tmp, dest_path) {
            Ok(()) => Ok(()),
            Err(_) if dest_path.exists() => {
                // Replace-over-existing: remove then retry once.
                fs::remove_file(dest_path).map_err(|e| busy_or_io(dest_path, e))?;
                fs::rename(&tmp, dest_path).map_err(|e| busy_or_io(dest_path, e))
            }
            Err(e) => Err(busy_or_io(dest_path, e)),
        });

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_decoded(source: &Path, tmp: &Path, is_compressed: bool) -> Result<()> {
    let input = File::open(source).map_err(|e| DraftError::io_at(source, e))?;
    let mut out = File::create(tmp).map_err(|e| DraftError::io_at(tmp, e))?;

    if is_compressed {
        let mut decoder = brotli::Decompressor::new(input, BUF_SIZE);
        io::copy(&mut decoder, &mut out).map_err(|e| DraftError::io_at(tmp, e))?;
    } else {
        let mut raw = input;
        io::copy(&mut raw, &mut out).map_err(|e| DraftError::io_at(tmp, e))?;
    }
    out.flush().map_err(|e| DraftError::io_at(tmp, e))?;
    Ok(())
}

/// Classifies sharing-violation style failures as the retriable
/// `DestinationBusy`; everything else stays an io error.
fn busy_or_io(path: &Path, e: io::Error) -> DraftError {
    // EBUSY/ETXTBSY on Unix; ERROR_SHARING_VIOLATION (32) and
    // ERROR_LOCK_VIOLATION (33) on Windows. PermissionDenied covers the
    // EPERM-style refusals editors produce while holding a file open.
    let busy = match e.raw_os_error() {
        Some(code) => {
            matches!(code, 16 | 26) || (cfg!(windows) && matches!(code, 5 | 32 | 33))
        }
        None => false,
    } || e.kind() == io::ErrorKind::PermissionDenied;

    if busy {
        DraftError::DestinationBusy {
            path: path.to_path_buf(),
            os_code: e.raw_os_error().unwrap_or(0),
        }
    } else {
        DraftError::io_at(path, e)
    }
}

// ─── Refcount accounting ────────────────────────────────────────────────────
// Called by the snapshot engine and the garbage collector, never by ingest.

/// Creates or increments the record for `hash`. One call per path entry in
/// a manifest: a hash referenced N times in one manifest counts N.
pub fn add_ref(
    index: &mut RepositoryIndex,
    hash: &str,
    size: u64,
    stored_size: u64,
    is_compressed: bool,
    first_seen_path: &str,
) {
    match index.objects.get_mut(hash) {
        Some(record) => record.ref_count += 1,
        None => {
            index.objects.insert(
                hash.to_string(),
                ObjectRecord {
                    size,
                    compressed_size: stored_size,
                    is_compressed,
                    ref_count: 1,
                    first_seen_path: first_seen_path.to_string(),
                    extra: BTreeMap::new(),
                },
            );
        }
    }
}

/// Decrements the record for `hash`; at zero the blob file is unlinked and
/// the record dropped. Returns true when the blob was reclaimed.
pub fn release(layout: &RepoLayout, index: &mut RepositoryIndex, hash: &str) -> Result<bool> {
    let Some(record) = index.objects.get_mut(hash) else {
        log::warn!("release of untracked blob {}", hashing::short_hash(hash, 12));
        return Ok(false);
    };

    record.ref_count = record.ref_count.saturating_sub(1);
    if record.ref_count > 0 {
        return Ok(false);
    }

    index.objects.remove(hash);
    let path = blob_path(layout, hash);
    match fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(DraftError::io_at(&path, e)),
    }

    log::debug!("reclaimed blob {}", hashing::short_hash(hash, 12));
    Ok(true)
}
