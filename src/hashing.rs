//! # Content Hashing
//!
//! SHA-256 is the content digest for the object store: two blobs with the
//! same hash are, by construction, identical, which is what makes the store
//! content-addressable and deduplicating. Hashes travel as lowercase hex
//! strings because they double as filenames under `objects/`.
//!
//! The same digest (over UTF-8 path bytes, not file contents) derives the
//! sidecar filename for per-path metadata records. The two uses never mix:
//! one keys blobs, the other keys sidecar files.

use crate::error::{DraftError, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Size of the read buffer for streaming hash computation (64 KiB).
///
/// Chosen to balance syscall overhead against memory usage. Larger buffers
/// provide diminishing returns on modern kernels with readahead.
pub const BUF_SIZE: usize = 64 * 1024;

/// Computes the SHA-256 hash of a file's contents, returning a hex string.
///
/// Uses streaming reads to handle arbitrarily large files without loading
/// the entire contents into memory.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| DraftError::io_at(path, e))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];

    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| DraftError::io_at(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(to_hex(&hasher.finalize()))
}

/// Computes the SHA-256 hash of in-memory data.
pub fn hash_bytes(data: &[u8]) -> String {
    to_hex(&Sha256::digest(data))
}

/// Derives the sidecar filename stem for a normalized path.
///
/// Purely a filename derivation; unrelated to content hashes. The record
/// stored inside the sidecar carries the path in cleartext, so the file
/// stays self-describing even if this derivation ever changes.
pub fn hash_path(normalized_path: &str) -> String {
    hash_bytes(normalized_path.as_bytes())
}

/// Returns the first `n` characters of a hash for display purposes.
pub fn short_hash(hash: &str, n: usize) -> &str {
    &hash[..n.min(hash.len())]
}

fn to_hex(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn hash_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.bin");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"hello world").unwrap();
        drop(f);

        let h1 = hash_file(&path).unwrap();
        let h2 = hash_file(&path).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn file_and_bytes_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agree.bin");
        std::fs::write(&path, b"identical content").unwrap();
        assert_eq!(hash_file(&path).unwrap(), hash_bytes(b"identical content"));
    }

    #[test]
    fn known_vector() {
        // SHA-256 of the empty string.
        assert_eq!(
            hash_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn path_hash_is_stable_and_distinct() {
        let a = hash_path("art/hero.png");
        assert_eq!(a, hash_path("art/hero.png"));
        assert_ne!(a, hash_path("art/Hero.png"));
    }

    #[test]
    fn short_hash_truncates() {
        let hash = "abcdefghij";
        assert_eq!(short_hash(hash, 4), "abcd");
        assert_eq!(short_hash(hash, 99), hash);
    }
}
