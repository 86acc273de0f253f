//! # Content-Addressed Blob Storage
//!
//! Stores manifests, configs, and layers under their SHA-256 digest so that
//! every byte on disk can be re-checked against its own filename.
//!
//! ## Storage Model
//!
//! Blobs are stored flat under the algorithm directory:
//!
//! ```text
//! <root>/
//! └── sha256/
//!     ├── abcd1234...  (blob content)
//!     ├── cdef5678...  (blob content)
//!     └── .tmp-XXXXXX  (in-flight write, removed on failure)
//! ```
//!
//! ## Integrity Model
//!
//! ### Writes
//!
//! Every write hashes the exact bytes it stores. Writes that carry a claimed
//! digest ([`BlobStore::write_small_with_digest`], [`BlobStore::write_large`])
//! fail with [`Error::DigestMismatch`] before anything reaches the final path.
//!
//! If a blob already exists the write is skipped without re-validating the
//! existing file. Existing on-disk data is authoritative; corruption is
//! caught on read instead.
//!
//! ### Atomic Writes
//!
//! Content goes to a uniquely named temp file in the same directory, is
//! synced, then renamed onto the final path. Two writers of the same digest
//! write byte-identical content, so whichever rename lands last is harmless.
//! If the rename itself fails but the final path exists afterwards, another
//! writer won and the write is reported as successful.
//!
//! ### Reads
//!
//! [`BlobStore::read_small`] re-hashes the whole file. A blob whose content no
//! longer matches its name is deleted before the mismatch is returned, so the
//! next fetch re-downloads it.
//!
//! [`BlobStore::open`] hashes incrementally and only reports a mismatch on the
//! read that reaches end of stream. Bytes before that point are unvalidated;
//! see [`VerifyingReader`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use imgpull::{BlobStore, Digest};
//!
//! let store = BlobStore::open_at("/tmp/blobs".into())?;
//! let digest = store.write_small(b"hello world")?;
//! assert!(store.exists(&digest));
//! assert_eq!(store.read_small(&digest)?, b"hello world");
//! ```

use crate::constants::{BLOB_ALGORITHM_DIR, BLOB_STORE_DIR, TEMP_FILE_PREFIX};
use crate::digest::Digest;
use crate::error::{Error, Result};
use sha2::{Digest as _, Sha256};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A blob produced by a store or fetch operation.
///
/// `data` is only populated when the bytes were buffered anyway (manifests,
/// configs); streamed layers carry just their path.
#[derive(Debug, Clone)]
pub struct BlobRecord {
    pub digest: Digest,
    pub path: PathBuf,
    pub data: Option<Vec<u8>>,
}

/// Content-addressed blob store rooted at one directory.
///
/// ## Thread Safety
///
/// `BlobStore` holds no in-memory state besides its root. Concurrent
/// writers coordinate only through the existence pre-check and atomic
/// rename, so the store can be shared via `Arc` across tasks.
#[derive(Debug, Clone)]
pub struct BlobStore {
    /// Root directory; blobs live under `<root>/sha256/`.
    root: PathBuf,
}

impl BlobStore {
    /// Creates a store handle without touching the filesystem.
    ///
    /// Call [`BlobStore::init`] before writing.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Creates a store and ensures its layout exists.
    pub fn open_at(root: PathBuf) -> Result<Self> {
        let store = Self::new(root);
        store.init()?;
        Ok(store)
    }

    /// Returns the default root under the user cache directory.
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .map(|d| d.join("imgpull"))
            .unwrap_or_else(|| PathBuf::from(".imgpull"))
            .join(BLOB_STORE_DIR)
    }

    /// Ensures the directory layout exists. Idempotent.
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(self.algorithm_dir())?;
        info!("Blob store initialized at: {}", self.root.display());
        Ok(())
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn algorithm_dir(&self) -> PathBuf {
        self.root.join(BLOB_ALGORITHM_DIR)
    }

    /// Returns the expected path of a blob.
    ///
    /// No existence or validity guarantee. Meant for collaborators that need
    /// direct file access to blobs the pipeline has already stored.
    pub fn path(&self, digest: &Digest) -> PathBuf {
        self.root
            .join(digest.algorithm().as_str())
            .join(digest.hex())
    }

    /// Checks whether a blob file exists. Does not validate content.
    pub fn exists(&self, digest: &Digest) -> bool {
        self.path(digest).is_file()
    }

    /// Stores `data` under its computed digest and returns that digest.
    pub fn write_small(&self, data: &[u8]) -> Result<Digest> {
        let digest = Digest::of(data);
        if self.exists(&digest) {
            debug!("Blob {digest} already exists");
            return Ok(digest);
        }

        self.persist(&digest, |file| Ok(file.write_all(data)?))?;
        debug!("Stored blob {digest} ({} bytes)", data.len());
        Ok(digest)
    }

    /// Stores `data` under a caller-claimed digest.
    ///
    /// Succeeds without looking at `data` if the blob already exists.
    pub fn write_small_with_digest(&self, expected: &Digest, data: &[u8]) -> Result<()> {
        if self.exists(expected) {
            debug!("Blob {expected} already exists");
            return Ok(());
        }

        let actual = Digest::of(data);
        if &actual != expected {
            return Err(Error::DigestMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }

        self.persist(expected, |file| Ok(file.write_all(data)?))?;
        debug!("Stored blob {expected} ({} bytes, verified)", data.len());
        Ok(())
    }

    /// Streams `reader` into the store under `expected`, hashing as it goes.
    ///
    /// If the blob already exists the reader is still drained so a producer
    /// on the other end of a pipe is not cut off; a read error while draining
    /// is ignored and the write still succeeds. On a stream error or digest
    /// mismatch the temp file is removed and nothing lands at the final path.
    pub fn write_large<R: Read>(&self, expected: &Digest, mut reader: R) -> Result<u64> {
        if self.exists(expected) {
            debug!("Blob {expected} already exists, draining reader");
            if let Err(e) = io::copy(&mut reader, &mut io::sink()) {
                debug!("Ignoring drain error for existing blob {expected}: {e}");
            }
            return Ok(0);
        }

        let mut written = 0u64;
        self.persist(expected, |file| {
            let mut hasher = Sha256::new();
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                let n = match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                };
                hasher.update(&buf[..n]);
                file.write_all(&buf[..n])?;
                written += n as u64;
            }

            let actual = Digest::from_hasher(hasher);
            if &actual != expected {
                return Err(Error::DigestMismatch {
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
            Ok(())
        })?;

        debug!("Stored blob {expected} ({written} bytes, streamed)");
        Ok(written)
    }

    /// Reads a whole blob and re-validates it against its digest.
    ///
    /// A corrupted blob is deleted before [`Error::DigestMismatch`] is returned.
    pub fn read_small(&self, digest: &Digest) -> Result<Vec<u8>> {
        let path = self.path(digest);
        let data = fs::read(&path).map_err(|e| not_found_or_io(e, digest))?;

        let actual = Digest::of(&data);
        if &actual != digest {
            warn!("Removing corrupted blob {}", path.display());
            let _ = fs::remove_file(&path);
            return Err(Error::DigestMismatch {
                expected: digest.to_string(),
                actual: actual.to_string(),
            });
        }

        Ok(data)
    }

    /// Opens a blob as a stream that validates at end of stream.
    pub fn open(&self, digest: &Digest) -> Result<VerifyingReader> {
        let path = self.path(digest);
        let file = File::open(&path).map_err(|e| not_found_or_io(e, digest))?;
        Ok(VerifyingReader {
            file,
            path,
            expected: digest.clone(),
            hasher: Some(Sha256::new()),
        })
    }

    /// Removes a blob if present.
    pub fn remove(&self, digest: &Digest) -> Result<()> {
        match fs::remove_file(self.path(digest)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes via `fill` into a temp file and renames it onto the blob path.
    ///
    /// Any error from `fill` drops the temp file, which removes it.
    fn persist(&self, digest: &Digest, fill: impl FnOnce(&mut File) -> Result<()>) -> Result<()> {
        let dir = self.algorithm_dir();
        fs::create_dir_all(&dir)?;

        let mut temp = tempfile::Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .tempfile_in(&dir)?;

        fill(temp.as_file_mut())?;
        temp.as_file().sync_all()?;

        let path = self.path(digest);
        if let Err(e) = temp.persist(&path) {
            if self.exists(digest) {
                debug!("Lost rename race for {digest}, blob already present");
                return Ok(());
            }
            return Err(e.error.into());
        }
        Ok(())
    }
}

fn not_found_or_io(e: io::Error, digest: &Digest) -> Error {
    if e.kind() == io::ErrorKind::NotFound {
        Error::NotFound {
            digest: digest.to_string(),
        }
    } else {
        e.into()
    }
}

/// Reader over a stored blob that hashes every byte it hands out.
///
/// Validation happens only when the underlying file reaches end of stream:
/// that read returns an `io::Error` of kind `InvalidData` wrapping
/// [`Error::DigestMismatch`] (convert it back with `Error::from`), and the
/// corrupted blob is deleted. Callers that forward bytes before EOF must be
/// prepared to discard them on that late error.
#[derive(Debug)]
pub struct VerifyingReader {
    file: File,
    path: PathBuf,
    expected: Digest,
    /// `None` once end of stream has been validated.
    hasher: Option<Sha256>,
}

impl VerifyingReader {
    /// Digest the stream is validated against.
    pub fn digest(&self) -> &Digest {
        &self.expected
    }
}

impl Read for VerifyingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read(buf)?;
        if n > 0 {
            if let Some(hasher) = self.hasher.as_mut() {
                hasher.update(&buf[..n]);
            }
            return Ok(n);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        if let Some(hasher) = self.hasher.take() {
            let actual = Digest::from_hasher(hasher);
            if actual != self.expected {
                warn!("Removing corrupted blob {}", self.path.display());
                let _ = fs::remove_file(&self.path);
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    Error::DigestMismatch {
                        expected: self.expected.to_string(),
                        actual: actual.to_string(),
                    },
                ));
            }
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_blob_store_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = BlobStore::open_at(temp.path().to_path_buf()).unwrap();

        let digest = store.write_small(b"hello world").unwrap();
        assert!(store.exists(&digest));
        assert_eq!(store.read_small(&digest).unwrap(), b"hello world");

        store.remove(&digest).unwrap();
        assert!(!store.exists(&digest));
    }

    #[test]
    fn test_blob_path_structure() {
        let store = BlobStore::new(PathBuf::from("/blobs"));
        let digest = Digest::of(b"x");

        let path = store.path(&digest);
        assert_eq!(path, PathBuf::from("/blobs/sha256").join(digest.hex()));
    }

    #[test]
    fn test_no_temp_files_left_after_mismatch() {
        let temp = TempDir::new().unwrap();
        let store = BlobStore::open_at(temp.path().to_path_buf()).unwrap();

        let wrong = Digest::of(b"something else");
        let err = store.write_large(&wrong, &b"actual"[..]).unwrap_err();
        assert!(err.is_digest_mismatch());

        let leftovers: Vec<_> = fs::read_dir(temp.path().join("sha256")).unwrap().collect();
        assert!(leftovers.is_empty(), "temp file should be cleaned up");
    }
}
