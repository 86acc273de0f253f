//! Download backends.
//!
//! A [`DownloadBackend`] moves bytes from a registry mirror into the
//! [`BlobStore`]. Two implementations exist and are selected by
//! configuration, never by branching in callers:
//!
//! | Backend | Transport | Mirror fallback |
//! |---------|-----------|-----------------|
//! | [`NativeBackend`] | OCI distribution protocol over HTTP(S) | in-process, per registry |
//! | [`ExternalToolBackend`] | helper subprocess | delegated to the helper, in the given order |
//!
//! ## Contract
//!
//! - Registries are tried in `Source` order; the first success wins.
//! - If every mirror fails, the error is [`Error::NetworkFailure`] carrying
//!   one entry per attempt.
//! - A digest-qualified fetch never returns content whose hash differs from
//!   the requested digest: the write into the store fails with
//!   [`Error::DigestMismatch`] and nothing is kept. A mismatch is not retried
//!   against the next mirror.

pub mod external;
pub mod native;

pub use self::external::ExternalToolBackend;
pub use self::native::NativeBackend;

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::reference::{Reference, Source};
use crate::storage::{BlobRecord, BlobStore};
use async_trait::async_trait;
use std::future::Future;
use tracing::{debug, warn};

/// Uniform fetch contract over both transports.
#[async_trait]
pub trait DownloadBackend: Send + Sync {
    /// Returns the backend name (for logs).
    fn name(&self) -> &str;

    /// Fetches a blob by digest into `store`.
    ///
    /// The returned record carries no in-memory bytes.
    async fn fetch_blob(
        &self,
        source: &Source,
        digest: &Digest,
        store: &BlobStore,
    ) -> Result<BlobRecord>;

    /// Fetches a manifest by tag or digest into `store`.
    ///
    /// For a tag, the digest is learned by hashing the returned bytes. The
    /// returned record always carries the manifest bytes.
    async fn fetch_manifest(
        &self,
        source: &Source,
        reference: &Reference,
        store: &BlobStore,
    ) -> Result<BlobRecord>;

    /// Learns the digest a tag currently points at without storing anything.
    async fn resolve_tag(&self, source: &Source, tag: &str) -> Result<Digest>;
}

/// Outcome of one attempt against one mirror.
#[derive(Debug)]
pub(crate) enum MirrorError {
    /// The mirror could not serve the object; try the next one.
    Unavailable(String),
    /// The operation must stop (integrity or local failure).
    Fatal(Error),
}

impl From<Error> for MirrorError {
    fn from(e: Error) -> Self {
        Self::Fatal(e)
    }
}

/// Runs `attempt` against each registry in order until one succeeds.
pub(crate) async fn try_mirrors<T, F, Fut>(source: &Source, target: &str, mut attempt: F) -> Result<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = std::result::Result<T, MirrorError>>,
{
    let mut attempts = Vec::with_capacity(source.registries().len());

    for registry in source.registries() {
        debug!("Fetching {target} from {registry}/{}", source.repository());
        match attempt(registry.clone()).await {
            Ok(value) => return Ok(value),
            Err(MirrorError::Unavailable(reason)) => {
                warn!("Mirror {registry} failed for {target}: {reason}");
                attempts.push(format!("{registry}: {reason}"));
            }
            Err(MirrorError::Fatal(e)) => return Err(e),
        }
    }

    Err(Error::NetworkFailure {
        target: format!("{}@{target}", source.repository()),
        attempts,
    })
}

/// Copies a downloaded file into the store off the async runtime.
pub(crate) async fn store_file(
    store: &BlobStore,
    digest: &Digest,
    file: std::fs::File,
) -> Result<BlobRecord> {
    let store = store.clone();
    let digest = digest.clone();
    tokio::task::spawn_blocking(move || {
        store.write_large(&digest, file)?;
        Ok(BlobRecord {
            path: store.path(&digest),
            digest,
            data: None,
        })
    })
    .await
    .map_err(|e| Error::Internal(format!("blob write task failed: {e}")))?
}

/// Stores manifest bytes, learning the digest when fetched by tag.
///
/// Digest-qualified bytes are checked even when the blob is already stored,
/// since the returned record hands them to the caller.
pub(crate) fn store_manifest(
    store: &BlobStore,
    reference: &Reference,
    data: Vec<u8>,
) -> Result<BlobRecord> {
    let digest = match reference {
        Reference::Digest(expected) => {
            let actual = Digest::of(&data);
            if &actual != expected {
                return Err(Error::DigestMismatch {
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
            store.write_small_with_digest(expected, &data)?;
            expected.clone()
        }
        Reference::Tag(_) => store.write_small(&data)?,
    };
    Ok(BlobRecord {
        path: store.path(&digest),
        digest,
        data: Some(data),
    })
}
