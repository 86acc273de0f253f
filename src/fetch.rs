//! # Fetch Coordination
//!
//! [`FetchCoordinator`] sits between the pipeline and a [`DownloadBackend`]:
//!
//! 1. **Short-circuit**: a digest-qualified fetch first checks
//!    [`BlobStore::exists`]. Blobs already on disk are used as-is and no
//!    network attempt is made.
//! 2. **Batches**: independent blob fetches are all submitted up front and
//!    joined once. The first failure aborts the remaining in-flight fetches
//!    and fails the whole batch; no partial set is returned.
//!
//! ## Concurrency
//!
//! Batch fan-out runs on a [`JoinSet`] with at most `max_concurrent` fetches
//! in flight (bounded by a [`Semaphore`]). Aborted fetches drop their
//! scratch files and subprocesses, and the store never exposes a half-written
//! blob, so cancellation leaves no garbage behind.

use crate::backend::DownloadBackend;
use crate::constants::MAX_CONCURRENT_FETCHES;
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::reference::{Reference, Source};
use crate::storage::{BlobRecord, BlobStore};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Store-aware wrapper around a download backend for one source.
#[derive(Clone)]
pub struct FetchCoordinator {
    backend: Arc<dyn DownloadBackend>,
    store: Arc<BlobStore>,
    source: Source,
    max_concurrent: usize,
}

impl FetchCoordinator {
    pub fn new(backend: Arc<dyn DownloadBackend>, store: Arc<BlobStore>, source: Source) -> Self {
        Self {
            backend,
            store,
            source,
            max_concurrent: MAX_CONCURRENT_FETCHES,
        }
    }

    /// Limits how many blob fetches a batch keeps in flight.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Returns a coordinator sharing backend and store but fetching from
    /// another source.
    pub fn for_source(&self, source: Source) -> Self {
        Self {
            source,
            ..self.clone()
        }
    }

    pub fn store(&self) -> &Arc<BlobStore> {
        &self.store
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Fetches a manifest. Digest references are served from the store when
    /// present; tags always go to the network.
    pub async fn fetch_manifest(&self, reference: &Reference) -> Result<BlobRecord> {
        if let Reference::Digest(digest) = reference
            && self.store.exists(digest)
        {
            debug!("Manifest {digest} already cached");
            return self.read_cached(digest);
        }

        self.backend
            .fetch_manifest(&self.source, reference, &self.store)
            .await
    }

    /// Fetches a small blob (config) and returns it with its bytes.
    pub async fn fetch_small_blob(&self, digest: &Digest) -> Result<BlobRecord> {
        if !self.store.exists(digest) {
            self.backend
                .fetch_blob(&self.source, digest, &self.store)
                .await?;
        } else {
            debug!("Blob {digest} already cached");
        }
        self.read_cached(digest)
    }

    /// Fetches one blob, leaving its bytes on disk only.
    pub async fn fetch_blob(&self, digest: &Digest) -> Result<BlobRecord> {
        fetch_one(&*self.backend, &self.store, &self.source, digest).await
    }

    /// Learns the digest a tag currently resolves to.
    pub async fn resolve_tag(&self, tag: &str) -> Result<Digest> {
        self.backend.resolve_tag(&self.source, tag).await
    }

    /// Fetches a set of independent blobs concurrently, all or nothing.
    ///
    /// Duplicate digests are fetched once. Results come back sorted by digest.
    pub async fn fetch_blobs<I>(&self, digests: I) -> Result<Vec<BlobRecord>>
    where
        I: IntoIterator<Item = Digest>,
    {
        let unique: BTreeSet<Digest> = digests.into_iter().collect();
        if unique.is_empty() {
            return Ok(Vec::new());
        }

        info!(
            "Fetching {} blobs from {} via {} backend",
            unique.len(),
            self.source,
            self.backend.name()
        );

        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for digest in unique {
            let backend = Arc::clone(&self.backend);
            let store = Arc::clone(&self.store);
            let source = self.source.clone();
            let permits = Arc::clone(&permits);

            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::Internal(format!("fetch semaphore closed: {e}")))?;
                fetch_one(&*backend, &store, &source, &digest).await
            });
        }

        let mut records = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| Error::Internal(format!("fetch task failed: {e}")))
                .and_then(|r| r);
            match outcome {
                Ok(record) => records.push(record),
                Err(e) => {
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        records.sort_by(|a, b| a.digest.cmp(&b.digest));
        Ok(records)
    }

    fn read_cached(&self, digest: &Digest) -> Result<BlobRecord> {
        let data = self.store.read_small(digest)?;
        Ok(BlobRecord {
            digest: digest.clone(),
            path: self.store.path(digest),
            data: Some(data),
        })
    }
}

async fn fetch_one(
    backend: &dyn DownloadBackend,
    store: &BlobStore,
    source: &Source,
    digest: &Digest,
) -> Result<BlobRecord> {
    if store.exists(digest) {
        debug!("Blob {digest} already cached");
        return Ok(BlobRecord {
            digest: digest.clone(),
            path: store.path(digest),
            data: None,
        });
    }
    backend.fetch_blob(source, digest, store).await
}
