//! # Native Registry Backend
//!
//! Talks the OCI Distribution protocol directly through `oci-distribution`:
//!
//! - `GET /v2/<name>/manifests/<reference>` for manifests
//! - `HEAD /v2/<name>/manifests/<tag>` to learn a tag's digest
//! - `GET /v2/<name>/blobs/<digest>` for blobs
//!
//! ## Transport Security
//!
//! Registries default to HTTPS. Hosts listed as insecure are spoken to over
//! plain HTTP, and the run's [`WarningTracker`] emits one warning per
//! endpoint the first time it is used.
//!
//! ## Authentication
//!
//! Credentials are injected by the caller via [`NativeBackend::with_auth`];
//! this backend never discovers or prompts for them.
//!
//! ## Streaming
//!
//! Blobs are downloaded into a scratch file and then streamed into the
//! [`BlobStore`], which hashes them on the way in. Layer bytes are never
//! held in memory as a whole. Manifests are buffered and bounded by
//! [`MAX_MANIFEST_SIZE`].

use super::{DownloadBackend, MirrorError, store_file, store_manifest, try_mirrors};
use crate::constants::{FETCH_TIMEOUT, MANIFEST_ACCEPT_MEDIA_TYPES, MAX_MANIFEST_SIZE};
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::reference::{Reference, Source};
use crate::storage::{BlobRecord, BlobStore};
use crate::warnings::WarningTracker;
use async_trait::async_trait;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::manifest::OciDescriptor;
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference as OciReference, RegistryOperation};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Backend speaking the registry protocol in-process.
pub struct NativeBackend {
    /// The underlying OCI distribution client.
    client: Client,
    /// Credentials supplied by the caller.
    auth: RegistryAuth,
    /// Registries reached over plain HTTP.
    insecure_registries: Vec<String>,
    /// Bound on each attempt against one mirror.
    timeout: Duration,
    warnings: Arc<WarningTracker>,
}

impl NativeBackend {
    /// Creates a backend with anonymous auth.
    pub fn new(insecure_registries: Vec<String>, warnings: Arc<WarningTracker>) -> Self {
        let protocol = if insecure_registries.is_empty() {
            ClientProtocol::Https
        } else {
            ClientProtocol::HttpsExcept(insecure_registries.clone())
        };

        Self {
            client: Client::new(ClientConfig {
                protocol,
                ..Default::default()
            }),
            auth: RegistryAuth::Anonymous,
            insecure_registries,
            timeout: FETCH_TIMEOUT,
            warnings,
        }
    }

    /// Uses the given credentials for every registry.
    pub fn with_auth(mut self, auth: RegistryAuth) -> Self {
        self.auth = auth;
        self
    }

    /// Overrides the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Emits the plaintext warning if `registry` is reached over HTTP.
    fn note_transport(&self, registry: &str) {
        if self.insecure_registries.iter().any(|r| r == registry) {
            self.warnings.warn_unencrypted(&format!("http://{registry}"));
        }
    }

    /// Runs one network attempt under the configured timeout.
    async fn bounded<T, E: std::fmt::Display>(
        &self,
        operation: &str,
        fut: impl Future<Output = std::result::Result<T, E>>,
    ) -> std::result::Result<T, MirrorError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(MirrorError::Unavailable(e.to_string())),
            Err(_) => Err(MirrorError::Unavailable(format!(
                "{operation} timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

#[async_trait]
impl DownloadBackend for NativeBackend {
    fn name(&self) -> &str {
        "native"
    }

    async fn fetch_blob(
        &self,
        source: &Source,
        digest: &Digest,
        store: &BlobStore,
    ) -> Result<BlobRecord> {
        try_mirrors(source, &digest.to_string(), |registry| async move {
            self.note_transport(&registry);
            let reference = OciReference::with_digest(
                registry,
                source.repository().to_string(),
                digest.to_string(),
            );

            self.bounded(
                "registry auth",
                self.client
                    .auth(&reference, &self.auth, RegistryOperation::Pull),
            )
            .await?;

            let scratch = tempfile::NamedTempFile::new().map_err(Error::from)?;
            let mut out = tokio::fs::File::from_std(scratch.reopen().map_err(Error::from)?);

            let descriptor = OciDescriptor {
                digest: digest.to_string(),
                size: 0,
                media_type: String::new(),
                urls: None,
                annotations: None,
            };

            self.bounded(
                "blob download",
                self.client.pull_blob(&reference, &descriptor, &mut out),
            )
            .await?;
            out.flush().await.map_err(Error::from)?;
            drop(out);

            let file = scratch.reopen().map_err(Error::from)?;
            let record = store_file(store, digest, file).await?;
            debug!("Fetched blob {digest} via native backend");
            Ok::<_, MirrorError>(record)
        })
        .await
    }

    async fn fetch_manifest(
        &self,
        source: &Source,
        reference: &Reference,
        store: &BlobStore,
    ) -> Result<BlobRecord> {
        try_mirrors(source, &reference.to_string(), |registry| async move {
            self.note_transport(&registry);
            let oci_ref = oci_reference(&registry, source, reference);

            let (data, _) = self
                .bounded(
                    "manifest fetch",
                    self.client
                        .pull_manifest_raw(&oci_ref, &self.auth, &MANIFEST_ACCEPT_MEDIA_TYPES),
                )
                .await?;

            if data.len() > MAX_MANIFEST_SIZE {
                return Err(MirrorError::Fatal(Error::Serialization(format!(
                    "manifest {reference} is {} bytes, limit is {MAX_MANIFEST_SIZE}",
                    data.len()
                ))));
            }

            Ok::<_, MirrorError>(store_manifest(store, reference, data.to_vec())?)
        })
        .await
    }

    async fn resolve_tag(&self, source: &Source, tag: &str) -> Result<Digest> {
        let reference = Reference::Tag(tag.to_string());
        try_mirrors(source, tag, |registry| {
            let reference = &reference;
            async move {
                self.note_transport(&registry);
                let oci_ref = oci_reference(&registry, source, reference);
                let digest = self
                    .bounded(
                        "manifest digest lookup",
                        self.client.fetch_manifest_digest(&oci_ref, &self.auth),
                    )
                    .await?;
                digest
                    .parse::<Digest>()
                    .map_err(|e| MirrorError::Unavailable(e.to_string()))
            }
        })
        .await
    }
}

fn oci_reference(registry: &str, source: &Source, reference: &Reference) -> OciReference {
    let repository = source.repository().to_string();
    match reference {
        Reference::Tag(tag) => OciReference::with_tag(registry.to_string(), repository, tag.clone()),
        Reference::Digest(d) => {
            OciReference::with_digest(registry.to_string(), repository, d.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(tracker: &Arc<WarningTracker>) -> NativeBackend {
        NativeBackend::new(vec!["localhost:5000".to_string()], Arc::clone(tracker))
    }

    #[test]
    fn test_insecure_registry_warned_once() {
        let tracker = Arc::new(WarningTracker::new());
        let backend = backend(&tracker);

        backend.note_transport("localhost:5000");
        backend.note_transport("localhost:5000");
        backend.note_transport("registry.example.com");

        assert_eq!(tracker.emitted(), 1);
        // The key is the plain-HTTP endpoint.
        assert!(!tracker.warn_unencrypted("http://localhost:5000"));
    }

    #[test]
    fn test_secure_registries_never_warn() {
        let tracker = Arc::new(WarningTracker::new());
        let backend = NativeBackend::new(Vec::new(), Arc::clone(&tracker));

        backend.note_transport("localhost:5000");
        backend.note_transport("registry.example.com");

        assert_eq!(tracker.emitted(), 0);
    }

    #[test]
    fn test_oci_reference_keeps_registry_and_repository() {
        let source = Source::new("library/alpine", vec!["mirror.example.com".into()]).unwrap();
        let digest = Digest::of(b"manifest");

        let by_digest =
            oci_reference("mirror.example.com", &source, &Reference::Digest(digest.clone()));
        assert_eq!(by_digest.registry(), "mirror.example.com");
        assert_eq!(by_digest.repository(), "library/alpine");
        assert_eq!(by_digest.digest(), Some(digest.to_string().as_str()));

        let by_tag = oci_reference("mirror.example.com", &source, &Reference::Tag("3.20".into()));
        assert_eq!(by_tag.tag(), Some("3.20"));
    }

    #[tokio::test]
    async fn test_bounded_attempt_times_out_as_unavailable() {
        let tracker = Arc::new(WarningTracker::new());
        let backend = backend(&tracker).with_timeout(Duration::from_millis(20));

        let outcome = backend
            .bounded("blob download", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<(), String>(())
            })
            .await;

        match outcome {
            Err(MirrorError::Unavailable(reason)) => assert!(reason.contains("timed out")),
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bounded_attempt_error_is_unavailable() {
        let tracker = Arc::new(WarningTracker::new());
        let backend = backend(&tracker);

        let outcome = backend
            .bounded("manifest fetch", async { Err::<(), _>("503 Service Unavailable") })
            .await;

        assert!(matches!(outcome, Err(MirrorError::Unavailable(ref r)) if r.contains("503")));
    }
}
