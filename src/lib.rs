//! # imgpull
//!
//! **Content-Addressed Blob Store and Multi-Mirror Image Fetch Pipeline**
//!
//! This crate fetches container-image content by digest from one or more
//! registry mirrors and stores it on disk under its SHA-256 name,
//! reproducing the layered structure of an OCI/Docker image
//! (index → manifests → configs → layers).
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                             imgpull                                 │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ReferenceResolver   (tag, digest) → pinned Reference               │
//! │          │                                                          │
//! │  ManifestGraphWalker  index → manifests → configs → layer set       │
//! │          │                                                          │
//! │  LayerMaterializer    shallow │ eager │ lazy                        │
//! │          │                                                          │
//! │  ┌───────┴────────────────────────────────────────────────────┐     │
//! │  │                  FetchCoordinator                          │     │
//! │  │   store short-circuit │ concurrent fail-fast batches       │     │
//! │  └───────┬────────────────────────────────────────────────────┘     │
//! │          │                                                          │
//! │  ┌───────┴──────────┐  ┌────────────────────┐                       │
//! │  │  NativeBackend   │  │ ExternalToolBackend│   DownloadBackend     │
//! │  │ (OCI dist. HTTP) │  │   (subprocess)     │                       │
//! │  └───────┬──────────┘  └─────────┬──────────┘                       │
//! ├──────────┴───────────────────────┴──────────────────────────────────┤
//! │                 BlobStore  <root>/sha256/<hex>                      │
//! │   digest-validated writes │ atomic rename │ self-healing reads      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Integrity Model
//!
//! - A [`Digest`] is only ever trusted if it is the key the store wrote a
//!   file under, or if it was recomputed on read.
//! - Digest-qualified fetches never return content whose hash differs from
//!   the request; the write fails with [`Error::DigestMismatch`].
//! - Corrupt blobs found on read are deleted before the error is returned.
//! - Blob writes go through a temp file and atomic rename, so a crash never
//!   leaves a partial blob at a final path.
//!
//! # Out of Scope
//!
//! Registry authentication flows (credentials are injected), layer
//! compression, image building, pushing, and OCI-layout writing are left to
//! collaborators that consume this crate's outputs.
//!
//! # Example
//!
//! ```rust,ignore
//! use imgpull::{LayerPolicy, PullConfig, Puller, Source, WarningTracker};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> imgpull::Result<()> {
//!     let config = PullConfig::default();
//!     let source = Source::new("library/alpine", vec!["docker.io".into()])?;
//!     let puller = Puller::from_config(&config, source, Arc::new(WarningTracker::new()))?;
//!
//!     let outcome = puller
//!         .pull(None, Some("sha256:..."), LayerPolicy::Eager)
//!         .await?;
//!     println!("{} layers, platforms {:?}", outcome.result.layers.len(), outcome.result.platform_strings());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod constants;
pub mod digest;
pub mod error;
pub mod fetch;
pub mod image;
pub mod manifest;
pub mod materialize;
pub mod platform;
pub mod reference;
pub mod resolve;
pub mod storage;
pub mod warnings;

// Re-exports
pub use backend::{DownloadBackend, ExternalToolBackend, NativeBackend};
pub use config::{BackendKind, PullConfig};
pub use digest::{Algorithm, Digest};
pub use error::{Error, Result};
pub use fetch::FetchCoordinator;
pub use image::{PullOutcome, Puller};
pub use manifest::{ManifestGraphWalker, ManifestNode, MediaKind, PullResult};
pub use materialize::{DeferredFetch, LayerMaterializer, LayerPolicy, MaterializedLayers};
pub use platform::{Arch, Os, Platform, PlatformSpec};
pub use reference::{Reference, Source};
pub use resolve::{ReferenceResolver, ResolutionPlan};
pub use storage::{BlobRecord, BlobStore, VerifyingReader};
pub use warnings::WarningTracker;
