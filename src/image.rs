//! # Image Pulling Facade
//!
//! [`Puller`] runs the whole pipeline for one source:
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐   ┌────────────────────┐   ┌───────────────────┐
//! │ ReferenceResolver│──►│ FetchCoordinator │──►│ ManifestGraphWalker│──►│ LayerMaterializer │
//! │  tag/digest      │   │  root manifest   │   │  children, configs │   │  shallow/eager/   │
//! │  → reference     │   │                  │   │  → PullResult      │   │  lazy             │
//! └──────────────────┘   └──────────────────┘   └────────────────────┘   └───────────────────┘
//!                                  │ every byte lands in
//!                                  ▼
//!                             BlobStore (validated)
//! ```
//!
//! A pull either resolves the full manifest graph plus the layers its policy
//! asks for, or fails; there is no partially pulled image state.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use imgpull::{PullConfig, Puller, Source, WarningTracker};
//! use std::sync::Arc;
//!
//! let config = PullConfig::from_json(r#"{"layer_policy": "eager"}"#)?;
//! let source = Source::new("library/alpine", vec!["docker.io".into()])?;
//! let puller = Puller::from_config(&config, source, Arc::new(WarningTracker::new()))?;
//!
//! let outcome = puller.pull(Some("3.20"), Some(pinned_digest), config.layer_policy).await?;
//! for (digest, path) in outcome.blob_paths() {
//!     println!("{digest} -> {}", path.display());
//! }
//! ```

use crate::config::PullConfig;
use crate::digest::Digest;
use crate::error::Result;
use crate::fetch::FetchCoordinator;
use crate::manifest::{ManifestGraphWalker, PullResult};
use crate::materialize::{LayerMaterializer, LayerPolicy, MaterializedLayers};
use crate::reference::{Reference, Source};
use crate::resolve::ReferenceResolver;
use crate::storage::BlobStore;
use crate::warnings::WarningTracker;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Result of a full pull.
#[derive(Debug, Clone)]
pub struct PullOutcome {
    /// Reference every fetch used.
    pub reference: Reference,
    pub result: PullResult,
    pub layers: MaterializedLayers,
    store: Arc<BlobStore>,
}

impl PullOutcome {
    /// Digest → path for every object present locally: manifests, configs,
    /// and whichever layers the policy downloaded.
    pub fn blob_paths(&self) -> BTreeMap<Digest, PathBuf> {
        let mut paths = self.result.descriptor_paths(&self.store);
        paths.extend(
            self.layers
                .local
                .iter()
                .map(|(d, p)| (d.clone(), p.clone())),
        );
        paths
    }
}

/// End-to-end pipeline for one source.
pub struct Puller {
    coordinator: FetchCoordinator,
    warnings: Arc<WarningTracker>,
    allow_tag_only: bool,
}

impl Puller {
    pub fn new(coordinator: FetchCoordinator, warnings: Arc<WarningTracker>) -> Self {
        Self {
            coordinator,
            warnings,
            allow_tag_only: false,
        }
    }

    /// Accepts tag-only input, learning the digest at pull time.
    pub fn allow_tag_only(mut self, allow: bool) -> Self {
        self.allow_tag_only = allow;
        self
    }

    /// Builds store, backend, and coordinator from configuration.
    pub fn from_config(
        config: &PullConfig,
        source: Source,
        warnings: Arc<WarningTracker>,
    ) -> Result<Self> {
        let store = Arc::new(BlobStore::open_at(config.blob_root())?);
        let backend = config.build_backend(Arc::clone(&warnings));
        let coordinator = FetchCoordinator::new(backend, store, source)
            .with_max_concurrent(config.max_concurrent_fetches);
        Ok(Self::new(coordinator, warnings).allow_tag_only(config.allow_tag_only))
    }

    pub fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    /// Resolves, walks, and materializes one image.
    pub async fn pull(
        &self,
        tag: Option<&str>,
        digest: Option<&str>,
        policy: LayerPolicy,
    ) -> Result<PullOutcome> {
        let resolver = ReferenceResolver::new(&self.coordinator, Arc::clone(&self.warnings));
        let reference = resolver.resolve(tag, digest, self.allow_tag_only).await?;
        info!(
            "Pulling {}@{reference} ({policy})",
            self.coordinator.source().repository()
        );

        let result = ManifestGraphWalker::new(&self.coordinator)
            .walk(&reference)
            .await?;
        let layers = LayerMaterializer::new(&self.coordinator)
            .materialize(&result.layers, policy)
            .await?;

        Ok(PullOutcome {
            reference,
            result,
            layers,
            store: Arc::clone(self.coordinator.store()),
        })
    }
}
