//! # Layer Materialization
//!
//! Applies the layer policy to the de-duplicated layer set of a pull:
//!
//! | Policy    | Network I/O now | Result                                   |
//! |-----------|-----------------|------------------------------------------|
//! | `shallow` | none            | digests recorded as references only      |
//! | `eager`   | every layer     | all layers local in the blob store       |
//! | `lazy`    | none            | [`DeferredFetch`] items for a later run  |
//!
//! Deferred items are serializable so the collaborator can persist them and
//! hand them back to [`LayerMaterializer::run_deferred`] in a separate
//! invocation.

use crate::digest::Digest;
use crate::error::Result;
use crate::fetch::FetchCoordinator;
use crate::reference::Source;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use tracing::info;

/// When layer blobs are downloaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerPolicy {
    /// Never now; resolved on demand (e.g. at push time).
    #[default]
    Shallow,
    /// Immediately, concurrently, all or nothing.
    Eager,
    /// Later, by a separate invocation.
    Lazy,
}

impl fmt::Display for LayerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shallow => write!(f, "shallow"),
            Self::Eager => write!(f, "eager"),
            Self::Lazy => write!(f, "lazy"),
        }
    }
}

/// A layer download postponed to a later invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredFetch {
    pub source: Source,
    pub digest: Digest,
}

/// Outcome of applying a policy.
#[derive(Debug, Clone, Default)]
pub struct MaterializedLayers {
    /// Layers present in the blob store, with their paths.
    pub local: BTreeMap<Digest, PathBuf>,
    /// Layers only referenced by digest (shallow).
    pub referenced: BTreeSet<Digest>,
    /// Layers scheduled for a later invocation (lazy).
    pub deferred: Vec<DeferredFetch>,
}

/// Decides which layer blobs are downloaded now, deferred, or referenced.
pub struct LayerMaterializer<'a> {
    coordinator: &'a FetchCoordinator,
}

impl<'a> LayerMaterializer<'a> {
    pub fn new(coordinator: &'a FetchCoordinator) -> Self {
        Self { coordinator }
    }

    pub async fn materialize(
        &self,
        layers: &BTreeSet<Digest>,
        policy: LayerPolicy,
    ) -> Result<MaterializedLayers> {
        info!("Materializing {} layers ({policy})", layers.len());
        let mut out = MaterializedLayers::default();

        match policy {
            LayerPolicy::Shallow => {
                out.referenced = layers.clone();
            }
            LayerPolicy::Eager => {
                let records = self.coordinator.fetch_blobs(layers.iter().cloned()).await?;
                out.local = records.into_iter().map(|r| (r.digest, r.path)).collect();
            }
            LayerPolicy::Lazy => {
                let source = self.coordinator.source().clone();
                out.deferred = layers
                    .iter()
                    .map(|digest| DeferredFetch {
                        source: source.clone(),
                        digest: digest.clone(),
                    })
                    .collect();
            }
        }

        Ok(out)
    }

    /// Executes deferred work items, grouped per source.
    ///
    /// Each group is one all-or-nothing batch; the first failing group
    /// stops the run.
    pub async fn run_deferred(&self, items: &[DeferredFetch]) -> Result<BTreeMap<Digest, PathBuf>> {
        let mut by_source: BTreeMap<&Source, Vec<Digest>> = BTreeMap::new();
        for item in items {
            by_source
                .entry(&item.source)
                .or_default()
                .push(item.digest.clone());
        }

        let mut local = BTreeMap::new();
        for (source, digests) in by_source {
            let coordinator = self.coordinator.for_source(source.clone());
            let records = coordinator.fetch_blobs(digests).await?;
            local.extend(records.into_iter().map(|r| (r.digest, r.path)));
        }
        Ok(local)
    }
}
