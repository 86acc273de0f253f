//! # Manifest Graph Walking
//!
//! Decodes the root manifest, classifies it, and walks at most one level of
//! children:
//!
//! ```text
//!   root ──► Index ──► child manifest ──► config
//!     │                      └──────────► layers ─┐
//!     └────► Manifest ──► config                  ├─► de-duplicated layer set
//!                  └────► layers ─────────────────┘
//! ```
//!
//! OCI and Docker media types collapse onto the same two classes. An index
//! that lists another index fails with [`Error::NestedIndexUnsupported`]
//! before any child is fetched; deeper graphs are not resolved.
//!
//! Manifests and configs are always fetched eagerly, whatever the layer
//! policy. Their raw bytes are kept in [`PullResult::descriptors`] for
//! embedding in generated build metadata.

use crate::constants::{
    DOCKER_MANIFEST_LIST_MEDIA_TYPE, DOCKER_MANIFEST_MEDIA_TYPE, OCI_IMAGE_INDEX_MEDIA_TYPE,
    OCI_IMAGE_MANIFEST_MEDIA_TYPE,
};
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::fetch::FetchCoordinator;
use crate::platform::{Platform, PlatformSpec};
use crate::reference::Reference;
use crate::storage::BlobStore;
use oci_distribution::manifest::{
    ImageIndexEntry, OciImageIndex, OciImageManifest, Platform as OciPlatform,
};
use serde::Deserialize;
use serde::de::IgnoredAny;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, info};

// =============================================================================
// Wire Types
// =============================================================================

/// Just enough of a document to classify it before the full decode.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentHeader {
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    manifests: Option<IgnoredAny>,
    #[serde(default)]
    config: Option<IgnoredAny>,
}

/// Platform fields of an image config. Unrecognized values must survive
/// the decode so the walker can skip them.
#[derive(Debug, Deserialize)]
struct ImageConfig {
    #[serde(default)]
    os: Option<String>,
    #[serde(default)]
    architecture: Option<String>,
    #[serde(default)]
    variant: Option<String>,
}

fn platform_spec(platform: &OciPlatform) -> PlatformSpec {
    PlatformSpec {
        os: platform.os.clone(),
        architecture: platform.architecture.clone(),
        variant: platform.variant.clone(),
    }
}

// =============================================================================
// Classification
// =============================================================================

/// The two kinds of manifest the walker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Index,
    Manifest,
}

impl MediaKind {
    /// Classifies a media type string.
    pub fn from_media_type(media_type: &str) -> Result<Self> {
        match media_type {
            OCI_IMAGE_INDEX_MEDIA_TYPE | DOCKER_MANIFEST_LIST_MEDIA_TYPE => Ok(Self::Index),
            OCI_IMAGE_MANIFEST_MEDIA_TYPE | DOCKER_MANIFEST_MEDIA_TYPE => Ok(Self::Manifest),
            other => Err(Error::UnsupportedMediaType(other.to_string())),
        }
    }

    /// OCI allows `mediaType` to be omitted, in which case the shape decides.
    fn of(header: &DocumentHeader) -> Result<Self> {
        match header.media_type.as_deref() {
            Some(mt) => Self::from_media_type(mt),
            None if header.manifests.is_some() => Ok(Self::Index),
            None if header.config.is_some() => Ok(Self::Manifest),
            None => Err(Error::UnsupportedMediaType(
                "missing mediaType and unrecognized document shape".to_string(),
            )),
        }
    }
}

// =============================================================================
// Graph Types
// =============================================================================

/// One decoded manifest or index in the graph.
#[derive(Debug, Clone)]
pub struct ManifestNode {
    pub digest: Digest,
    pub kind: MediaKind,
    pub media_type: Option<String>,
    pub raw: Vec<u8>,
    pub platform: Option<PlatformSpec>,
    /// Child manifest digests (index only).
    pub children: Vec<Digest>,
    /// Config digest (manifest only).
    pub config: Option<Digest>,
    /// Layer digests in manifest order (manifest only).
    pub layers: Vec<Digest>,
}

impl ManifestNode {
    /// Decodes `raw` and returns the node plus its index entries (empty for
    /// a manifest).
    fn decode(digest: Digest, raw: Vec<u8>) -> Result<(Self, Vec<ImageIndexEntry>)> {
        let header: DocumentHeader = serde_json::from_slice(&raw)?;
        let kind = MediaKind::of(&header)?;

        let mut node = Self {
            digest,
            kind,
            media_type: header.media_type,
            raw: Vec::new(),
            platform: None,
            children: Vec::new(),
            config: None,
            layers: Vec::new(),
        };

        let entries = match kind {
            MediaKind::Index => {
                let index: OciImageIndex = serde_json::from_slice(&raw)?;
                node.children = index
                    .manifests
                    .iter()
                    .map(|entry| entry.digest.parse::<Digest>())
                    .collect::<Result<Vec<_>>>()?;
                index.manifests
            }
            MediaKind::Manifest => {
                let manifest: OciImageManifest = serde_json::from_slice(&raw)?;
                node.config = Some(manifest.config.digest.parse::<Digest>()?);
                node.layers = manifest
                    .layers
                    .iter()
                    .map(|layer| layer.digest.parse::<Digest>())
                    .collect::<Result<Vec<_>>>()?;
                Vec::new()
            }
        };

        node.raw = raw;
        Ok((node, entries))
    }
}

/// Everything a pull learned about the image, built fresh per pull.
#[derive(Debug, Clone)]
pub struct PullResult {
    pub root_digest: Digest,
    /// Raw bytes of every manifest and config fetched.
    pub descriptors: BTreeMap<Digest, Vec<u8>>,
    /// Every distinct layer digest across all manifests.
    pub layers: BTreeSet<Digest>,
    /// Recognized platforms found in the index or configs.
    pub platforms: BTreeSet<Platform>,
    /// Decoded nodes, root first.
    pub nodes: Vec<ManifestNode>,
}

impl PullResult {
    /// Paths of every manifest and config, all of which are in the store.
    pub fn descriptor_paths(&self, store: &BlobStore) -> BTreeMap<Digest, PathBuf> {
        self.descriptors
            .keys()
            .map(|d| (d.clone(), store.path(d)))
            .collect()
    }

    /// Platforms rendered as `os/arch`.
    pub fn platform_strings(&self) -> Vec<String> {
        self.platforms.iter().map(ToString::to_string).collect()
    }
}

// =============================================================================
// Walker
// =============================================================================

/// Walks a manifest graph of depth at most two.
pub struct ManifestGraphWalker<'a> {
    coordinator: &'a FetchCoordinator,
}

impl<'a> ManifestGraphWalker<'a> {
    pub fn new(coordinator: &'a FetchCoordinator) -> Self {
        Self { coordinator }
    }

    /// Fetches the root and everything below it except layer blobs.
    pub async fn walk(&self, reference: &Reference) -> Result<PullResult> {
        let root = self.coordinator.fetch_manifest(reference).await?;
        let raw = root.data.ok_or_else(|| {
            Error::Internal(format!("manifest {} fetched without bytes", root.digest))
        })?;

        let mut result = PullResult {
            root_digest: root.digest.clone(),
            descriptors: BTreeMap::new(),
            layers: BTreeSet::new(),
            platforms: BTreeSet::new(),
            nodes: Vec::new(),
        };
        result.descriptors.insert(root.digest.clone(), raw.clone());

        let (node, entries) = ManifestNode::decode(root.digest, raw)?;
        info!("Root {} is {:?}", node.digest, node.kind);

        match node.kind {
            MediaKind::Manifest => {
                result.nodes.push(node);
                self.visit_manifest(&mut result, 0, None).await?;
            }
            MediaKind::Index => {
                check_no_nested_index(&entries)?;
                let children = node.children.clone();
                result.nodes.push(node);

                for (entry, child_digest) in entries.iter().zip(children) {
                    let child = self
                        .coordinator
                        .fetch_manifest(&Reference::Digest(child_digest))
                        .await?;
                    let raw = child.data.ok_or_else(|| {
                        Error::Internal(format!("manifest {} fetched without bytes", child.digest))
                    })?;
                    result.descriptors.insert(child.digest.clone(), raw.clone());

                    let (child_node, _) = ManifestNode::decode(child.digest, raw)?;
                    if child_node.kind == MediaKind::Index {
                        return Err(Error::NestedIndexUnsupported {
                            digest: child_node.digest.to_string(),
                        });
                    }

                    result.nodes.push(child_node);
                    let index = result.nodes.len() - 1;
                    let entry_platform = entry.platform.as_ref().map(platform_spec);
                    self.visit_manifest(&mut result, index, entry_platform)
                        .await?;
                }
            }
        }

        info!(
            "Walked {} manifests: {} layers, platforms [{}]",
            result.nodes.len(),
            result.layers.len(),
            result.platform_strings().join(", ")
        );
        Ok(result)
    }

    /// Fetches the config of `result.nodes[index]` and records its layers and
    /// platform. `entry_platform` comes from the parent index, if any.
    async fn visit_manifest(
        &self,
        result: &mut PullResult,
        index: usize,
        entry_platform: Option<PlatformSpec>,
    ) -> Result<()> {
        let mut platform = None;
        if let Some(spec) = entry_platform {
            if let Some(p) = spec.recognize() {
                platform = Some(p);
            }
            result.nodes[index].platform = Some(spec);
        }

        let node = &result.nodes[index];
        result.layers.extend(node.layers.iter().cloned());

        let config_digest = node.config.clone().ok_or_else(|| {
            Error::Serialization(format!("manifest {} has no config", node.digest))
        })?;

        let config = self.coordinator.fetch_small_blob(&config_digest).await?;
        let raw = config.data.unwrap_or_default();

        if platform.is_none() {
            let image_config: ImageConfig = serde_json::from_slice(&raw)?;
            if let (Some(os), Some(architecture)) = (image_config.os, image_config.architecture) {
                let spec = PlatformSpec {
                    os,
                    architecture,
                    variant: image_config.variant,
                };
                platform = spec.recognize();
                let node = &mut result.nodes[index];
                if node.platform.is_none() {
                    node.platform = Some(spec);
                }
            }
        }

        if let Some(p) = platform {
            debug!("Manifest {} targets {p}", result.nodes[index].digest);
            result.platforms.insert(p);
        }
        result.descriptors.insert(config_digest, raw);
        Ok(())
    }
}

/// Fails if any index entry declares itself an index.
fn check_no_nested_index(entries: &[ImageIndexEntry]) -> Result<()> {
    for entry in entries {
        if MediaKind::from_media_type(&entry.media_type).ok() == Some(MediaKind::Index) {
            return Err(Error::NestedIndexUnsupported {
                digest: entry.digest.clone(),
            });
        }
    }
    Ok(())
}
