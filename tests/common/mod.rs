//! Shared test fixtures: an in-memory registry backend and image builders.

#![allow(dead_code)]

use async_trait::async_trait;
use imgpull::constants::{
    OCI_IMAGE_CONFIG_MEDIA_TYPE, OCI_IMAGE_INDEX_MEDIA_TYPE, OCI_IMAGE_MANIFEST_MEDIA_TYPE,
};
use imgpull::{
    BlobRecord, BlobStore, Digest, DownloadBackend, Error, FetchCoordinator, Reference, Result,
    Source,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// In-memory registry that counts every request.
#[derive(Default)]
pub struct MockRegistry {
    blobs: Mutex<HashMap<Digest, Vec<u8>>>,
    tags: Mutex<HashMap<String, Digest>>,
    blob_fetches: Mutex<HashMap<Digest, usize>>,
    manifest_fetches: Mutex<Vec<Reference>>,
}

impl MockRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serves `data` under its own digest.
    pub fn add(&self, data: &[u8]) -> Digest {
        let digest = Digest::of(data);
        self.blobs.lock().unwrap().insert(digest.clone(), data.to_vec());
        digest
    }

    /// Serves `data` under a digest it does not hash to.
    pub fn add_corrupt(&self, claimed: &Digest, data: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .insert(claimed.clone(), data.to_vec());
    }

    pub fn tag(&self, tag: &str, digest: &Digest) {
        self.tags
            .lock()
            .unwrap()
            .insert(tag.to_string(), digest.clone());
    }

    pub fn blob_fetches(&self, digest: &Digest) -> usize {
        self.blob_fetches
            .lock()
            .unwrap()
            .get(digest)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_blob_fetches(&self) -> usize {
        self.blob_fetches.lock().unwrap().values().sum()
    }

    pub fn manifest_fetches(&self) -> usize {
        self.manifest_fetches.lock().unwrap().len()
    }

    fn lookup(&self, source: &Source, target: &str, digest: &Digest) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(digest)
            .cloned()
            .ok_or_else(|| Error::NetworkFailure {
                target: format!("{}@{target}", source.repository()),
                attempts: source
                    .registries()
                    .iter()
                    .map(|r| format!("{r}: 404 Not Found"))
                    .collect(),
            })
    }
}

#[async_trait]
impl DownloadBackend for MockRegistry {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_blob(
        &self,
        source: &Source,
        digest: &Digest,
        store: &BlobStore,
    ) -> Result<BlobRecord> {
        *self
            .blob_fetches
            .lock()
            .unwrap()
            .entry(digest.clone())
            .or_default() += 1;

        let data = self.lookup(source, &digest.to_string(), digest)?;
        store.write_large(digest, &data[..])?;
        Ok(BlobRecord {
            digest: digest.clone(),
            path: store.path(digest),
            data: None,
        })
    }

    async fn fetch_manifest(
        &self,
        source: &Source,
        reference: &Reference,
        store: &BlobStore,
    ) -> Result<BlobRecord> {
        self.manifest_fetches.lock().unwrap().push(reference.clone());

        let digest = match reference {
            Reference::Digest(d) => {
                let data = self.lookup(source, &d.to_string(), d)?;
                let actual = Digest::of(&data);
                if &actual != d {
                    return Err(Error::DigestMismatch {
                        expected: d.to_string(),
                        actual: actual.to_string(),
                    });
                }
                store.write_small_with_digest(d, &data)?;
                return Ok(BlobRecord {
                    digest: d.clone(),
                    path: store.path(d),
                    data: Some(data),
                });
            }
            Reference::Tag(tag) => self.resolve_tag(source, tag).await?,
        };

        let data = self.lookup(source, &digest.to_string(), &digest)?;
        let learned = store.write_small(&data)?;
        Ok(BlobRecord {
            path: store.path(&learned),
            digest: learned,
            data: Some(data),
        })
    }

    async fn resolve_tag(&self, source: &Source, tag: &str) -> Result<Digest> {
        self.tags
            .lock()
            .unwrap()
            .get(tag)
            .cloned()
            .ok_or_else(|| Error::NetworkFailure {
                target: format!("{}:{tag}", source.repository()),
                attempts: vec!["mock: unknown tag".to_string()],
            })
    }
}

// =============================================================================
// Image Builders
// =============================================================================

pub fn config_json(os: &str, arch: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "architecture": arch,
        "os": os,
        "rootfs": { "type": "layers", "diff_ids": [] }
    }))
    .unwrap()
}

pub fn manifest_json(config: &Digest, layers: &[Digest]) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "schemaVersion": 2,
        "mediaType": OCI_IMAGE_MANIFEST_MEDIA_TYPE,
        "config": {
            "mediaType": OCI_IMAGE_CONFIG_MEDIA_TYPE,
            "digest": config.to_string(),
            "size": 100
        },
        "layers": layers.iter().map(|l| json!({
            "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
            "digest": l.to_string(),
            "size": 1000
        })).collect::<Vec<_>>()
    }))
    .unwrap()
}

/// One index entry: (digest, media type, optional (os, arch)).
pub fn index_json(entries: &[(Digest, &str, Option<(&str, &str)>)]) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "schemaVersion": 2,
        "mediaType": OCI_IMAGE_INDEX_MEDIA_TYPE,
        "manifests": entries.iter().map(|(digest, media_type, platform)| {
            let mut entry = json!({
                "mediaType": media_type,
                "digest": digest.to_string(),
                "size": 500
            });
            if let Some((os, arch)) = platform {
                entry["platform"] = json!({ "os": os, "architecture": arch });
            }
            entry
        }).collect::<Vec<_>>()
    }))
    .unwrap()
}

/// A two-platform image: 3 layers per platform, one shared.
pub struct MultiArchImage {
    pub index: Digest,
    pub manifests: Vec<Digest>,
    pub configs: Vec<Digest>,
    pub layers: Vec<Digest>,
}

pub fn multi_arch_image(registry: &MockRegistry) -> MultiArchImage {
    let shared = registry.add(b"layer-shared-base");
    let amd_layers = vec![
        shared.clone(),
        registry.add(b"layer-amd64-1"),
        registry.add(b"layer-amd64-2"),
    ];
    let arm_layers = vec![
        shared.clone(),
        registry.add(b"layer-arm64-1"),
        registry.add(b"layer-arm64-2"),
    ];

    let amd_config = registry.add(&config_json("linux", "amd64"));
    let arm_config = registry.add(&config_json("linux", "arm64"));
    let amd_manifest = registry.add(&manifest_json(&amd_config, &amd_layers));
    let arm_manifest = registry.add(&manifest_json(&arm_config, &arm_layers));

    let index = registry.add(&index_json(&[
        (
            amd_manifest.clone(),
            OCI_IMAGE_MANIFEST_MEDIA_TYPE,
            Some(("linux", "amd64")),
        ),
        (
            arm_manifest.clone(),
            OCI_IMAGE_MANIFEST_MEDIA_TYPE,
            Some(("linux", "arm64")),
        ),
    ]));

    let mut layers: Vec<Digest> = amd_layers.into_iter().chain(arm_layers).collect();
    layers.sort();
    layers.dedup();

    MultiArchImage {
        index,
        manifests: vec![amd_manifest, arm_manifest],
        configs: vec![amd_config, arm_config],
        layers,
    }
}

// =============================================================================
// Wiring
// =============================================================================

pub fn source() -> Source {
    Source::new(
        "library/test",
        vec!["mirror.example.com".to_string(), "registry.example.com".to_string()],
    )
    .unwrap()
}

pub fn coordinator(registry: &Arc<MockRegistry>) -> (TempDir, FetchCoordinator) {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(BlobStore::open_at(temp.path().join("blobs")).unwrap());
    let backend: Arc<dyn DownloadBackend> = registry.clone();
    (temp, FetchCoordinator::new(backend, store, source()))
}
