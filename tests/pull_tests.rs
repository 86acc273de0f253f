//! End-to-end pull tests against an in-memory registry.
//!
//! Validates the three layer policies, deferred execution, and the
//! all-or-nothing behavior of eager pulls.

mod common;

use common::{MockRegistry, coordinator, multi_arch_image};
use imgpull::{
    DeferredFetch, Digest, Error, LayerMaterializer, LayerPolicy, PullConfig, Puller, Source,
    WarningTracker,
};
use std::collections::BTreeSet;
use std::sync::Arc;

fn puller(registry: &Arc<MockRegistry>) -> (tempfile::TempDir, Puller) {
    let (temp, coord) = coordinator(registry);
    (temp, Puller::new(coord, Arc::new(WarningTracker::new())))
}

// =============================================================================
// Layer Policy Tests
// =============================================================================

#[tokio::test]
async fn test_shallow_pull_fetches_no_layers() {
    let registry = MockRegistry::new();
    let image = multi_arch_image(&registry);
    let (_temp, puller) = puller(&registry);
    let digest = image.index.to_string();

    let outcome = puller
        .pull(Some("latest"), Some(&digest), LayerPolicy::Shallow)
        .await
        .unwrap();

    for layer in &image.layers {
        assert_eq!(registry.blob_fetches(layer), 0);
    }
    assert_eq!(outcome.layers.referenced.len(), 5);
    assert!(outcome.layers.local.is_empty());
    assert!(outcome.layers.deferred.is_empty());
    assert_eq!(outcome.blob_paths().len(), 5, "manifests and configs only");
}

#[tokio::test]
async fn test_eager_pull_fetches_each_layer_once() {
    let registry = MockRegistry::new();
    let image = multi_arch_image(&registry);
    let (_temp, puller) = puller(&registry);
    let digest = image.index.to_string();

    let outcome = puller
        .pull(None, Some(&digest), LayerPolicy::Eager)
        .await
        .unwrap();

    for layer in &image.layers {
        assert_eq!(registry.blob_fetches(layer), 1, "layer {layer}");
        let path = &outcome.layers.local[layer];
        assert!(path.is_file());
    }
    assert_eq!(outcome.blob_paths().len(), 10);
    assert_eq!(
        outcome.result.platform_strings(),
        vec!["linux/amd64", "linux/arm64"]
    );
}

#[tokio::test]
async fn test_eager_pull_is_all_or_nothing() {
    let registry = MockRegistry::new();
    let image = multi_arch_image(&registry);
    // Replace one layer on the mirror with bytes that do not match.
    registry.add_corrupt(&image.layers[2], b"tampered");
    let (_temp, puller) = puller(&registry);
    let digest = image.index.to_string();

    let err = puller
        .pull(None, Some(&digest), LayerPolicy::Eager)
        .await
        .unwrap_err();

    assert!(err.is_digest_mismatch());
}

#[tokio::test]
async fn test_lazy_pull_defers_layers() {
    let registry = MockRegistry::new();
    let image = multi_arch_image(&registry);
    let (_temp, puller) = puller(&registry);
    let digest = image.index.to_string();

    let outcome = puller
        .pull(None, Some(&digest), LayerPolicy::Lazy)
        .await
        .unwrap();

    assert_eq!(outcome.layers.deferred.len(), 5);
    for layer in &image.layers {
        assert_eq!(registry.blob_fetches(layer), 0);
    }

    // A later invocation picks up the serialized work items.
    let json = serde_json::to_string(&outcome.layers.deferred).unwrap();
    let items: Vec<DeferredFetch> = serde_json::from_str(&json).unwrap();

    let local = LayerMaterializer::new(puller.coordinator())
        .run_deferred(&items)
        .await
        .unwrap();

    assert_eq!(local.len(), 5);
    for layer in &image.layers {
        assert_eq!(registry.blob_fetches(layer), 1);
        assert!(local[layer].is_file());
    }
}

#[tokio::test]
async fn test_run_deferred_groups_by_source() {
    let registry = MockRegistry::new();
    let a = registry.add(b"from source a");
    let b = registry.add(b"from source b");
    let (_temp, coord) = coordinator(&registry);
    let other = Source::new("other/repo", vec!["other.example.com".into()]).unwrap();

    let items = vec![
        DeferredFetch {
            source: coord.source().clone(),
            digest: a.clone(),
        },
        DeferredFetch {
            source: other,
            digest: b.clone(),
        },
        DeferredFetch {
            source: coord.source().clone(),
            digest: a.clone(),
        },
    ];

    let local = LayerMaterializer::new(&coord)
        .run_deferred(&items)
        .await
        .unwrap();

    assert_eq!(
        local.keys().cloned().collect::<BTreeSet<Digest>>(),
        BTreeSet::from([a.clone(), b])
    );
    assert_eq!(registry.blob_fetches(&a), 1);
}

#[tokio::test]
async fn test_materialize_empty_layer_set() {
    let registry = MockRegistry::new();
    let (_temp, coord) = coordinator(&registry);

    let out = LayerMaterializer::new(&coord)
        .materialize(&BTreeSet::new(), LayerPolicy::Eager)
        .await
        .unwrap();

    assert!(out.local.is_empty());
    assert_eq!(registry.total_blob_fetches(), 0);
}

// =============================================================================
// Reference Handling Tests
// =============================================================================

#[tokio::test]
async fn test_tag_only_pull_requires_opt_in() {
    let registry = MockRegistry::new();
    let image = multi_arch_image(&registry);
    registry.tag("latest", &image.index);
    let (_temp, puller) = puller(&registry);

    let err = puller
        .pull(Some("latest"), None, LayerPolicy::Shallow)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidReference(_)));

    let outcome = puller
        .allow_tag_only(true)
        .pull(Some("latest"), None, LayerPolicy::Shallow)
        .await
        .unwrap();
    assert_eq!(outcome.reference.digest(), Some(&image.index));
    assert_eq!(outcome.result.root_digest, image.index);
}

#[tokio::test]
async fn test_from_config_builds_pipeline() {
    let temp = tempfile::TempDir::new().unwrap();
    let config = PullConfig::from_json(&format!(
        r#"{{"blob_root": "{}", "layer_policy": "eager", "max_concurrent_fetches": 2}}"#,
        temp.path().join("blobs").display()
    ))
    .unwrap();
    let source = Source::new("library/alpine", vec!["registry.example.com".into()]).unwrap();

    let puller = Puller::from_config(&config, source, Arc::new(WarningTracker::new())).unwrap();

    assert_eq!(puller.coordinator().backend_name(), "native");
    assert_eq!(puller.coordinator().store().root(), temp.path().join("blobs"));
    assert_eq!(config.layer_policy, LayerPolicy::Eager);
}
