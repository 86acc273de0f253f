//! Pull configuration.
//!
//! A [`PullConfig`] is supplied by the calling collaborator, usually as
//! JSON. It selects the download backend and the layer policy; everything
//! else has defaults from [`crate::constants`].
//!
//! ```json
//! {
//!   "backend": "external",
//!   "tool_path": "/usr/local/bin/imgpull-fetch",
//!   "layer_policy": "eager",
//!   "insecure_registries": ["localhost:5000"]
//! }
//! ```

use crate::backend::{DownloadBackend, ExternalToolBackend, NativeBackend};
use crate::constants::{FETCH_TIMEOUT, MAX_CONCURRENT_FETCHES, SUBPROCESS_TIMEOUT};
use crate::error::Result;
use crate::materialize::LayerPolicy;
use crate::storage::BlobStore;
use crate::warnings::WarningTracker;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Which transport moves the bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process registry client.
    #[default]
    Native,
    /// Helper subprocess.
    External,
}

/// Settings for one pull run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullConfig {
    pub backend: BackendKind,
    /// Helper binary for the external backend; `PATH` lookup if unset.
    pub tool_path: Option<PathBuf>,
    /// Registries reached over plain HTTP (native backend).
    pub insecure_registries: Vec<String>,
    /// Per-attempt timeout; the external backend bounds each invocation.
    pub fetch_timeout_secs: Option<u64>,
    pub max_concurrent_fetches: usize,
    pub layer_policy: LayerPolicy,
    /// Permit tag-only references, learning the digest at pull time.
    pub allow_tag_only: bool,
    /// Blob store root; the user cache directory if unset.
    pub blob_root: Option<PathBuf>,
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Native,
            tool_path: None,
            insecure_registries: Vec::new(),
            fetch_timeout_secs: None,
            max_concurrent_fetches: MAX_CONCURRENT_FETCHES,
            layer_policy: LayerPolicy::Shallow,
            allow_tag_only: false,
            blob_root: None,
        }
    }
}

impl PullConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    /// Resolved blob store root.
    pub fn blob_root(&self) -> PathBuf {
        self.blob_root.clone().unwrap_or_else(BlobStore::default_root)
    }

    fn timeout_or(&self, default: Duration) -> Duration {
        self.fetch_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(default)
    }

    /// Builds the configured backend.
    pub fn build_backend(&self, warnings: Arc<WarningTracker>) -> Arc<dyn DownloadBackend> {
        match self.backend {
            BackendKind::Native => Arc::new(
                NativeBackend::new(self.insecure_registries.clone(), warnings)
                    .with_timeout(self.timeout_or(FETCH_TIMEOUT)),
            ),
            BackendKind::External => {
                let backend = match &self.tool_path {
                    Some(path) => ExternalToolBackend::new(path.clone()),
                    None => ExternalToolBackend::from_path(),
                };
                Arc::new(backend.with_timeout(self.timeout_or(SUBPROCESS_TIMEOUT)))
            }
        }
    }
}
