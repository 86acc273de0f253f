//! # Fetch Pipeline Constants
//!
//! Bounds, timeouts, and protocol strings used throughout the crate. These
//! constants are the **single source of truth** for the on-disk layout and
//! the media types the manifest walker recognizes.
//!
//! ## Cross-References
//!
//! - [`crate::digest`]: Uses the digest prefix and pinned length
//! - [`crate::storage`]: Uses the algorithm directory name
//! - [`crate::manifest`]: Uses media types and the manifest size bound
//! - [`crate::fetch`]: Uses concurrency and timeout defaults

use std::time::Duration;

// =============================================================================
// Digest Format
// =============================================================================

/// Prefix of every digest string this crate produces or accepts.
pub const SHA256_PREFIX: &str = "sha256:";

/// Number of hex characters in a SHA-256 digest.
pub const SHA256_HEX_LEN: usize = 64;

/// Length of a pinned `sha256:<hex>` reference.
///
/// Anything else supplied as a digest is treated as absent and falls through
/// to tag handling.
pub const PINNED_DIGEST_LEN: usize = SHA256_PREFIX.len() + SHA256_HEX_LEN;

// =============================================================================
// Storage Layout
// =============================================================================

/// Directory under the blob root holding SHA-256 blobs.
///
/// Layout is flat: `<root>/sha256/<hex>`, no sharding.
pub const BLOB_ALGORITHM_DIR: &str = "sha256";

/// Prefix for in-flight temp files inside the algorithm directory.
pub const TEMP_FILE_PREFIX: &str = ".tmp-";

/// Default blob root directory name under the user cache directory.
pub const BLOB_STORE_DIR: &str = "blobs";

// =============================================================================
// Size and Concurrency Limits
// =============================================================================

/// Maximum accepted manifest or config size (4 MiB).
///
/// Manifests and configs are buffered and decoded as JSON; registries
/// enforce a similar bound on manifest uploads.
pub const MAX_MANIFEST_SIZE: usize = 4 * 1024 * 1024;

/// Default number of blob fetches in flight per batch.
pub const MAX_CONCURRENT_FETCHES: usize = 8;

// =============================================================================
// Timeouts
// =============================================================================

/// Timeout for a single network attempt against one mirror.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for one invocation of the external fetch tool.
pub const SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(600);

// =============================================================================
// External Tool
// =============================================================================

/// Helper binary looked up on `PATH` when no explicit tool path is set.
pub const DEFAULT_TOOL_NAME: &str = "imgpull-fetch";

// =============================================================================
// OCI / Docker Media Types
// =============================================================================

/// OCI image index.
pub const OCI_IMAGE_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";

/// OCI image manifest.
pub const OCI_IMAGE_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// OCI image config.
pub const OCI_IMAGE_CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.image.config.v1+json";

/// Docker manifest list (legacy index).
pub const DOCKER_MANIFEST_LIST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// Docker image manifest v2 schema 2.
pub const DOCKER_MANIFEST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.v2+json";

/// Docker image config.
pub const DOCKER_CONFIG_MEDIA_TYPE: &str = "application/vnd.docker.container.image.v1+json";

/// Media types sent in `Accept` when fetching a manifest of unknown kind.
pub const MANIFEST_ACCEPT_MEDIA_TYPES: [&str; 4] = [
    OCI_IMAGE_INDEX_MEDIA_TYPE,
    OCI_IMAGE_MANIFEST_MEDIA_TYPE,
    DOCKER_MANIFEST_LIST_MEDIA_TYPE,
    DOCKER_MANIFEST_MEDIA_TYPE,
];
