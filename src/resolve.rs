//! # Reference Resolution
//!
//! Turns the caller's `(tag, digest)` pair into the one reference every later
//! fetch uses.
//!
//! ```text
//!   digest is sha256:<64 chars>? ──yes──► Digest(digest)
//!            │ no
//!            ▼
//!   allow_tag_only && tag given? ──no───► InvalidReference
//!            │ yes
//!            ▼
//!   warn once, learn digest from tag ──ok──► Digest(learned)
//!            │ failed
//!            ▼
//!          Tag(tag)
//! ```
//!
//! The digest check is a shape check: exactly 71 characters starting with
//! `sha256:`. Anything else, including `sha256:abc`, is treated as absent.

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::fetch::FetchCoordinator;
use crate::reference::Reference;
use crate::warnings::WarningTracker;
use std::sync::Arc;
use tracing::{info, warn};

/// What [`ReferenceResolver::plan`] decided before any network I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionPlan {
    /// A pinned digest was supplied.
    Pinned(Digest),
    /// Only a tag is usable; its digest must be learned.
    LearnFromTag(String),
}

/// Resolves caller input into a trusted reference where possible.
pub struct ReferenceResolver<'a> {
    coordinator: &'a FetchCoordinator,
    warnings: Arc<WarningTracker>,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(coordinator: &'a FetchCoordinator, warnings: Arc<WarningTracker>) -> Self {
        Self {
            coordinator,
            warnings,
        }
    }

    /// Decides how to resolve without touching the network.
    pub fn plan(
        tag: Option<&str>,
        digest: Option<&str>,
        allow_tag_only: bool,
    ) -> Result<ResolutionPlan> {
        let tag = tag.filter(|t| !t.is_empty());
        let digest = digest.filter(|d| !d.is_empty());

        if let Some(d) = digest.filter(|d| Digest::is_pinned(d)) {
            let parsed = d.parse().map_err(|e: Error| {
                Error::InvalidReference(format!("digest '{d}' is malformed: {e}"))
            })?;
            return Ok(ResolutionPlan::Pinned(parsed));
        }

        match (tag, digest) {
            (None, None) => Err(Error::InvalidReference(
                "either digest or tag must be specified".to_string(),
            )),
            (Some(tag), _) if allow_tag_only => Ok(ResolutionPlan::LearnFromTag(tag.to_string())),
            (Some(tag), None) => Err(Error::InvalidReference(format!(
                "tag '{tag}' given without a digest; an explicit sha256 digest is required"
            ))),
            (_, Some(d)) => Err(Error::InvalidReference(format!(
                "'{d}' is not a sha256 digest; an explicit sha256 digest is required"
            ))),
        }
    }

    /// Resolves to the canonical reference for all later fetches.
    pub async fn resolve(
        &self,
        tag: Option<&str>,
        digest: Option<&str>,
        allow_tag_only: bool,
    ) -> Result<Reference> {
        match Self::plan(tag, digest, allow_tag_only)? {
            ResolutionPlan::Pinned(d) => Ok(Reference::Digest(d)),
            ResolutionPlan::LearnFromTag(tag) => {
                let repository = self.coordinator.source().repository();
                self.warnings.warn_unpinned_tag(repository, &tag);

                match self.coordinator.resolve_tag(&tag).await {
                    Ok(learned) => {
                        info!("Resolved {repository}:{tag} to {learned}");
                        Ok(Reference::Digest(learned))
                    }
                    Err(e) => {
                        warn!("Could not learn digest for {repository}:{tag}, using tag: {e}");
                        Ok(Reference::Tag(tag))
                    }
                }
            }
        }
    }
}
