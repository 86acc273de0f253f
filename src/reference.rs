//! Sources and references.
//!
//! A [`Source`] names a repository and the mirrors that serve it, in the
//! order they are tried. A [`Reference`] names what to fetch from it.

use crate::digest::Digest;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A repository and its ordered mirror list.
///
/// Registry order is the fallback order: the first entry is always tried
/// first. It is never re-derived from an unordered collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Source {
    repository: String,
    registries: Vec<String>,
}

impl Source {
    /// Creates a source. Fails if no registry is given.
    pub fn new(repository: impl Into<String>, registries: Vec<String>) -> Result<Self> {
        let repository = repository.into();
        if repository.is_empty() {
            return Err(Error::InvalidReference(
                "source repository must not be empty".to_string(),
            ));
        }
        if registries.is_empty() {
            return Err(Error::InvalidReference(format!(
                "source '{repository}' has no registries"
            )));
        }
        Ok(Self {
            repository,
            registries,
        })
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Registries in fallback order.
    pub fn registries(&self) -> &[String] {
        &self.registries
    }

    /// Renders the `<repo>=<registry>[,<registry>...]` form used by the
    /// external fetch tool.
    pub fn to_arg(&self) -> String {
        format!("{}={}", self.repository, self.registries.join(","))
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.repository, self.registries.join(", "))
    }
}

/// What to fetch: a mutable tag or an immutable digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reference {
    Tag(String),
    Digest(Digest),
}

impl Reference {
    /// Only digest references are safe to use as cache keys.
    pub fn is_trusted(&self) -> bool {
        matches!(self, Self::Digest(_))
    }

    pub fn digest(&self) -> Option<&Digest> {
        match self {
            Self::Digest(d) => Some(d),
            Self::Tag(_) => None,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(t) => f.write_str(t),
            Self::Digest(d) => write!(f, "{d}"),
        }
    }
}
