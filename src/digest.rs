//! Content digests.
//!
//! A [`Digest`] names a byte sequence by its SHA-256 hash. The canonical
//! string form is `sha256:` followed by 64 lowercase hex characters; any
//! other string is a tag, not a digest.
//!
//! Only SHA-256 is registered in [`Algorithm`]. Adding an algorithm means
//! adding a variant and its hasher; parsing stays strict for everything else.

use crate::constants::{PINNED_DIGEST_LEN, SHA256_HEX_LEN, SHA256_PREFIX};
use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

/// Registered hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    Sha256,
}

impl Algorithm {
    /// Name used in digest strings and as the store sub-directory.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }

    fn hex_len(&self) -> usize {
        match self {
            Self::Sha256 => SHA256_HEX_LEN,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    algorithm: Algorithm,
    hex: String,
}

impl Digest {
    /// Computes the SHA-256 digest of `data`.
    pub fn of(data: &[u8]) -> Self {
        Self {
            algorithm: Algorithm::Sha256,
            hex: hex::encode(Sha256::digest(data)),
        }
    }

    /// Builds a digest from a finished hasher.
    pub(crate) fn from_hasher(hasher: Sha256) -> Self {
        Self {
            algorithm: Algorithm::Sha256,
            hex: hex::encode(hasher.finalize()),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Lowercase hex portion without the algorithm prefix.
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Returns true if `s` passes the pinned-reference check: exactly
    /// [`PINNED_DIGEST_LEN`] characters and a `sha256:` prefix.
    ///
    /// This is deliberately a shape check only; see [`Digest::from_str`] for
    /// full validation.
    pub fn is_pinned(s: &str) -> bool {
        s.len() == PINNED_DIGEST_LEN && s.starts_with(SHA256_PREFIX)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidDigest {
            digest: s.to_string(),
            reason: reason.to_string(),
        };

        let (algo, hex) = s
            .split_once(':')
            .ok_or_else(|| invalid("missing algorithm prefix"))?;

        let algorithm = match algo {
            "sha256" => Algorithm::Sha256,
            other => return Err(invalid(&format!("unsupported algorithm '{other}'"))),
        };

        if hex.len() != algorithm.hex_len() {
            return Err(invalid(&format!(
                "expected {} hex characters, got {}",
                algorithm.hex_len(),
                hex.len()
            )));
        }

        if !hex
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(invalid("hash must be lowercase hex"));
        }

        Ok(Self {
            algorithm,
            hex: hex.to_string(),
        })
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
