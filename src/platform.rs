//! Platform constraint table.
//!
//! Maps OCI `os` / `architecture` strings onto the values a build system can
//! express as compatibility constraints. Platforms outside this table are
//! still walked, they just do not contribute to the discovered set.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    Windows,
    Darwin,
    Freebsd,
}

impl Os {
    /// Looks up an OCI `os` value.
    pub fn from_oci(s: &str) -> Option<Self> {
        match s {
            "linux" => Some(Self::Linux),
            "windows" => Some(Self::Windows),
            "darwin" => Some(Self::Darwin),
            "freebsd" => Some(Self::Freebsd),
            _ => None,
        }
    }

    pub fn as_oci_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
            Self::Darwin => "darwin",
            Self::Freebsd => "freebsd",
        }
    }
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    Amd64,
    Arm64,
    Arm,
    #[serde(rename = "386")]
    I386,
    Ppc64le,
    S390x,
    Riscv64,
}

impl Arch {
    /// Looks up an OCI `architecture` value.
    pub fn from_oci(s: &str) -> Option<Self> {
        match s {
            "amd64" => Some(Self::Amd64),
            "arm64" => Some(Self::Arm64),
            "arm" => Some(Self::Arm),
            "386" => Some(Self::I386),
            "ppc64le" => Some(Self::Ppc64le),
            "s390x" => Some(Self::S390x),
            "riscv64" => Some(Self::Riscv64),
            _ => None,
        }
    }

    pub fn as_oci_str(&self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
            Self::Arm => "arm",
            Self::I386 => "386",
            Self::Ppc64le => "ppc64le",
            Self::S390x => "s390x",
            Self::Riscv64 => "riscv64",
        }
    }
}

/// A recognized `{os, arch}` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Returns a platform only if both values are in the table.
    pub fn recognize(os: &str, arch: &str) -> Option<Self> {
        Some(Self {
            os: Os::from_oci(os)?,
            arch: Arch::from_oci(arch)?,
        })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os.as_oci_str(), self.arch.as_oci_str())
    }
}

/// Raw platform object as it appears in an index entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSpec {
    pub os: String,
    pub architecture: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl PlatformSpec {
    pub fn recognize(&self) -> Option<Platform> {
        Platform::recognize(&self.os, &self.architecture)
    }
}
