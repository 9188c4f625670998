//! Semantic version arithmetic.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing or bumping versions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// The bump kind is not one of major, minor or patch.
    #[error("Invalid bump kind: {0} (expected major, minor or patch)")]
    InvalidBumpKind(String),

    /// The text is not three dot-separated non-negative integers.
    #[error("Malformed version: {0:?} (expected MAJOR.MINOR.PATCH)")]
    MalformedVersion(String),

    /// The bumped component does not fit in a `u64`.
    #[error("Cannot apply a {kind} bump to {version}: component overflow")]
    Overflow {
        /// The version being bumped.
        version: SemVer,
        /// The bump that overflowed.
        kind: BumpKind,
    },
}

/// A three-component semantic version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SemVer {
    /// Incremented for incompatible changes.
    pub major: u64,
    /// Incremented for backwards compatible features.
    pub minor: u64,
    /// Incremented for backwards compatible fixes.
    pub patch: u64,
}

impl SemVer {
    /// Creates a version from its components.
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses a tag name such as `v1.2.3` or `1.2.3`.
    pub fn parse_tag(tag: &str) -> Result<Self, VersionError> {
        tag.strip_prefix('v').unwrap_or(tag).parse()
    }

    /// Returns the version reached by applying `kind` to this version.
    pub fn bump(self, kind: BumpKind) -> Result<Self, VersionError> {
        let overflow = || VersionError::Overflow {
            version: self,
            kind,
        };
        match kind {
            BumpKind::Major => Ok(Self::new(self.major.checked_add(1).ok_or_else(overflow)?, 0, 0)),
            BumpKind::Minor => Ok(Self::new(
                self.major,
                self.minor.checked_add(1).ok_or_else(overflow)?,
                0,
            )),
            BumpKind::Patch => Ok(Self::new(
                self.major,
                self.minor,
                self.patch.checked_add(1).ok_or_else(overflow)?,
            )),
        }
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemVer {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || VersionError::MalformedVersion(s.to_string());

        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(malformed());
        }

        let mut components = [0_u64; 3];
        for (slot, part) in components.iter_mut().zip(&parts) {
            // u64::from_str accepts a leading '+', which is not valid here
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            *slot = part.parse().map_err(|_| malformed())?;
        }

        Ok(Self::new(components[0], components[1], components[2]))
    }
}

impl Serialize for SemVer {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemVer {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Which version component a release increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpKind {
    /// Incompatible changes.
    Major,
    /// Backwards compatible features.
    Minor,
    /// Backwards compatible fixes.
    Patch,
}

impl BumpKind {
    /// Returns the lowercase keyword for this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Patch => "patch",
        }
    }
}

impl fmt::Display for BumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BumpKind {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "patch" => Ok(Self::Patch),
            other => Err(VersionError::InvalidBumpKind(other.to_string())),
        }
    }
}

/// The bump a caller asks a release for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpRequest {
    /// Derive the bump from the commit history.
    Auto,
    /// Use this kind as-is.
    #[serde(untagged)]
    Kind(BumpKind),
}

impl fmt::Display for BumpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Kind(kind) => kind.fmt(f),
        }
    }
}

impl FromStr for BumpRequest {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "auto" {
            Ok(Self::Auto)
        } else {
            s.parse().map(Self::Kind)
        }
    }
}

/// Parses `text` as a semantic version.
pub fn parse(text: &str) -> Result<SemVer, VersionError> {
    text.parse()
}

/// Applies a bump given by name.
pub fn bump(current: SemVer, kind: &str) -> Result<SemVer, VersionError> {
    current.bump(kind.parse()?)
}

/// Returns true iff `proposed` is exactly the version `kind` produces from `current`.
pub fn validate_progression(current: SemVer, proposed: SemVer, kind: BumpKind) -> bool {
    current.bump(kind).is_ok_and(|next| next == proposed)
}
