//! Artifact versions.
//!
//! Versions are semantic versions compared by precedence: numeric major,
//! minor and patch, then pre-release identifiers. Build metadata is rejected:
//! it never affects precedence, and `+` is not allowed in registry keys.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::de::{self, Unexpected, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ModelError;

/// Totally ordered artifact version.
#[derive(Debug, Clone)]
pub struct BaitVersion(semver::Version);

impl BaitVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(semver::Version::new(major, minor, patch))
    }

    /// Parse a version string.
    ///
    /// Accepts `MAJOR`, `MAJOR.MINOR` and full semantic versions; missing
    /// components are zero. A leading `v` is ignored. Build metadata
    /// (`1.0.0+build.7`) is an error.
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let core_end = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
        let (core, suffix) = trimmed.split_at(core_end);

        let padded = match core.split('.').count() {
            1 => format!("{core}.0.0{suffix}"),
            2 => format!("{core}.0{suffix}"),
            _ => trimmed.to_string(),
        };

        let version = semver::Version::parse(&padded).map_err(|e| ModelError::InvalidVersion {
            value: raw.to_string(),
            reason: e.to_string(),
        })?;
        if !version.build.is_empty() {
            return Err(ModelError::InvalidVersion {
                value: raw.to_string(),
                reason: "build metadata is not allowed".to_string(),
            });
        }
        Ok(Self(version))
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    pub fn patch(&self) -> u64 {
        self.0.patch
    }

    pub fn is_prerelease(&self) -> bool {
        !self.0.pre.is_empty()
    }
}

impl Default for BaitVersion {
    fn default() -> Self {
        Self::new(0, 1, 0)
    }
}

impl PartialEq for BaitVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for BaitVersion {}

impl PartialOrd for BaitVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BaitVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp_precedence(&other.0)
    }
}

impl Hash for BaitVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Display for BaitVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BaitVersion {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for BaitVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BaitVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(VersionVisitor)
    }
}

/// Manifests written by hand often carry `version: 2`, which YAML hands over
/// as an integer. Floats are refused: `1.10` arrives as `1.1`.
struct VersionVisitor;

impl<'de> Visitor<'de> for VersionVisitor {
    type Value = BaitVersion;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a quoted semantic version string or an integer major version")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        BaitVersion::parse(v).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(BaitVersion::new(v, 0, 0))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u64::try_from(v)
            .map(|major| BaitVersion::new(major, 0, 0))
            .map_err(|_| E::custom(format!("negative version {v}")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Err(E::invalid_type(Unexpected::Float(v), &self))
    }
}
