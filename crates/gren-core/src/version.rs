//! Semantic versions and closed-open version ranges.
//!
//! A range is written `1.2.0 <= v < 2.0.0` and contains every version `v`
//! with `lower <= v < upper`. Ordering is plain lexicographic on
//! `(major, minor, patch)`.

use std::cmp::{max, min};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors produced when building versions or ranges from raw parts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("invalid version '{0}', expected MAJOR.MINOR.PATCH")]
    InvalidVersion(String),

    #[error("invalid version range '{0}', expected '<lower> <= v < <upper>'")]
    InvalidRange(String),

    #[error("lower bound {lower} is greater than upper bound {upper}")]
    InvertedBounds {
        lower: SemanticVersion,
        upper: SemanticVersion,
    },
}

/// A `major.minor.patch` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemanticVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SemanticVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `"1.2.3"`. Signs, empty parts, leading zeros and extra parts
    /// are rejected.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split('.');
        let major = parse_part(parts.next()?)?;
        let minor = parse_part(parts.next()?)?;
        let patch = parse_part(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, minor, patch))
    }
}

fn parse_part(part: &str) -> Option<u32> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if part.len() > 1 && part.starts_with('0') {
        return None;
    }
    part.parse().ok()
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemanticVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| VersionError::InvalidVersion(s.to_string()))
    }
}

impl Serialize for SemanticVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemanticVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The versions `v` with `lower <= v < upper`.
///
/// `lower <= upper` always holds; a range with `lower == upper` is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemanticVersionRange {
    lower: SemanticVersion,
    upper: SemanticVersion,
}

impl SemanticVersionRange {
    /// Build a range, failing when `lower > upper`.
    pub fn new(lower: SemanticVersion, upper: SemanticVersion) -> Result<Self, VersionError> {
        if lower > upper {
            return Err(VersionError::InvertedBounds { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    /// The range of versions API-compatible with `version`.
    ///
    /// Before 1.0.0 a minor bump may break, so `0.4.2` gives `0.4.0 <= v < 0.5.0`;
    /// afterwards `1.2.4` gives `1.2.0 <= v < 2.0.0`.
    pub fn compatible(version: SemanticVersion) -> Self {
        let lower = SemanticVersion::new(version.major, version.minor, 0);
        let upper = if version.major == 0 {
            SemanticVersion::new(0, version.minor.saturating_add(1), 0)
        } else {
            SemanticVersion::new(version.major.saturating_add(1), 0, 0)
        };
        Self { lower, upper }
    }

    /// The range containing exactly `version`.
    pub fn exact(version: SemanticVersion) -> Self {
        let upper = SemanticVersion::new(
            version.major,
            version.minor,
            version.patch.saturating_add(1),
        );
        Self {
            lower: version,
            upper,
        }
    }

    pub fn lower(&self) -> SemanticVersion {
        self.lower
    }

    pub fn upper(&self) -> SemanticVersion {
        self.upper
    }

    pub fn contains(&self, version: SemanticVersion) -> bool {
        self.lower <= version && version < self.upper
    }

    /// The tightest range inside both `self` and `other`, or `None` when they
    /// share no version.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let lower = max(self.lower, other.lower);
        let upper = min(self.upper, other.upper);
        if lower >= upper {
            return None;
        }
        Some(Self { lower, upper })
    }

    /// Parse `"<lower> <= v < <upper>"`. Whitespace is insignificant.
    pub fn parse(text: &str) -> Option<Self> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let (lower, upper) = compact.split_once("<=v<")?;
        let lower = SemanticVersion::parse(lower)?;
        let upper = SemanticVersion::parse(upper)?;
        Self::new(lower, upper).ok()
    }
}

impl fmt::Display for SemanticVersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <= v < {}", self.lower, self.upper)
    }
}

impl FromStr for SemanticVersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| VersionError::InvalidRange(s.to_string()))
    }
}

impl Serialize for SemanticVersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemanticVersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
