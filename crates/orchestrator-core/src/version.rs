// Copyright (c) 2025 Platform Engineering
// SPDX-License-Identifier: Apache-2.0

//! Minimal SemVer parsing and caret-range comparison for platform
//! manifest compatibility checks. See SPEC_FULL.md §4.D.
//!
//! No general-purpose semver crate appears anywhere in the dependency
//! corpus this workspace draws on, so this is a small hand-rolled
//! comparator covering exactly what manifest compatibility needs:
//! `major.minor.patch` parsing and `^x.y.z` / bare comparison operators.

use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let core = raw.split(['-', '+']).next().unwrap_or(raw);
        let mut parts = core.split('.');
        let major = Self::parse_component(parts.next(), raw)?;
        let minor = Self::parse_component(parts.next(), raw)?;
        let patch = Self::parse_component(parts.next(), raw)?;
        if parts.next().is_some() {
            return Err(format!("invalid version '{raw}': too many components"));
        }
        Ok(Version { major, minor, patch })
    }

    fn parse_component(part: Option<&str>, raw: &str) -> Result<u64, String> {
        part.ok_or_else(|| format!("invalid version '{raw}': missing component"))?
            .parse()
            .map_err(|_| format!("invalid version '{raw}': non-numeric component"))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

/// A parsed compatibility requirement: either a caret range (`^1.2.0`,
/// meaning `>=1.2.0, <2.0.0`, or `<0.(minor+1).0` before 1.0) or a bare
/// comparison (`>=1.0.0`, `=1.2.3`).
#[derive(Debug, Clone)]
pub enum Requirement {
    Caret(Version),
    Exact(Version),
    AtLeast(Version),
    LessThan(Version),
}

impl Requirement {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix('^') {
            return Ok(Requirement::Caret(Version::parse(rest)?));
        }
        if let Some(rest) = raw.strip_prefix(">=") {
            return Ok(Requirement::AtLeast(Version::parse(rest.trim())?));
        }
        if let Some(rest) = raw.strip_prefix('<') {
            return Ok(Requirement::LessThan(Version::parse(rest.trim())?));
        }
        if let Some(rest) = raw.strip_prefix('=') {
            return Ok(Requirement::Exact(Version::parse(rest.trim())?));
        }
        Ok(Requirement::Exact(Version::parse(raw)?))
    }

    pub fn satisfied_by(&self, candidate: &Version) -> bool {
        match self {
            Requirement::Exact(v) => candidate == v,
            Requirement::AtLeast(v) => candidate >= v,
            Requirement::LessThan(v) => candidate < v,
            Requirement::Caret(v) => {
                if candidate < v {
                    return false;
                }
                if v.major > 0 {
                    candidate.major == v.major
                } else if v.minor > 0 {
                    candidate.major == 0 && candidate.minor == v.minor
                } else {
                    candidate.major == 0 && candidate.minor == 0 && candidate.patch == v.patch
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_versions() {
        let v = Version::parse("1.2.3").unwrap();
        assert_eq!(v, Version { major: 1, minor: 2, patch: 3 });
    }

    #[test]
    fn rejects_malformed_versions() {
        assert!(Version::parse("1.2").is_err());
        assert!(Version::parse("1.2.x").is_err());
        assert!(Version::parse("1.2.3.4").is_err());
    }

    #[test]
    fn caret_allows_minor_and_patch_bumps_within_major() {
        let req = Requirement::parse("^1.2.0").unwrap();
        assert!(req.satisfied_by(&Version::parse("1.2.0").unwrap()));
        assert!(req.satisfied_by(&Version::parse("1.9.9").unwrap()));
        assert!(!req.satisfied_by(&Version::parse("2.0.0").unwrap()));
        assert!(!req.satisfied_by(&Version::parse("1.1.9").unwrap()));
    }

    #[test]
    fn caret_before_1_0_is_minor_locked() {
        let req = Requirement::parse("^0.3.0").unwrap();
        assert!(req.satisfied_by(&Version::parse("0.3.5").unwrap()));
        assert!(!req.satisfied_by(&Version::parse("0.4.0").unwrap()));
    }

    #[test]
    fn at_least_and_exact() {
        let at_least = Requirement::parse(">=1.0.0").unwrap();
        assert!(at_least.satisfied_by(&Version::parse("5.0.0").unwrap()));

        let exact = Requirement::parse("=1.0.0").unwrap();
        assert!(!exact.satisfied_by(&Version::parse("1.0.1").unwrap()));
    }

    #[test]
    fn less_than_bound() {
        let req = Requirement::parse("<2.0.0").unwrap();
        assert!(req.satisfied_by(&Version::parse("1.9.9").unwrap()));
        assert!(!req.satisfied_by(&Version::parse("2.0.0").unwrap()));
    }
}
