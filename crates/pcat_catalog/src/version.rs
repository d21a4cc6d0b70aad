//! Semantic versions and version constraints.
//!
//! Versions follow semver, with `1` and `1.2` accepted as shorthands for
//! `1.0.0` and `1.2.0`. A constraint is a comma-separated conjunction of
//! comparators. A bare version (`1.2`, `1.2.3`) is an exact pin; anything
//! with an operator (`^1.0`, `>=1.0, <2`, `~1.2`, `1.x`, `*`) is a range.

use std::fmt;
use std::str::FromStr;

use semver::{BuildMetadata, Version, VersionReq};
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};

/// Parse a version string, padding missing minor/patch components.
pub fn parse_version(input: &str) -> CatalogResult<Version> {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(&pad_version(trimmed)).map_err(|e| CatalogError::InvalidVersion {
        input: input.to_string(),
        message: e.to_string(),
    })
}

fn pad_version(s: &str) -> String {
    let split_at = s.find(['-', '+']).unwrap_or(s.len());
    let (core, rest) = s.split_at(split_at);
    match core.split('.').count() {
        1 => format!("{core}.0.0{rest}"),
        2 => format!("{core}.0{rest}"),
        _ => s.to_string(),
    }
}

/// Split `name@constraint` or `name>=1.0` into its parts.
///
/// A missing constraint means any version.
pub fn parse_requirement(input: &str) -> CatalogResult<(String, VersionConstraint)> {
    let input = input.trim();
    let (name, constraint) = match input.find('@') {
        Some(at) => (&input[..at], &input[at + 1..]),
        None => match input.find(|c: char| "^~=<>* ".contains(c)) {
            Some(pos) => (&input[..pos], &input[pos..]),
            None => (input, ""),
        },
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(CatalogError::InvalidConstraint {
            input: input.to_string(),
            message: "missing template name".to_string(),
        });
    }
    Ok((name.to_string(), constraint.parse()?))
}

/// A conjunction of version comparators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionConstraint {
    raw: String,
    reqs: Vec<VersionReq>,
}

impl VersionConstraint {
    /// Constraint accepting every version.
    pub fn any() -> Self {
        Self {
            raw: "*".to_string(),
            reqs: Vec::new(),
        }
    }

    /// Constraint pinning exactly one version.
    pub fn exact(version: &Version) -> Self {
        let mut pinned = version.clone();
        pinned.build = BuildMetadata::EMPTY;
        let req = VersionReq::parse(&format!("={pinned}")).unwrap_or(VersionReq::STAR);
        Self {
            raw: format!("={pinned}"),
            reqs: vec![req],
        }
    }

    /// Check whether a version satisfies every comparator.
    pub fn matches(&self, version: &Version) -> bool {
        self.reqs.iter().all(|req| req.matches(version))
    }

    /// Combine two constraints; the result matches what both match.
    pub fn intersect(&self, other: &VersionConstraint) -> VersionConstraint {
        if self.is_any() {
            return other.clone();
        }
        if other.is_any() || self == other {
            return self.clone();
        }
        let mut reqs = self.reqs.clone();
        reqs.extend(other.reqs.iter().cloned());
        VersionConstraint {
            raw: format!("{}, {}", self.raw, other.raw),
            reqs,
        }
    }

    pub fn is_any(&self) -> bool {
        self.reqs.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Default for VersionConstraint {
    fn default() -> Self {
        Self::any()
    }
}

fn parse_comparator(piece: &str) -> Result<VersionReq, String> {
    let starts_bare = piece.starts_with(|c: char| c.is_ascii_digit())
        || (piece.starts_with('v') && piece[1..].starts_with(|c: char| c.is_ascii_digit()));
    let core = piece.split(['-', '+']).next().unwrap_or(piece);
    let wildcard = core.split('.').any(|part| matches!(part, "*" | "x" | "X"));
    if starts_bare && !wildcard {
        let mut version = parse_version(piece).map_err(|e| e.to_string())?;
        version.build = BuildMetadata::EMPTY;
        VersionReq::parse(&format!("={version}")).map_err(|e| e.to_string())
    } else {
        VersionReq::parse(piece).map_err(|e| e.to_string())
    }
}

impl FromStr for VersionConstraint {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.is_empty() || raw == "*" || raw.eq_ignore_ascii_case("latest") {
            return Ok(Self::any());
        }

        let mut reqs = Vec::new();
        for piece in raw.split(',').map(str::trim) {
            if piece.is_empty() {
                return Err(CatalogError::InvalidConstraint {
                    input: s.to_string(),
                    message: "empty comparator".to_string(),
                });
            }
            let req = parse_comparator(piece).map_err(|message| CatalogError::InvalidConstraint {
                input: s.to_string(),
                message,
            })?;
            reqs.push(req);
        }

        Ok(Self {
            raw: raw.to_string(),
            reqs,
        })
    }
}

impl TryFrom<String> for VersionConstraint {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionConstraint> for String {
    fn from(value: VersionConstraint) -> Self {
        value.raw
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
