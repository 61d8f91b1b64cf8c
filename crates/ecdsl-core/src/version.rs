//! Version handling for definitions and references.
//!
//! Definition versions are free-form strings in source. Before they are
//! compared they are coerced to semantic versions: `1` becomes `1.0.0`,
//! `v1.2` becomes `1.2.0`. Strings that cannot be coerced still take part in
//! ordering through [`VersionKey`], which ranks them below every semantic
//! version and compares them lexicographically among themselves.

use std::{cmp::Ordering, fmt};

use semver::{BuildMetadata, Version, VersionReq};

/// Coerces a version string into a semantic version.
///
/// Accepts one to three numeric components, an optional `v`/`V` prefix, and
/// an optional pre-release or build suffix.
///
/// # Examples
///
/// ```
/// # use ecdsl_core::version::coerce;
/// assert_eq!(coerce("1").unwrap().to_string(), "1.0.0");
/// assert_eq!(coerce("v2.1").unwrap().to_string(), "2.1.0");
/// assert_eq!(coerce("1.0.0-beta.1").unwrap().to_string(), "1.0.0-beta.1");
/// assert!(coerce("latest").is_none());
/// ```
pub fn coerce(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split);

    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() > 3
        || parts
            .iter()
            .any(|part| part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }

    let mut numbers = [0u64; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        *slot = part.parse().ok()?;
    }
    let [major, minor, patch] = numbers;
    Version::parse(&format!("{major}.{minor}.{patch}{suffix}")).ok()
}

/// Returns `true` if two version strings denote the same version.
///
/// Coercible strings are compared by semantic-version precedence, so `"1"`
/// equals `"1.0.0"`. Anything else falls back to trimmed string equality.
pub fn versions_equal(a: &str, b: &str) -> bool {
    match (coerce(a), coerce(b)) {
        (Some(a), Some(b)) => a.cmp_precedence(&b) == Ordering::Equal,
        _ => a.trim() == b.trim(),
    }
}

/// Coerces `raw` and drops build metadata, which has no bearing on
/// precedence.
fn precedence_key(raw: &str) -> Option<Version> {
    coerce(raw).map(|mut version| {
        version.build = BuildMetadata::EMPTY;
        version
    })
}

/// Canonical spelling of a version, used as an identity key.
///
/// Build metadata is dropped, so `1.0.0+a` and `1.0.0` share a key.
pub fn normalize(raw: &str) -> String {
    precedence_key(raw)
        .map(|version| version.to_string())
        .unwrap_or_else(|| raw.trim().to_string())
}

/// Total ordering key for optional version strings.
///
/// Missing versions sort first, then non-semver strings (lexicographic),
/// then semantic versions by precedence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum VersionKey {
    Missing,
    Text(String),
    Semver(Version),
}

impl VersionKey {
    /// Builds the ordering key for an optional version string.
    pub fn of(raw: Option<&str>) -> Self {
        match raw {
            None => VersionKey::Missing,
            Some(raw) => match precedence_key(raw) {
                Some(version) => VersionKey::Semver(version),
                None => VersionKey::Text(raw.trim().to_string()),
            },
        }
    }
}

/// Compares two optional versions using the pipeline-wide ordering.
pub fn compare_versions(a: Option<&str>, b: Option<&str>) -> Ordering {
    VersionKey::of(a).cmp(&VersionKey::of(b))
}

/// The version part of a reference (`Orders@1.2.0`, `Orders@^1`, `Orders`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VersionSelector {
    /// No selector, or the literal `latest`.
    #[default]
    Latest,
    /// An exact version, compared after coercion.
    Exact(String),
    /// A semantic-version range such as `^1`, `>1`, `1.x`.
    Range { raw: String, req: VersionReq },
}

impl VersionSelector {
    /// Classifies a selector string.
    ///
    /// Exact versions win over ranges, so `1` selects `1.0.0` rather than
    /// `^1`. Strings that are neither are kept as exact selectors and
    /// reported by [`is_malformed`](Self::is_malformed).
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("latest") {
            return VersionSelector::Latest;
        }
        if coerce(trimmed).is_some() {
            return VersionSelector::Exact(trimmed.to_string());
        }
        match VersionReq::parse(trimmed) {
            Ok(req) => VersionSelector::Range {
                raw: trimmed.to_string(),
                req,
            },
            Err(_) => VersionSelector::Exact(trimmed.to_string()),
        }
    }

    /// Returns `true` for an exact selector that is not a valid version.
    pub fn is_malformed(&self) -> bool {
        matches!(self, VersionSelector::Exact(raw) if coerce(raw).is_none())
    }

    /// Returns `true` if this selector is `latest` or absent.
    pub fn is_latest(&self) -> bool {
        matches!(self, VersionSelector::Latest)
    }

    /// Returns the selector text, or `None` for `latest`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            VersionSelector::Latest => None,
            VersionSelector::Exact(raw) | VersionSelector::Range { raw, .. } => Some(raw),
        }
    }

    /// Tests whether a definition version satisfies this selector.
    pub fn matches(&self, version: Option<&str>) -> bool {
        match self {
            VersionSelector::Latest => true,
            VersionSelector::Exact(expected) => {
                version.is_some_and(|actual| versions_equal(actual, expected))
            }
            VersionSelector::Range { req, .. } => version
                .and_then(coerce)
                .is_some_and(|actual| req.matches(&actual)),
        }
    }

    /// Picks the candidate this selector resolves to.
    ///
    /// Among matching candidates the maximum version wins; equal versions
    /// keep the earliest candidate so the result follows input order.
    pub fn select<'c, T>(
        &self,
        candidates: &'c [T],
        version_of: impl Fn(&T) -> Option<&str>,
    ) -> Option<&'c T> {
        candidates
            .iter()
            .filter(|candidate| self.matches(version_of(*candidate)))
            .reduce(|best, candidate| {
                if compare_versions(version_of(candidate), version_of(best)) == Ordering::Greater {
                    candidate
                } else {
                    best
                }
            })
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str().unwrap_or("latest"))
    }
}
