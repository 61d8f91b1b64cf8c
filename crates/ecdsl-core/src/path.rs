//! Workspace document paths.
//!
//! Documents are addressed by forward-slash paths relative to the workspace
//! root. Paths are normalized on construction so that `./a/../b.ec` and
//! `b.ec` name the same document, and they order lexically, which fixes the
//! document processing order used for diagnostics.

use std::fmt;

use serde::Serialize;

/// A normalized path naming one document in a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DocumentPath(String);

impl DocumentPath {
    /// Creates a normalized document path.
    ///
    /// Backslashes become forward slashes, `.` segments are dropped and `..`
    /// segments consume their parent where one exists. Remote URLs keep their
    /// scheme and authority; only the part after the authority is normalized.
    pub fn new(path: impl AsRef<str>) -> Self {
        let path = path.as_ref().trim();
        if Self::is_remote_specifier(path) {
            if let Some((scheme, rest)) = path.split_once("://") {
                let split = rest.find('/').unwrap_or(rest.len());
                let (authority, remote_path) = rest.split_at(split);
                return Self(format!(
                    "{scheme}://{authority}{}",
                    normalize_segments(remote_path, true)
                ));
            }
        }
        let path = path.replace('\\', "/");
        let absolute = path.starts_with('/');
        Self(normalize_segments(&path, absolute))
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the directory portion of the path, without a trailing slash.
    pub fn parent(&self) -> &str {
        self.0.rsplit_once('/').map_or("", |(parent, _)| parent)
    }

    /// Returns `true` if an import specifier points outside the workspace.
    pub fn is_remote_specifier(specifier: &str) -> bool {
        let lower = specifier.trim().to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }

    /// Resolves a local import specifier against this document's directory.
    ///
    /// # Examples
    ///
    /// ```
    /// # use ecdsl_core::path::DocumentPath;
    /// let importer = DocumentPath::new("domains/orders/service.ec");
    /// assert_eq!(importer.join("../shared/events.ec").as_str(), "domains/shared/events.ec");
    /// assert_eq!(importer.join("/root.ec").as_str(), "/root.ec");
    /// ```
    pub fn join(&self, specifier: &str) -> DocumentPath {
        let specifier = specifier.trim();
        if specifier.starts_with('/') || Self::is_remote_specifier(specifier) {
            return DocumentPath::new(specifier);
        }
        let parent = self.parent();
        if parent.is_empty() {
            DocumentPath::new(specifier)
        } else {
            DocumentPath::new(format!("{parent}/{specifier}"))
        }
    }
}

/// Joins the segments of `path`, resolving `.` and `..`.
///
/// An absolute path keeps its leading slash and never climbs above it.
fn normalize_segments(path: &str, absolute: bool) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|last| *last != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    if absolute && !(joined.is_empty() && path.is_empty()) {
        format!("/{joined}")
    } else {
        joined
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DocumentPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for DocumentPath {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}
