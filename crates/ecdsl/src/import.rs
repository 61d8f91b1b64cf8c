//! Import resolution boundary.
//!
//! The compiler links the documents it is given. An import naming a document
//! outside that set is handed to an [`ImportResolver`] supplied by the host,
//! which may load it from disk, fetch it over the network or decline. Loaded
//! documents join the compile and are parsed and linked like any other.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::debug;
use thiserror::Error;

use ecdsl_core::path::DocumentPath;

/// Failure to load an import the resolver is responsible for.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("`{0}` is outside the import root")]
    OutsideRoot(String),

    #[error("{0}")]
    Other(String),
}

/// Loads documents for imports the compile set does not contain.
pub trait ImportResolver: Send + Sync {
    /// Source text of `specifier` as written in the document at `from`.
    ///
    /// The text is linked under `from.join(specifier)`. Returns `Ok(None)`
    /// when the resolver does not know the document; the import is then
    /// reported as unresolved.
    fn resolve(&self, from: &DocumentPath, specifier: &str) -> Result<Option<String>, ImportError>;
}

/// Resolves local imports against a directory on disk.
///
/// Remote specifiers are declined.
#[derive(Debug, Clone)]
pub struct FsImportResolver {
    root: PathBuf,
}

impl FsImportResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ImportResolver for FsImportResolver {
    fn resolve(&self, from: &DocumentPath, specifier: &str) -> Result<Option<String>, ImportError> {
        let path = from.join(specifier);
        if DocumentPath::is_remote_specifier(path.as_str()) {
            return Ok(None);
        }

        let relative = path.as_str().trim_start_matches('/');
        if relative.split('/').next() == Some("..") {
            return Err(ImportError::OutsideRoot(path.to_string()));
        }

        let file = self.root.join(relative);
        match fs::read_to_string(&file) {
            Ok(source) => {
                debug!(path = path.as_str(), file:? = file; "Loaded import from disk");
                Ok(Some(source))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ImportError::Io { path: file, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_resolver_reads_relative_to_importer() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("shared")).unwrap();
        fs::write(dir.path().join("shared/events.ec"), "event OrderPlaced").unwrap();

        let resolver = FsImportResolver::new(dir.path());
        let source = resolver
            .resolve(&DocumentPath::new("orders/service.ec"), "../shared/events.ec")
            .unwrap();

        assert_eq!(source.as_deref(), Some("event OrderPlaced"));
    }

    #[test]
    fn test_fs_resolver_declines_missing_and_remote() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = FsImportResolver::new(dir.path());
        let from = DocumentPath::new("main.ec");

        assert!(resolver.resolve(&from, "./missing.ec").unwrap().is_none());
        assert!(
            resolver
                .resolve(&from, "https://example.com/events.ec")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_fs_resolver_rejects_escaping_root() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = FsImportResolver::new(dir.path());

        let err = resolver
            .resolve(&DocumentPath::new("main.ec"), "../outside.ec")
            .unwrap_err();
        assert!(matches!(err, ImportError::OutsideRoot(path) if path == "../outside.ec"));
    }
}
