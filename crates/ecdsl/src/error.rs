//! Error types for host-facing operations.
//!
//! Malformed DSL input never produces an [`EcdslError`]; it is reported as
//! diagnostics. These errors cover the environment around the compiler,
//! such as reading files from disk.

use std::{io, path::PathBuf};

use thiserror::Error;

/// The main error type for ecdsl host operations.
#[derive(Debug, Error)]
pub enum EcdslError {
    #[error("failed to read `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("`{}` is not inside the workspace root `{}`", path.display(), root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },
}
