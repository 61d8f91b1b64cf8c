//! CLI logic for the ecdsl tool.
//!
//! `check` and `graph` compile every `.ec` document below a directory;
//! `fmt` formats individual documents. Warnings are logged as they are
//! found; errors are returned so the caller can render them and fail.

pub mod error_adapter;

mod args;
mod config;

pub use args::{Args, Command};
pub use config::ConfigError;

use std::{
    collections::HashMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, info, warn};
use thiserror::Error;
use walkdir::WalkDir;

use ecdsl::{
    CompiledOutput, Compiler, DocumentPath, EcdslError, FileDiagnostic, FsImportResolver,
    config::CompilerConfig, format_with,
};

use error_adapter::{diagnostic_reportables, render};

/// Errors that end a CLI run.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Ecdsl(#[from] EcdslError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to list documents under `{}`: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to write `{}`: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize graph: {0}")]
    Json(#[from] serde_json::Error),

    #[error("compilation failed with {} error(s)", diagnostics.len())]
    Compile {
        /// Error diagnostics only; warnings have already been logged.
        diagnostics: Vec<FileDiagnostic>,
        sources: HashMap<DocumentPath, String>,
    },

    #[error("{} file(s) are not formatted", .0.len())]
    Unformatted(Vec<PathBuf>),
}

/// Run the ecdsl CLI, writing command output to standard output.
///
/// # Errors
///
/// Returns [`CliError`] for configuration and I/O failures, for compiles
/// that report errors, and for `fmt --check` finding unformatted files.
pub fn run(args: &Args) -> Result<(), CliError> {
    let stdout = io::stdout();
    run_with_output(args, &mut stdout.lock())
}

/// Run the ecdsl CLI, writing command output to `out`.
///
/// # Errors
///
/// See [`run`].
pub fn run_with_output(args: &Args, out: &mut dyn Write) -> Result<(), CliError> {
    let config = config::load_config(args.config.as_ref())?;

    match &args.command {
        Command::Check { root } => {
            let (compiled, sources) = compile_root(root, config)?;
            report(compiled.diagnostics, sources)?;
            info!(nodes = compiled.graph.nodes.len(); "Check passed");
            Ok(())
        }
        Command::Graph {
            root,
            output,
            pretty,
        } => {
            let (compiled, sources) = compile_root(root, config)?;
            let json = if *pretty {
                serde_json::to_string_pretty(&compiled.graph)?
            } else {
                serde_json::to_string(&compiled.graph)?
            };
            match output {
                Some(path) => fs::write(path, json).map_err(|source| CliError::Write {
                    path: path.clone(),
                    source,
                })?,
                None => writeln!(out, "{json}").map_err(|source| CliError::Write {
                    path: PathBuf::from("<stdout>"),
                    source,
                })?,
            }
            report(compiled.diagnostics, sources)
        }
        Command::Fmt {
            paths,
            write,
            check,
        } => format_paths(paths, &config, *write, *check, out),
    }
}

/// Every `.ec` file under `root`, or `root` itself if it is a file, sorted.
fn discover(root: &Path) -> Result<Vec<PathBuf>, CliError> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry.depth() == 0
            || !entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with('.'))
    });
    for entry in walker {
        let entry = entry.map_err(|source| CliError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "ec") {
            files.push(entry.into_path());
        }
    }
    files.sort();
    debug!(root:? = root, documents = files.len(); "Discovered documents");
    Ok(files)
}

fn read(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| {
        EcdslError::Io {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

fn compile_root(
    root: &Path,
    config: CompilerConfig,
) -> Result<(CompiledOutput, HashMap<DocumentPath, String>), CliError> {
    let base = if root.is_file() {
        root.parent().unwrap_or(Path::new(""))
    } else {
        root
    };

    let mut sources = HashMap::new();
    for file in discover(root)? {
        let relative = file.strip_prefix(base).unwrap_or(&file);
        let text = read(&file)?;
        sources.insert(DocumentPath::new(relative.to_string_lossy()), text);
    }
    info!(root:? = root, documents = sources.len(); "Compiling documents");

    let compiler = Compiler::new(config).with_resolver(Arc::new(FsImportResolver::new(base)));
    let compiled = compiler.compile(
        sources
            .iter()
            .map(|(path, text)| (path.as_str(), text.as_str())),
    );
    Ok((compiled, sources))
}

/// Log warnings and fail on errors.
fn report(
    diagnostics: Vec<FileDiagnostic>,
    sources: HashMap<DocumentPath, String>,
) -> Result<(), CliError> {
    let (errors, warnings): (Vec<_>, Vec<_>) = diagnostics
        .into_iter()
        .partition(|d| d.diagnostic.severity().is_error());

    for reportable in diagnostic_reportables(&warnings, &sources) {
        warn!("{}", render(&reportable));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(CliError::Compile {
            diagnostics: errors,
            sources,
        })
    }
}

fn format_paths(
    paths: &[PathBuf],
    config: &CompilerConfig,
    write: bool,
    check: bool,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let mut unformatted = Vec::new();

    for path in paths {
        for file in discover(path)? {
            let text = read(&file)?;
            let formatted = format_with(&text, config.format());
            let changed = formatted != text;

            if check {
                if changed {
                    info!(file:? = file; "Not formatted");
                    unformatted.push(file);
                }
            } else if write {
                if changed {
                    fs::write(&file, &formatted).map_err(|source| CliError::Write {
                        path: file.clone(),
                        source,
                    })?;
                    info!(file:? = file; "Formatted");
                }
            } else {
                out.write_all(formatted.as_bytes())
                    .map_err(|source| CliError::Write {
                        path: PathBuf::from("<stdout>"),
                        source,
                    })?;
            }
        }
    }

    if unformatted.is_empty() {
        Ok(())
    } else {
        Err(CliError::Unformatted(unformatted))
    }
}
