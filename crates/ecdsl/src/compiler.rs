//! Compiler facade: parse, link, validate and project a set of documents.
//!
//! Documents are parsed in parallel since parsing depends on nothing but a
//! document's own text. Linking is sequential and starts once every parse
//! has finished, because resolving any reference needs the complete export
//! table. Everything after linking reads the finished table.

use std::{
    collections::{BTreeMap, HashSet},
    fmt, fs,
    path::Path,
    sync::Arc,
};

use log::{debug, info, warn};
use rayon::prelude::*;

use ecdsl_core::{graph::DslGraph, path::DocumentPath};
use ecdsl_parser::{Diagnostic, ErrorCode};

use crate::{
    config::CompilerConfig,
    document::ParsedDocument,
    error::EcdslError,
    graph::compile_graph,
    import::ImportResolver,
    scope::{SymbolTable, compute_global_scope},
    validate::Validator,
};

/// A diagnostic together with the document it was reported in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiagnostic {
    pub path: DocumentPath,
    pub diagnostic: Diagnostic,
}

impl FileDiagnostic {
    pub fn new(path: DocumentPath, diagnostic: Diagnostic) -> Self {
        Self { path, diagnostic }
    }
}

/// Result of one compile: the best graph that could be built plus every
/// diagnostic, sorted by document path and position.
#[derive(Debug, Clone, Default)]
pub struct CompiledOutput {
    pub graph: DslGraph,
    pub diagnostics: Vec<FileDiagnostic>,
}

impl CompiledOutput {
    /// Returns `true` if any diagnostic is an error.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.diagnostic.severity().is_error())
    }

    /// Diagnostics reported in the document at `path`.
    pub fn diagnostics_for<'a>(
        &'a self,
        path: &'a DocumentPath,
    ) -> impl Iterator<Item = &'a Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |d| &d.path == path)
            .map(|d| &d.diagnostic)
    }
}

/// Compiles document sets with a fixed configuration.
///
/// # Examples
///
/// ```
/// use ecdsl::Compiler;
///
/// let output = Compiler::default().compile([(
///     "shop.ec",
///     "service Orders { sends event OrderCreated }\nevent OrderCreated",
/// )]);
///
/// assert!(output.diagnostics.is_empty());
/// assert!(output.graph.edge("service:Orders-sends-event:OrderCreated").is_some());
/// ```
#[derive(Clone, Default)]
pub struct Compiler {
    config: CompilerConfig,
    resolver: Option<Arc<dyn ImportResolver>>,
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("config", &self.config)
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config,
            resolver: None,
        }
    }

    /// Load imports missing from the compile set through `resolver`.
    pub fn with_resolver(mut self, resolver: Arc<dyn ImportResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile `(path, text)` pairs. When a path appears more than once the
    /// last text wins.
    pub fn compile<I, P, S>(&self, sources: I) -> CompiledOutput
    where
        I: IntoIterator<Item = (P, S)>,
        P: AsRef<str>,
        S: Into<String>,
    {
        let sources: BTreeMap<DocumentPath, String> = sources
            .into_iter()
            .map(|(path, text)| (DocumentPath::new(path), text.into()))
            .collect();

        let mut documents = parse_all(sources.into_iter().collect());
        let import_diagnostics = self.load_imports(&mut documents);
        documents.sort_by(|a, b| a.path().cmp(b.path()));

        let mut linked = link(&documents, &self.config, 1);
        linked.diagnostics.extend(import_diagnostics);
        sort_diagnostics(&mut linked.diagnostics);

        info!(
            documents = documents.len(),
            diagnostics = linked.diagnostics.len();
            "Compiled workspace"
        );

        CompiledOutput {
            graph: linked.graph,
            diagnostics: linked.diagnostics,
        }
    }

    /// Read `files` from disk and compile them as documents named by their
    /// path relative to `root`.
    pub fn compile_files<P: AsRef<Path>>(
        &self,
        root: &Path,
        files: &[P],
    ) -> Result<CompiledOutput, EcdslError> {
        let mut sources = Vec::with_capacity(files.len());
        for file in files {
            let file = file.as_ref();
            let relative = file
                .strip_prefix(root)
                .map_err(|_| EcdslError::OutsideRoot {
                    path: file.to_path_buf(),
                    root: root.to_path_buf(),
                })?;
            let text = fs::read_to_string(file).map_err(|source| EcdslError::Io {
                path: file.to_path_buf(),
                source,
            })?;
            sources.push((relative.to_string_lossy().into_owned(), text));
        }
        Ok(self.compile(sources))
    }

    /// Fetch imports that name documents outside the compile set, round by
    /// round, until nothing new is loaded or the depth limit is reached.
    fn load_imports(&self, documents: &mut Vec<ParsedDocument>) -> Vec<FileDiagnostic> {
        let Some(resolver) = &self.resolver else {
            return Vec::new();
        };

        let mut diagnostics = Vec::new();
        let mut known: HashSet<DocumentPath> =
            documents.iter().map(|d| d.path().clone()).collect();
        let mut pending: Vec<usize> = (0..documents.len()).collect();

        for round in 0..self.config.imports().max_depth() {
            let mut loaded: Vec<(DocumentPath, String)> = Vec::new();

            for &index in &pending {
                let document = &documents[index];
                for import in &document.program().imports {
                    let target = document.path().join(import.source.as_str());
                    if known.contains(&target) {
                        continue;
                    }
                    match resolver.resolve(document.path(), import.source.as_str()) {
                        Ok(Some(text)) => {
                            known.insert(target.clone());
                            loaded.push((target, text));
                        }
                        Ok(None) => {}
                        Err(err) => {
                            warn!(
                                document = document.path().as_str(),
                                import = import.source.as_str(),
                                err:% = err;
                                "Import resolver failed"
                            );
                            known.insert(target);
                            diagnostics.push(FileDiagnostic::new(
                                document.path().clone(),
                                Diagnostic::error(format!(
                                    "failed to load import `{}`: {err}",
                                    import.source.as_str()
                                ))
                                .with_code(ErrorCode::E205)
                                .with_label(import.source.span(), "imported here"),
                            ));
                        }
                    }
                }
            }

            if loaded.is_empty() {
                break;
            }
            debug!(round, documents = loaded.len(); "Loaded imported documents");

            let start = documents.len();
            documents.extend(parse_all(loaded));
            pending = (start..documents.len()).collect();
        }

        diagnostics
    }
}

/// Compile `sources` with the default configuration and no import resolver.
pub fn compile<I, P, S>(sources: I) -> CompiledOutput
where
    I: IntoIterator<Item = (P, S)>,
    P: AsRef<str>,
    S: Into<String>,
{
    Compiler::default().compile(sources)
}

fn parse_all(sources: Vec<(DocumentPath, String)>) -> Vec<ParsedDocument> {
    sources
        .into_par_iter()
        .map(|(path, text)| ParsedDocument::parse(path, text))
        .collect()
}

/// Output of linking one document set.
pub(crate) struct Linked {
    pub table: SymbolTable,
    pub graph: DslGraph,
    pub diagnostics: Vec<FileDiagnostic>,
}

/// Link, validate and project `documents`, which must be sorted by path.
pub(crate) fn link(documents: &[ParsedDocument], config: &CompilerConfig, generation: u64) -> Linked {
    let table = compute_global_scope(documents, generation);

    let mut diagnostics = Vec::new();
    let graph = {
        let validator = Validator::new(&table, config.validation());
        for document in documents {
            let path = document.path();
            diagnostics.extend(
                document
                    .diagnostics()
                    .iter()
                    .cloned()
                    .map(|d| FileDiagnostic::new(path.clone(), d)),
            );
            if let Some(id) = table.document_id(path) {
                diagnostics.extend(
                    validator
                        .validate(id, document.program())
                        .into_iter()
                        .map(|d| FileDiagnostic::new(path.clone(), d)),
                );
            }
        }
        compile_graph(documents, &table, validator.cycles())
    };
    sort_diagnostics(&mut diagnostics);

    Linked {
        table,
        graph,
        diagnostics,
    }
}

/// Order by document, then position, then code. The sort is stable so
/// diagnostics at the same place keep their emission order.
pub(crate) fn sort_diagnostics(diagnostics: &mut [FileDiagnostic]) {
    diagnostics.sort_by(|a, b| {
        let key = |d: &FileDiagnostic| {
            let span = d.diagnostic.primary_span();
            (
                span.map_or(0, |s| s.start()),
                span.map_or(0, |s| s.end()),
                d.diagnostic.code().map(|code| code.as_str()),
            )
        };
        a.path.cmp(&b.path).then_with(|| key(a).cmp(&key(b)))
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ecdsl_core::graph::{EdgeKind, NodeKind};

    use super::*;
    use crate::{
        config::{ImportConfig, ValidationConfig},
        import::ImportError,
    };

    fn codes(output: &CompiledOutput) -> Vec<(&str, &str)> {
        output
            .diagnostics
            .iter()
            .map(|d| {
                (
                    d.path.as_str(),
                    d.diagnostic.code().map_or("", |code| code.as_str()),
                )
            })
            .collect()
    }

    #[test]
    fn test_last_source_for_a_path_wins() {
        let output = compile([("a.ec", "event Old"), ("./a.ec", "event New")]);
        assert!(output.graph.node("event:New").is_some());
        assert!(output.graph.node("event:Old").is_none());
    }

    #[test]
    fn test_diagnostics_sorted_by_path_then_position() {
        let output = compile([
            ("b.ec", "service S { sends event Missing }"),
            ("a.ec", "service T {\n  sends event Gone\n  receives command Lost\n}"),
        ]);

        let order: Vec<(&str, usize)> = output
            .diagnostics
            .iter()
            .map(|d| {
                (
                    d.path.as_str(),
                    d.diagnostic.primary_span().map_or(0, |s| s.start()),
                )
            })
            .collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
        assert_eq!(codes(&output), vec![("a.ec", "E200"), ("a.ec", "E200"), ("b.ec", "E200")]);
    }

    #[test]
    fn test_syntax_errors_do_not_stop_other_documents() {
        let output = compile([
            ("bad.ec", "service {"),
            ("good.ec", "service Orders { sends event Placed }\nevent Placed"),
        ]);

        assert!(output.has_errors());
        assert!(
            output
                .diagnostics_for(&DocumentPath::new("bad.ec"))
                .all(|d| d.severity().is_error())
        );
        assert_eq!(output.diagnostics_for(&DocumentPath::new("good.ec")).count(), 0);
        assert_eq!(output.graph.edges_of(EdgeKind::Sends).count(), 1);
    }

    #[test]
    fn test_required_versions_config() {
        let config = CompilerConfig::new(
            Default::default(),
            ValidationConfig::new(true),
            Default::default(),
        );
        let output = Compiler::new(config).compile([("a.ec", "event Placed\nuser alice")]);
        assert_eq!(codes(&output), vec![("a.ec", "E303")]);
    }

    struct MapResolver {
        documents: BTreeMap<&'static str, &'static str>,
        calls: Mutex<Vec<String>>,
    }

    impl MapResolver {
        fn new(documents: &[(&'static str, &'static str)]) -> Self {
            Self {
                documents: documents.iter().copied().collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ImportResolver for MapResolver {
        fn resolve(
            &self,
            from: &DocumentPath,
            specifier: &str,
        ) -> Result<Option<String>, ImportError> {
            let target = from.join(specifier);
            self.calls.lock().unwrap().push(target.to_string());
            if target.as_str() == "broken.ec" {
                return Err(ImportError::Other("connection reset".to_string()));
            }
            Ok(self
                .documents
                .get(target.as_str())
                .map(|text| text.to_string()))
        }
    }

    #[test]
    fn test_resolver_loads_missing_imports_transitively() {
        let resolver = Arc::new(MapResolver::new(&[
            (
                "shared/events.ec",
                "import { Money } from \"./types.ec\"\nevent Placed",
            ),
            ("shared/types.ec", "entity Money"),
        ]));
        let output = Compiler::default()
            .with_resolver(resolver.clone())
            .compile([(
                "main.ec",
                "import { Placed } from \"./shared/events.ec\"\nservice S { sends event Placed }",
            )]);

        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        assert!(output.graph.node("entity:Money").is_some());
        assert!(output.graph.edge("service:S-sends-event:Placed").is_some());
        assert_eq!(
            *resolver.calls.lock().unwrap(),
            vec!["shared/events.ec", "shared/types.ec"]
        );
    }

    #[test]
    fn test_remote_documents_share_normalized_paths() {
        let resolver = Arc::new(MapResolver::new(&[
            (
                "https://example.com/catalog/orders.ec",
                "import { Placed } from \"./events.ec\"\nentity Order",
            ),
            ("https://example.com/catalog/events.ec", "event Placed"),
        ]));
        let output = Compiler::default()
            .with_resolver(resolver.clone())
            .compile([(
                "main.ec",
                "import { Order } from \"https://example.com/catalog/orders.ec\"\n\
                 import { Placed } from \"https://example.com/catalog/events.ec\"\n\
                 service S { sends event Placed }",
            )]);

        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        assert_eq!(output.graph.nodes_of(NodeKind::Event).count(), 1);
        assert_eq!(
            *resolver.calls.lock().unwrap(),
            vec![
                "https://example.com/catalog/orders.ec",
                "https://example.com/catalog/events.ec"
            ]
        );
    }

    #[test]
    fn test_resolver_depth_limit() {
        let resolver = Arc::new(MapResolver::new(&[
            ("b.ec", "import { C } from \"./c.ec\"\nevent B"),
            ("c.ec", "event C"),
        ]));
        let config = CompilerConfig::new(Default::default(), Default::default(), ImportConfig::new(1));
        let output = Compiler::new(config)
            .with_resolver(resolver)
            .compile([("a.ec", "import { B } from \"./b.ec\"")]);

        assert!(output.graph.node("event:B").is_some());
        assert!(output.graph.node("event:C").is_none());
        assert_eq!(codes(&output), vec![("b.ec", "E203")]);
    }

    #[test]
    fn test_resolver_failure_is_reported_at_the_import() {
        let resolver = Arc::new(MapResolver::new(&[]));
        let source = "import { X } from \"./broken.ec\"";
        let output = Compiler::default()
            .with_resolver(resolver)
            .compile([("a.ec", source)]);

        let failure = output
            .diagnostics
            .iter()
            .find(|d| d.diagnostic.code() == Some(ErrorCode::E205))
            .unwrap();
        assert!(failure.diagnostic.severity().is_error());
        assert!(failure.diagnostic.message().contains("connection reset"));
        let span = failure.diagnostic.primary_span().unwrap();
        assert_eq!(&source[span.range()], "\"./broken.ec\"");
    }

    #[test]
    fn test_compile_files_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("orders")).unwrap();
        let file = dir.path().join("orders/service.ec");
        fs::write(&file, "service Orders").unwrap();

        let output = Compiler::default()
            .compile_files(dir.path(), &[&file])
            .unwrap();
        let node = output.graph.node("service:Orders").unwrap();
        assert_eq!(node.kind, NodeKind::Service);
        assert_eq!(node.metadata["source"], "orders/service.ec");
    }

    #[test]
    fn test_compile_files_outside_root() {
        let root = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let file = other.path().join("a.ec");
        fs::write(&file, "event A").unwrap();

        let err = Compiler::default()
            .compile_files(root.path(), &[&file])
            .unwrap_err();
        assert!(matches!(err, EcdslError::OutsideRoot { .. }));
    }
}
