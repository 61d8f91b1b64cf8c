//! Phase 2 of the pipeline: linking documents into one symbol table.
//!
//! [`compute_global_scope`] merges the export sets of every parsed document
//! into a [`SymbolTable`], binds each document's imports and records
//! duplicate exports. The table is an immutable value; a relink builds a new
//! one with a fresh generation number instead of mutating the old one.
//!
//! Reference resolution ([`SymbolTable::resolve`]) looks up names imported
//! into the referencing document first and falls back to the workspace-wide
//! table, then applies the version selector of the reference.

use std::{collections::HashMap, sync::Arc};

use indexmap::IndexMap;
use log::{debug, trace};

use ecdsl_core::{
    graph::{NodeKind, node_id},
    kind::DefinitionKind,
    path::DocumentPath,
    version::normalize,
};
use ecdsl_parser::{
    Diagnostic, ErrorCode, Span,
    syntax::{Definition, Ref},
};

use crate::{document::ParsedDocument, fields::Expected};

/// Index of a document in the slice the table was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(usize);

impl DocumentId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A definition together with the document exporting it.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub document: DocumentId,
    pub definition: Arc<Definition>,
}

impl Symbol {
    pub fn kind(&self) -> DefinitionKind {
        self.definition.kind()
    }

    pub fn name(&self) -> &str {
        self.definition.name.as_str()
    }

    pub fn version(&self) -> Option<&str> {
        self.definition.version_str()
    }

    /// Graph node id of this definition.
    pub fn node_id(&self) -> String {
        node_id(NodeKind::from(self.kind()), self.name(), self.version())
    }
}

/// A name brought into a document by an import statement.
#[derive(Debug, Clone)]
pub struct ImportBinding {
    /// Document the import points at, if it is part of the workspace.
    pub target: Option<DocumentId>,
    /// Name as exported by the target, before aliasing.
    pub name: String,
    pub span: Span,
}

/// A definition whose name and version were already taken.
#[derive(Debug, Clone)]
pub struct Duplicate {
    pub document: DocumentId,
    pub definition: Arc<Definition>,
    /// The earlier definition holding the name.
    pub first: Symbol,
}

/// Outcome of a failed [`SymbolTable::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// No definition with the name is visible.
    NotFound,
    /// Definitions of the right kind exist, but none satisfies the selector.
    NoMatchingVersion,
    /// Every visible definition with the name has a kind the field rejects.
    KindMismatch { found: DefinitionKind },
}

#[derive(Debug, Clone)]
struct DocumentScope {
    path: DocumentPath,
    imports: IndexMap<String, ImportBinding>,
    diagnostics: Vec<Diagnostic>,
}

/// Workspace-wide symbol table for one relink.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    generation: u64,
    documents: Vec<DocumentScope>,
    by_name: IndexMap<String, Vec<Symbol>>,
    duplicates: Vec<Duplicate>,
}

/// Link `documents` into a symbol table.
///
/// Documents are processed in slice order, which decides which of two
/// duplicate exports is reported. Callers pass documents sorted by path so
/// the outcome does not depend on how they were loaded.
pub fn compute_global_scope(documents: &[ParsedDocument], generation: u64) -> SymbolTable {
    let index: HashMap<&DocumentPath, DocumentId> = documents
        .iter()
        .enumerate()
        .map(|(i, document)| (document.path(), DocumentId(i)))
        .collect();

    let mut table = SymbolTable {
        generation,
        ..SymbolTable::default()
    };

    for (i, document) in documents.iter().enumerate() {
        for definition in document.exports() {
            table
                .by_name
                .entry(definition.name.to_string())
                .or_default()
                .push(Symbol {
                    document: DocumentId(i),
                    definition: Arc::clone(definition),
                });
        }
    }

    for document in documents {
        let scope = bind_imports(&table, document, &index);
        table.documents.push(scope);
    }

    table.duplicates = find_duplicates(&table);

    debug!(
        generation,
        documents = documents.len(),
        names = table.by_name.len(),
        duplicates = table.duplicates.len();
        "Linked workspace"
    );
    table
}

fn bind_imports(
    table: &SymbolTable,
    document: &ParsedDocument,
    index: &HashMap<&DocumentPath, DocumentId>,
) -> DocumentScope {
    let mut imports = IndexMap::new();
    let mut diagnostics = Vec::new();

    for import in &document.program().imports {
        let target_path = document.path().join(import.source.as_str());
        let target = index.get(&target_path).copied();

        if target.is_none() {
            let diagnostic = if import.is_remote() {
                Diagnostic::warning(format!(
                    "remote import `{}` is not available",
                    import.source.as_str()
                ))
                .with_help("configure an import resolver that can fetch remote documents")
            } else {
                Diagnostic::error(format!("cannot find document `{target_path}`"))
                    .with_help("check the path relative to the importing document")
            };
            diagnostics.push(
                diagnostic
                    .with_code(ErrorCode::E203)
                    .with_label(import.source.span(), "imported here"),
            );
        }

        for item in &import.names {
            let original = item.name.as_str();
            if let Some(target) = target {
                if table.exported_by(target, original).next().is_none() {
                    diagnostics.push(
                        Diagnostic::error(format!(
                            "`{original}` is not exported by `{target_path}`"
                        ))
                        .with_code(ErrorCode::E204)
                        .with_label(item.name.span(), "not found in the imported document"),
                    );
                }
            }
            trace!(document = document.path().as_str(), name = original; "Bound import");
            imports.insert(
                item.local_name().to_string(),
                ImportBinding {
                    target,
                    name: original.to_string(),
                    span: item.local_name().span(),
                },
            );
        }
    }

    DocumentScope {
        path: document.path().clone(),
        imports,
        diagnostics,
    }
}

fn find_duplicates(table: &SymbolTable) -> Vec<Duplicate> {
    let mut duplicates = Vec::new();

    for (name, symbols) in &table.by_name {
        let mut seen: HashMap<Option<String>, &Symbol> = HashMap::new();
        let mut ordered: Vec<&Symbol> = symbols.iter().collect();
        ordered.sort_by_key(|symbol| (symbol.document, symbol.definition.id));

        for symbol in ordered {
            let key = symbol.version().map(normalize);
            match seen.get(&key) {
                None => {
                    seen.insert(key, symbol);
                }
                Some(first) => {
                    if first.document != symbol.document
                        && table.aliased_between(first.document, symbol.document, name)
                    {
                        continue;
                    }
                    duplicates.push(Duplicate {
                        document: symbol.document,
                        definition: Arc::clone(&symbol.definition),
                        first: (*first).clone(),
                    });
                }
            }
        }
    }

    duplicates.sort_by_key(|duplicate| (duplicate.document, duplicate.definition.id));
    duplicates
}

impl SymbolTable {
    /// Generation number of the relink that produced this table.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn document_id(&self, path: &DocumentPath) -> Option<DocumentId> {
        self.documents
            .iter()
            .position(|scope| &scope.path == path)
            .map(DocumentId)
    }

    pub fn document_path(&self, document: DocumentId) -> Option<&DocumentPath> {
        self.documents.get(document.0).map(|scope| &scope.path)
    }

    /// Linked documents in link order.
    pub fn documents(&self) -> impl Iterator<Item = (DocumentId, &DocumentPath)> {
        self.documents
            .iter()
            .enumerate()
            .map(|(index, scope)| (DocumentId(index), &scope.path))
    }

    /// Import bindings of `document`, keyed by local name.
    pub fn imports(&self, document: DocumentId) -> impl Iterator<Item = (&str, &ImportBinding)> {
        self.documents
            .get(document.0)
            .into_iter()
            .flat_map(|scope| scope.imports.iter().map(|(name, b)| (name.as_str(), b)))
    }

    /// Import problems found while linking `document`.
    pub fn link_diagnostics(&self, document: DocumentId) -> &[Diagnostic] {
        self.documents
            .get(document.0)
            .map_or(&[], |scope| scope.diagnostics.as_slice())
    }

    /// Exports that reuse a name and version already taken.
    pub fn duplicates(&self) -> &[Duplicate] {
        &self.duplicates
    }

    /// Every definition sharing `name`, across documents and versions.
    pub fn lookup(&self, name: &str) -> &[Symbol] {
        self.by_name.get(name).map_or(&[], Vec::as_slice)
    }

    /// Definitions named `name` exported by `document`.
    pub fn exported_by<'t>(
        &'t self,
        document: DocumentId,
        name: &'t str,
    ) -> impl Iterator<Item = &'t Symbol> {
        self.lookup(name)
            .iter()
            .filter(move |symbol| symbol.document == document)
    }

    /// All symbols, grouped by name in first-export order.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.by_name.values().flatten()
    }

    /// Resolve `reference` as written in `from`, accepting kinds in `expected`.
    ///
    /// Candidates exported by `from` itself win ties between equal versions.
    pub fn resolve(
        &self,
        from: DocumentId,
        reference: &Ref,
        expected: Expected,
    ) -> Result<&Symbol, ResolveError> {
        let name = reference.name.as_str();
        let binding = self
            .documents
            .get(from.0)
            .and_then(|scope| scope.imports.get(name));

        let candidates: Vec<&Symbol> = match binding {
            Some(binding) => {
                let imported: Vec<&Symbol> = binding
                    .target
                    .map(|target| self.exported_by(target, &binding.name).collect())
                    .unwrap_or_default();
                if imported.is_empty() {
                    self.lookup(&binding.name).iter().collect()
                } else {
                    imported
                }
            }
            None => self.lookup(name).iter().collect(),
        };

        let Some(first) = candidates.first() else {
            return Err(ResolveError::NotFound);
        };

        let mut matching: Vec<&Symbol> = candidates
            .iter()
            .copied()
            .filter(|symbol| expected.accepts(symbol.kind()))
            .collect();
        if matching.is_empty() {
            return Err(ResolveError::KindMismatch {
                found: first.kind(),
            });
        }
        matching.sort_by_key(|symbol| symbol.document != from);

        reference
            .version
            .select(&matching, |symbol| symbol.version())
            .copied()
            .ok_or(ResolveError::NoMatchingVersion)
    }

    /// Returns `true` if one of the two documents imports `name` from the
    /// other under a different local name.
    fn aliased_between(&self, a: DocumentId, b: DocumentId, name: &str) -> bool {
        let aliases = |from: DocumentId, to: DocumentId| {
            self.documents.get(from.0).is_some_and(|scope| {
                scope.imports.iter().any(|(local, binding)| {
                    binding.target == Some(to) && binding.name == name && local != name
                })
            })
        };
        aliases(a, b) || aliases(b, a)
    }
}
