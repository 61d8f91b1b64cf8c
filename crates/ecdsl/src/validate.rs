//! Semantic checks over a linked workspace.
//!
//! The [`Validator`] never changes the model. It reports:
//!
//! - duplicate definitions within a document (E201) and across documents (E202)
//! - references that do not resolve (E200) or match no version (E304)
//! - references to a definition of the wrong kind (E300)
//! - containment or ownership cycles among domains, services and entities (E301)
//! - malformed versions and selectors (E302)
//! - missing versions when [`ValidationConfig::require_versions`] is set (E303)
//!
//! Import problems found while linking are passed through unchanged.

use std::collections::{HashMap, HashSet, VecDeque};

use log::debug;
use petgraph::{
    algo::tarjan_scc,
    graph::{DiGraph, NodeIndex},
};

use ecdsl_core::{graph::EdgeKind, kind::DefinitionKind, version::coerce};
use ecdsl_parser::{
    Diagnostic, ErrorCode,
    syntax::{Definition, LocalId, Program},
};

use crate::{
    config::ValidationConfig,
    fields::{self, Direction, Expected, FieldRef},
    scope::{DocumentId, ResolveError, Symbol, SymbolTable},
};

/// A containment or ownership cycle, in edge order.
#[derive(Debug, Clone)]
pub struct Cycle {
    pub path: Vec<Symbol>,
    /// Every definition in the strongly connected component, `path` included.
    pub members: Vec<Symbol>,
}

impl Cycle {
    /// Document the cycle is reported in.
    pub fn anchor(&self) -> Option<DocumentId> {
        self.path.first().map(|symbol| symbol.document)
    }

    fn describe(&self) -> String {
        let mut names: Vec<&str> = self.path.iter().map(Symbol::name).collect();
        if let Some(first) = names.first().copied() {
            names.push(first);
        }
        names.join(" -> ")
    }
}

/// Runs semantic rules against one symbol table.
#[derive(Debug)]
pub struct Validator<'t> {
    table: &'t SymbolTable,
    config: &'t ValidationConfig,
    cycles: Vec<Cycle>,
}

impl<'t> Validator<'t> {
    /// Prepare a validator. Cycles are computed once for the whole workspace.
    pub fn new(table: &'t SymbolTable, config: &'t ValidationConfig) -> Self {
        let cycles = find_cycles(table);
        debug!(cycles = cycles.len(); "Prepared validator");
        Self {
            table,
            config,
            cycles,
        }
    }

    pub fn cycles(&self) -> &[Cycle] {
        &self.cycles
    }

    /// Validate `program`, the syntax tree of `document`.
    pub fn validate(&self, document: DocumentId, program: &Program) -> Vec<Diagnostic> {
        let mut diagnostics = self.table.link_diagnostics(document).to_vec();

        self.duplicates(document, &mut diagnostics);

        for definition in program.all_definitions() {
            self.definition_version(&definition, &mut diagnostics);
            for field in fields::references(&definition) {
                if field.inline.is_none() {
                    self.reference(document, &field, &mut diagnostics);
                }
            }
        }

        for cycle in &self.cycles {
            if cycle.anchor() == Some(document) {
                diagnostics.push(self.cycle_diagnostic(cycle));
            }
        }

        diagnostics
    }

    fn duplicates(&self, document: DocumentId, diagnostics: &mut Vec<Diagnostic>) {
        for duplicate in self.table.duplicates() {
            if duplicate.document != document {
                continue;
            }
            let name = display_name(&duplicate.definition);
            let first = &duplicate.first.definition;

            let diagnostic = if duplicate.first.document == document {
                Diagnostic::error(format!("`{name}` is defined more than once"))
                    .with_code(ErrorCode::E201)
                    .with_label(duplicate.definition.name.span(), "defined again here")
                    .with_secondary_label(first.name.span(), "first defined here")
                    .with_help("rename one of the definitions or give it a different version")
            } else {
                let mut diagnostic =
                    Diagnostic::error(format!("`{name}` is exported by more than one document"))
                        .with_code(ErrorCode::E202)
                        .with_label(duplicate.definition.name.span(), "exported again here");
                if let Some(path) = self.table.document_path(duplicate.first.document) {
                    diagnostic =
                        diagnostic.with_related(path.clone(), first.name.span(), "first exported here");
                }
                diagnostic.with_help("rename one of them or import it under an alias")
            };
            diagnostics.push(diagnostic);
        }
    }

    fn definition_version(&self, definition: &Definition, diagnostics: &mut Vec<Diagnostic>) {
        match &definition.version {
            Some(version) if coerce(version).is_none() => {
                diagnostics.push(
                    Diagnostic::warning(format!("malformed version `{}`", version.as_str()))
                        .with_code(ErrorCode::E302)
                        .with_label(version.span(), "not a semantic version")
                        .with_help("use a version such as `1.0.0`"),
                );
            }
            None if self.config.require_versions() && definition.kind().requires_version() => {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "{} `{}` has no version",
                        definition.kind(),
                        definition.name
                    ))
                    .with_code(ErrorCode::E303)
                    .with_label(definition.name.span(), "version required")
                    .with_help("add a `version` statement"),
                );
            }
            _ => {}
        }
    }

    fn reference(&self, document: DocumentId, field: &FieldRef<'_>, diagnostics: &mut Vec<Diagnostic>) {
        let reference = field.reference;
        let name = reference.name.as_str();

        if reference.version.is_malformed() {
            let span = reference.version_span.unwrap_or(reference.span());
            diagnostics.push(
                Diagnostic::warning(format!(
                    "malformed version selector `{}` on `{name}`",
                    reference.version
                ))
                .with_code(ErrorCode::E302)
                .with_label(span, "not a version or version range")
                .with_help("use an exact version, a range such as `^1`, or `latest`"),
            );
            return;
        }

        match self.table.resolve(document, reference, field.expected) {
            Ok(_) => {}
            Err(ResolveError::NotFound) => diagnostics.push(
                Diagnostic::warning(format!("cannot resolve `{name}`"))
                    .with_code(ErrorCode::E200)
                    .with_label(reference.name.span(), format!("no definition named `{name}`"))
                    .with_help("define it or import it from another document"),
            ),
            Err(ResolveError::NoMatchingVersion) => {
                let available = self.available_versions(name, field.expected);
                diagnostics.push(
                    Diagnostic::warning(format!(
                        "no version of `{name}` matches `{}`",
                        reference.version
                    ))
                    .with_code(ErrorCode::E304)
                    .with_label(reference.span(), "no matching version")
                    .with_help(format!("available versions: {available}")),
                );
            }
            Err(ResolveError::KindMismatch { found }) => diagnostics.push(
                Diagnostic::error(format!(
                    "`{name}` is {}, but `{}` expects {}",
                    with_article(found),
                    field.field,
                    describe(field.expected)
                ))
                .with_code(ErrorCode::E300)
                .with_label(reference.name.span(), format!("resolves to {found} `{name}`"))
                .with_help(format!("reference {}", describe(field.expected))),
            ),
        }
    }

    fn available_versions(&self, name: &str, expected: Expected) -> String {
        let versions: Vec<&str> = self
            .table
            .lookup(name)
            .iter()
            .filter(|symbol| expected.accepts(symbol.kind()))
            .map(|symbol| symbol.version().unwrap_or("none"))
            .collect();
        versions.join(", ")
    }

    fn cycle_diagnostic(&self, cycle: &Cycle) -> Diagnostic {
        let mut members = cycle.path.iter();
        let Some(first) = members.next() else {
            return Diagnostic::error("cyclic containment").with_code(ErrorCode::E301);
        };

        let mut diagnostic = Diagnostic::error(format!(
            "cyclic containment or ownership: {}",
            cycle.describe()
        ))
        .with_code(ErrorCode::E301)
        .with_label(first.definition.name.span(), "cycle starts here")
        .with_help("a definition cannot directly or indirectly contain or own itself");

        for member in members {
            let span = member.definition.name.span();
            if member.document == first.document {
                diagnostic = diagnostic.with_secondary_label(span, "part of the cycle");
            } else if let Some(path) = self.table.document_path(member.document) {
                diagnostic = diagnostic.with_related(path.clone(), span, "part of the cycle");
            }
        }
        diagnostic
    }
}

/// Validate one document with a freshly prepared [`Validator`].
pub fn validate(
    table: &SymbolTable,
    document: DocumentId,
    program: &Program,
    config: &ValidationConfig,
) -> Vec<Diagnostic> {
    Validator::new(table, config).validate(document, program)
}

fn takes_part_in_cycles(kind: DefinitionKind) -> bool {
    matches!(
        kind,
        DefinitionKind::Domain | DefinitionKind::Service | DefinitionKind::Entity
    )
}

fn find_cycles(table: &SymbolTable) -> Vec<Cycle> {
    let mut graph: DiGraph<Symbol, ()> = DiGraph::new();
    let mut nodes: HashMap<(DocumentId, LocalId), NodeIndex> = HashMap::new();

    for symbol in table.symbols() {
        if takes_part_in_cycles(symbol.kind()) {
            let index = graph.add_node(symbol.clone());
            nodes.insert((symbol.document, symbol.definition.id), index);
        }
    }

    let sources: Vec<NodeIndex> = graph.node_indices().collect();
    for source in sources {
        let symbol = graph[source].clone();
        for field in fields::references(&symbol.definition) {
            let structural = matches!(
                field.edge,
                Some((EdgeKind::Contains | EdgeKind::Owns, Direction::Outgoing))
            );
            if !structural {
                continue;
            }
            let target = match field.inline {
                Some(inline) => Some((symbol.document, inline.id)),
                None => table
                    .resolve(symbol.document, field.reference, field.expected)
                    .ok()
                    .map(|target| (target.document, target.definition.id)),
            };
            if let Some(target) = target.and_then(|key| nodes.get(&key)) {
                graph.update_edge(source, *target, ());
            }
        }
    }

    let mut cycles = Vec::new();
    for component in tarjan_scc(&graph) {
        let cyclic = component.len() > 1
            || component
                .first()
                .is_some_and(|node| graph.contains_edge(*node, *node));
        if !cyclic {
            continue;
        }
        let members: HashSet<NodeIndex> = component.iter().copied().collect();
        let Some(start) = component.iter().copied().min_by_key(|node| {
            let symbol = &graph[*node];
            (symbol.document, symbol.definition.id)
        }) else {
            continue;
        };
        let path = cycle_path(&graph, &members, start)
            .into_iter()
            .map(|node| graph[node].clone())
            .collect();
        let mut component: Vec<Symbol> =
            component.iter().map(|node| graph[*node].clone()).collect();
        component.sort_by_key(|symbol| (symbol.document, symbol.definition.id));
        cycles.push(Cycle {
            path,
            members: component,
        });
    }

    cycles.sort_by_key(|cycle| {
        cycle
            .path
            .first()
            .map(|symbol| (symbol.document, symbol.definition.id))
    });
    cycles
}

/// Shortest path from `start` back to itself through `members`.
fn cycle_path(
    graph: &DiGraph<Symbol, ()>,
    members: &HashSet<NodeIndex>,
    start: NodeIndex,
) -> Vec<NodeIndex> {
    let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut queue = VecDeque::from([start]);

    while let Some(node) = queue.pop_front() {
        let mut successors: Vec<NodeIndex> = graph.neighbors(node).collect();
        successors.sort();
        for next in successors {
            if !members.contains(&next) {
                continue;
            }
            if next == start {
                let mut path = vec![node];
                let mut current = node;
                while current != start {
                    match parent.get(&current) {
                        Some(previous) => {
                            current = *previous;
                            path.push(current);
                        }
                        None => break,
                    }
                }
                path.reverse();
                return path;
            }
            if !parent.contains_key(&next) {
                parent.insert(next, node);
                queue.push_back(next);
            }
        }
    }
    vec![start]
}

fn display_name(definition: &Definition) -> String {
    match definition.version_str() {
        Some(version) => format!("{}@{version}", definition.name),
        None => definition.name.to_string(),
    }
}

fn with_article(kind: DefinitionKind) -> String {
    let article = if kind.keyword().starts_with(['a', 'e', 'i', 'o', 'u']) {
        "an"
    } else {
        "a"
    };
    format!("{article} {kind}")
}

fn describe(expected: Expected) -> String {
    match expected {
        Expected::Kind(kind) => with_article(kind),
        Expected::Any => "any definition".to_string(),
    }
}
