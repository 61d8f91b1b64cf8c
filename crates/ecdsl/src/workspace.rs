//! Editor session state.
//!
//! A [`Workspace`] keeps the latest parse of every open document. An edit
//! re-parses only the edited document; the next query that needs linked
//! state rebuilds the symbol table from scratch under a new generation.

use std::collections::HashMap;

use log::debug;

use ecdsl_core::{graph::DslGraph, path::DocumentPath};
use ecdsl_parser::Diagnostic;

use crate::{
    compiler::{Linked, link},
    completion::{self, CompletionItem},
    config::CompilerConfig,
    document::ParsedDocument,
    format::format_with,
    scope::SymbolTable,
};

#[derive(Default)]
pub struct Workspace {
    config: CompilerConfig,
    /// Sorted by path.
    documents: Vec<ParsedDocument>,
    versions: HashMap<DocumentPath, u64>,
    linked: Option<Linked>,
    generation: u64,
}

impl Workspace {
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Replace the text of the document at `path`.
    ///
    /// Returns `false` and keeps the current text when `version` is not
    /// newer than the version already held, so late deliveries of older
    /// edits cannot overwrite newer ones.
    pub fn update(&mut self, path: impl AsRef<str>, text: impl Into<String>, version: u64) -> bool {
        let path = DocumentPath::new(path);
        if let Some(current) = self.versions.get(&path) {
            if *current >= version {
                debug!(path = path.as_str(), current, version; "Ignoring stale update");
                return false;
            }
        }

        let document = ParsedDocument::parse(path.clone(), text);
        match self.position(&path) {
            Ok(index) => self.documents[index] = document,
            Err(index) => self.documents.insert(index, document),
        }
        self.versions.insert(path, version);
        self.linked = None;
        true
    }

    /// Close the document at `path`. Returns `false` if it was not open.
    pub fn remove(&mut self, path: impl AsRef<str>) -> bool {
        let path = DocumentPath::new(path);
        let Ok(index) = self.position(&path) else {
            return false;
        };
        self.documents.remove(index);
        self.versions.remove(&path);
        self.linked = None;
        true
    }

    /// Rebuild the symbol table now and return its generation.
    pub fn relink(&mut self) -> u64 {
        self.linked = None;
        self.linked().table.generation()
    }

    /// Generation of the most recent relink, `0` before the first one.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn version(&self, path: &DocumentPath) -> Option<u64> {
        self.versions.get(path).copied()
    }

    pub fn text(&self, path: &DocumentPath) -> Option<&str> {
        self.document(path).map(ParsedDocument::text)
    }

    pub fn paths(&self) -> impl Iterator<Item = &DocumentPath> {
        self.documents.iter().map(ParsedDocument::path)
    }

    /// Diagnostics for the document at `path`, sorted by position.
    pub fn diagnostics(&mut self, path: &DocumentPath) -> Vec<Diagnostic> {
        self.linked()
            .diagnostics
            .iter()
            .filter(|d| &d.path == path)
            .map(|d| d.diagnostic.clone())
            .collect()
    }

    pub fn graph(&mut self) -> &DslGraph {
        &self.linked().graph
    }

    pub fn table(&mut self) -> &SymbolTable {
        &self.linked().table
    }

    /// Completion candidates at byte offset `cursor` of the document at
    /// `path`. Empty if the document is not open.
    pub fn complete(&mut self, path: &DocumentPath, cursor: usize) -> Vec<CompletionItem> {
        self.linked();
        let (Some(document), Some(linked)) = (self.document(path), self.linked.as_ref()) else {
            return Vec::new();
        };
        completion::complete(document.text(), cursor, path, &linked.table)
    }

    /// Formatted text of the document at `path`.
    pub fn format(&self, path: &DocumentPath) -> Option<String> {
        self.text(path)
            .map(|text| format_with(text, self.config.format()))
    }

    fn position(&self, path: &DocumentPath) -> Result<usize, usize> {
        self.documents
            .binary_search_by(|document| document.path().cmp(path))
    }

    fn document(&self, path: &DocumentPath) -> Option<&ParsedDocument> {
        self.position(path).ok().map(|index| &self.documents[index])
    }

    fn linked(&mut self) -> &Linked {
        let documents = &self.documents;
        let config = &self.config;
        let generation = &mut self.generation;
        self.linked.get_or_insert_with(|| {
            *generation += 1;
            debug!(generation = *generation, documents = documents.len(); "Relinking workspace");
            link(documents, config, *generation)
        })
    }
}
