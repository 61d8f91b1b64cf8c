//! Phase 1 of the pipeline: one document parsed in isolation.

use std::sync::Arc;

use log::debug;

use ecdsl_core::path::DocumentPath;
use ecdsl_parser::{
    Diagnostic,
    syntax::{Definition, Program},
};

/// A parsed document together with its export set.
///
/// Building a `ParsedDocument` depends on nothing but the document's own
/// text, so documents can be parsed on independent threads.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    path: DocumentPath,
    text: String,
    program: Program,
    exports: Vec<Arc<Definition>>,
    diagnostics: Vec<Diagnostic>,
}

impl ParsedDocument {
    /// Parse `text` as the document at `path`.
    pub fn parse(path: DocumentPath, text: impl Into<String>) -> Self {
        let text = text.into();
        let output = ecdsl_parser::parse_document(&text);
        let exports = compute_exports(&output.program);

        debug!(
            path = path.as_str(),
            definitions = exports.len(),
            diagnostics = output.diagnostics.len();
            "Parsed document"
        );

        Self {
            path,
            text,
            program: output.program,
            exports,
            diagnostics: output.diagnostics,
        }
    }

    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Definitions addressable from other documents, in pre-order.
    pub fn exports(&self) -> &[Arc<Definition>] {
        &self.exports
    }

    /// Syntax diagnostics produced while parsing.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

/// Returns every definition of `program` that other documents can name.
///
/// Nested definitions (domain members declared in place, inline message
/// bodies) are exported alongside top-level ones so that a reference
/// elsewhere can reach them by bare name.
pub fn compute_exports(program: &Program) -> Vec<Arc<Definition>> {
    program.all_definitions()
}
