//! # ecdsl parser
//!
//! Front end for the event-driven architecture language: lexer, syntax
//! tree, error-recovering parser and the diagnostic types shared by every
//! later stage.
//!
//! ## Usage
//!
//! ```
//! let output = ecdsl_parser::parse_document(
//!     r#"
//!     service Orders {
//!       version 1.0.0
//!       sends event OrderCreated
//!     }
//!     "#,
//! );
//! assert!(output.diagnostics.is_empty());
//! assert_eq!(output.program.definitions.len(), 1);
//! ```

pub mod error;
pub mod lexer;
mod parser;
#[cfg(test)]
mod parser_tests;
mod span;
pub mod syntax;
pub mod tokens;

pub use error::{Diagnostic, ErrorCode, Label, Severity};
pub use span::{Span, Spanned};

use syntax::Program;
use tokens::PositionedToken;

/// Result of parsing one document leniently.
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    /// Everything that could be parsed; malformed statements are dropped.
    pub program: Program,
    /// Lexer and parser diagnostics in source order.
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseOutput {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity().is_error())
    }
}

/// Parse a document, recovering from syntax errors.
///
/// This never fails: malformed input yields a partial program plus
/// diagnostics, which is what the compiler and editor tooling want.
pub fn parse_document(source: &str) -> ParseOutput {
    let (tokens, mut diagnostics) = lexer::tokenize(source);
    let significant: Vec<PositionedToken<'_>> = tokens
        .into_iter()
        .filter(|token| !token.token.is_trivia())
        .collect();

    let (program, parse_diagnostics) = parser::parse_program(source, &significant);
    diagnostics.extend(parse_diagnostics);
    diagnostics.sort_by_key(|d| d.primary_span().map(|span| (span.start(), span.end())));

    ParseOutput {
        program,
        diagnostics,
    }
}
