//! Labeled source spans for diagnostic messages.
//!
//! A label associates a message with a span in the source code. Labels
//! normally point into the document the diagnostic belongs to; a label may
//! instead name another document, which is how cross-document problems such
//! as duplicate exports point at both locations.

use ecdsl_core::path::DocumentPath;

use crate::span::Span;

/// A labeled span in source code.
///
/// # Primary vs Secondary Labels
///
/// - **Primary labels** mark the main location of an error or warning.
/// - **Secondary labels** provide additional context, such as "first exported here".
///
/// # Example
///
/// ```text
/// error[E202]: `OrderService` is exported by more than one document
///   --> services/b.ec:1:9
///    |
///  1 | service OrderService
///    |         ^^^^^^^^^^^^ exported again here
///    |
///   --> services/a.ec:1:9
///    |
///  1 | service OrderService
///    |         ------------ first exported here
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    span: Span,
    message: String,
    is_primary: bool,
    document: Option<DocumentPath>,
}

impl Label {
    /// Create a new primary label.
    pub fn primary(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            is_primary: true,
            document: None,
        }
    }

    /// Create a new secondary label.
    pub fn secondary(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            is_primary: false,
            document: None,
        }
    }

    /// Create a secondary label pointing into another document.
    pub fn secondary_in(document: DocumentPath, span: Span, message: impl Into<String>) -> Self {
        Self {
            document: Some(document),
            ..Self::secondary(span, message)
        }
    }

    /// Get the span this label applies to.
    pub fn span(&self) -> Span {
        self.span
    }

    /// Get the label message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the document this label points into, if not the diagnostic's own.
    pub fn document(&self) -> Option<&DocumentPath> {
        self.document.as_ref()
    }

    /// Check if this is a primary label.
    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    /// Check if this is a secondary label.
    pub fn is_secondary(&self) -> bool {
        !self.is_primary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_label() {
        let label = Label::primary(Span::new(10..20), "error here");

        assert_eq!(label.span().start(), 10);
        assert_eq!(label.span().end(), 20);
        assert_eq!(label.message(), "error here");
        assert!(label.is_primary());
        assert!(label.document().is_none());
    }

    #[test]
    fn test_secondary_label_in_other_document() {
        let label = Label::secondary_in(
            DocumentPath::new("a.ec"),
            Span::new(5..15),
            "first exported here",
        );

        assert!(label.is_secondary());
        assert_eq!(label.document().map(DocumentPath::as_str), Some("a.ec"));
        assert_eq!(label.message(), "first exported here");
    }
}
