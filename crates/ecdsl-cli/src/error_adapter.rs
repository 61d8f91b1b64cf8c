//! Error adapter for converting CLI errors and compiler diagnostics to
//! miette reports.
//!
//! This module provides the bridge between the library's diagnostic values
//! and miette's rich diagnostic formatting used in the CLI.
//!
//! # Multi-Error Support
//!
//! A failed compile carries every diagnostic of every document; each one is
//! rendered independently against the source of its own document. Labels
//! pointing into another document cannot share that snippet and are listed
//! as notes below the help text instead.

use std::{collections::HashMap, fmt};

use miette::{
    Diagnostic as MietteDiagnostic, GraphicalReportHandler, LabeledSpan, NamedSource, SourceSpan,
};

use ecdsl::{Diagnostic, DocumentPath, FileDiagnostic, Span};

use crate::CliError;

/// Adapter for a single ecdsl diagnostic.
///
/// This adapter wraps a single [`Diagnostic`] and implements
/// [`MietteDiagnostic`] to enable rich error formatting in the CLI.
pub struct DiagnosticAdapter<'a> {
    diag: &'a Diagnostic,
    path: &'a DocumentPath,
    src: NamedSource<String>,
    /// Rendered locations of labels in other documents.
    notes: Vec<String>,
}

impl<'a> DiagnosticAdapter<'a> {
    /// Create a new adapter for `diag`, reported in the document at `path`
    /// with text `src`.
    pub fn new(diag: &'a Diagnostic, path: &'a DocumentPath, src: &str) -> Self {
        Self {
            diag,
            path,
            src: NamedSource::new(path.as_str(), src.to_string()),
            notes: Vec::new(),
        }
    }

    /// Resolve labels that point into other documents to `path:line:column`
    /// notes using `sources`.
    pub fn with_related_sources(mut self, sources: &HashMap<DocumentPath, String>) -> Self {
        self.notes = self
            .diag
            .labels()
            .iter()
            .filter_map(|label| {
                let document = label.document().filter(|document| *document != self.path)?;
                let location = sources
                    .get(document)
                    .map(|text| line_column(text, label.span()))
                    .map_or_else(
                        || document.to_string(),
                        |(line, column)| format!("{document}:{line}:{column}"),
                    );
                Some(format!("{location}: {}", label.message()))
            })
            .collect();
        self
    }

    fn is_local(&self, document: Option<&DocumentPath>) -> bool {
        document.is_none_or(|document| document == self.path)
    }
}

impl fmt::Debug for DiagnosticAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticAdapter")
            .field("diag", &self.diag)
            .field("path", &self.path)
            .finish()
    }
}

impl fmt::Display for DiagnosticAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.diag.message())
    }
}

impl std::error::Error for DiagnosticAdapter<'_> {}

impl MietteDiagnostic for DiagnosticAdapter<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.diag
            .code()
            .map(|c| Box::new(c) as Box<dyn fmt::Display>)
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(if self.diag.severity().is_error() {
            miette::Severity::Error
        } else {
            miette::Severity::Warning
        })
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let mut lines: Vec<String> = self.diag.help().map(str::to_string).into_iter().collect();
        lines.extend(self.notes.iter().map(|note| format!("note: {note}")));
        if lines.is_empty() {
            return None;
        }
        Some(Box::new(lines.join("\n")))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.src as &dyn miette::SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let mut labels = self
            .diag
            .labels()
            .iter()
            .filter(|label| self.is_local(label.document()))
            .peekable();
        labels.peek()?;

        Some(Box::new(labels.map(|label| {
            let span = span_to_miette(label.span());
            let message = Some(label.message().to_string());
            if label.is_primary() {
                LabeledSpan::new_primary_with_span(message, span)
            } else {
                LabeledSpan::new_with_span(message, span)
            }
        })))
    }
}

/// Adapter for [`CliError`] variants without source locations.
pub struct ErrorAdapter<'a>(pub &'a CliError);

impl fmt::Debug for ErrorAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for ErrorAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for ErrorAdapter<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl MietteDiagnostic for ErrorAdapter<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code = match &self.0 {
            CliError::Ecdsl(_) => "ecdsl::io",
            CliError::Config(_) => "ecdsl::config",
            CliError::Walk { .. } | CliError::Write { .. } => "ecdsl::io",
            CliError::Json(_) => "ecdsl::json",
            CliError::Compile { .. } => "ecdsl::compile",
            CliError::Unformatted(_) => "ecdsl::fmt",
        };
        Some(Box::new(code))
    }
}

/// A reportable error that can be rendered by miette.
///
/// This enum wraps either a single diagnostic or a non-diagnostic error,
/// providing a uniform interface for error rendering.
#[derive(Debug)]
pub enum Reportable<'a> {
    /// A rich diagnostic with source location information.
    Diagnostic(DiagnosticAdapter<'a>),
    /// A simple error without source location.
    Error(ErrorAdapter<'a>),
}

impl fmt::Display for Reportable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reportable::Diagnostic(d) => fmt::Display::fmt(d, f),
            Reportable::Error(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl std::error::Error for Reportable<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Reportable::Diagnostic(_) => None,
            Reportable::Error(e) => e.source(),
        }
    }
}

impl MietteDiagnostic for Reportable<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        match self {
            Reportable::Diagnostic(d) => d.code(),
            Reportable::Error(e) => e.code(),
        }
    }

    fn severity(&self) -> Option<miette::Severity> {
        match self {
            Reportable::Diagnostic(d) => d.severity(),
            Reportable::Error(e) => e.severity(),
        }
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        match self {
            Reportable::Diagnostic(d) => d.help(),
            Reportable::Error(e) => e.help(),
        }
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        match self {
            Reportable::Diagnostic(d) => d.source_code(),
            Reportable::Error(e) => e.source_code(),
        }
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        match self {
            Reportable::Diagnostic(d) => d.labels(),
            Reportable::Error(e) => e.labels(),
        }
    }
}

fn span_to_miette(span: Span) -> SourceSpan {
    SourceSpan::new(span.start().into(), span.len())
}

/// 1-based line and column of the start of `span` in `text`.
fn line_column(text: &str, span: Span) -> (usize, usize) {
    let start = span.start().min(text.len());
    let before = text.get(..start).unwrap_or(text);
    let line = before.matches('\n').count() + 1;
    let column = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
    (line, column)
}

/// Reportables for `diagnostics`, each rendered against its own document.
pub fn diagnostic_reportables<'a>(
    diagnostics: &'a [FileDiagnostic],
    sources: &HashMap<DocumentPath, String>,
) -> Vec<Reportable<'a>> {
    diagnostics
        .iter()
        .map(|d| {
            let src = sources.get(&d.path).map_or("", String::as_str);
            Reportable::Diagnostic(
                DiagnosticAdapter::new(&d.diagnostic, &d.path, src).with_related_sources(sources),
            )
        })
        .collect()
}

/// Convert a [`CliError`] into a list of reportable errors.
///
/// For [`CliError::Compile`], this returns one [`Reportable`] for each
/// diagnostic. For other error variants, this returns a single
/// [`Reportable`].
pub fn to_reportables(err: &CliError) -> Vec<Reportable<'_>> {
    match err {
        CliError::Compile {
            diagnostics,
            sources,
        } => diagnostic_reportables(diagnostics, sources),
        _ => vec![Reportable::Error(ErrorAdapter(err))],
    }
}

/// Render `reportable` with miette's graphical handler.
pub fn render(reportable: &Reportable<'_>) -> String {
    let mut writer = String::new();
    if GraphicalReportHandler::new()
        .render_report(&mut writer, reportable)
        .is_err()
    {
        writer = reportable.to_string();
    }
    writer
}

#[cfg(test)]
mod tests {
    use ecdsl::ErrorCode;

    use super::*;

    fn sources(entries: &[(&str, &str)]) -> HashMap<DocumentPath, String> {
        entries
            .iter()
            .map(|(path, text)| (DocumentPath::new(path), text.to_string()))
            .collect()
    }

    #[test]
    fn test_single_diagnostic() {
        let diag = Diagnostic::error("test error")
            .with_code(ErrorCode::E300)
            .with_label(Span::new(0..5), "here")
            .with_help("try this");
        let path = DocumentPath::new("a.ec");
        let adapter = DiagnosticAdapter::new(&diag, &path, "hello");

        assert_eq!(adapter.to_string(), "test error");
        assert_eq!(adapter.code().unwrap().to_string(), "E300");
        assert_eq!(adapter.help().unwrap().to_string(), "try this");
        assert_eq!(adapter.severity(), Some(miette::Severity::Error));
    }

    #[test]
    fn test_compile_error_yields_one_reportable_per_diagnostic() {
        let err = CliError::Compile {
            diagnostics: vec![
                FileDiagnostic::new(
                    DocumentPath::new("a.ec"),
                    Diagnostic::error("first error").with_label(Span::new(0..5), "first"),
                ),
                FileDiagnostic::new(
                    DocumentPath::new("b.ec"),
                    Diagnostic::warning("second warning").with_label(Span::new(0..2), "second"),
                ),
            ],
            sources: sources(&[("a.ec", "event A"), ("b.ec", "event B")]),
        };

        let reportables = to_reportables(&err);
        assert_eq!(reportables.len(), 2);
        assert_eq!(reportables[0].to_string(), "first error");
        assert_eq!(reportables[1].to_string(), "second warning");
        assert_eq!(reportables[1].severity(), Some(miette::Severity::Warning));
    }

    #[test]
    fn test_labels_in_other_documents_become_notes() {
        let diag = Diagnostic::error("`S` is exported by more than one document")
            .with_label(Span::new(8..9), "exported again here")
            .with_related(DocumentPath::new("a.ec"), Span::new(14..15), "first exported here");
        let path = DocumentPath::new("b.ec");
        let sources = sources(&[("a.ec", "event A\nservice S"), ("b.ec", "service S")]);

        let adapter = DiagnosticAdapter::new(&diag, &path, "service S").with_related_sources(&sources);

        let labels: Vec<_> = adapter.labels().unwrap().collect();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].label(), Some("exported again here"));
        assert_eq!(
            adapter.help().unwrap().to_string(),
            "note: a.ec:2:7: first exported here"
        );
    }

    #[test]
    fn test_non_diagnostic_error() {
        let err = CliError::Unformatted(vec!["a.ec".into()]);

        let reportables = to_reportables(&err);
        assert_eq!(reportables.len(), 1);
        match &reportables[0] {
            Reportable::Error(e) => {
                assert_eq!(e.code().unwrap().to_string(), "ecdsl::fmt");
            }
            Reportable::Diagnostic(_) => panic!("Expected Error"),
        }
    }

    #[test]
    fn test_render_includes_code_and_message() {
        let diag = Diagnostic::warning("cannot resolve `Missing`")
            .with_code(ErrorCode::E200)
            .with_label(Span::new(24..31), "not found");
        let path = DocumentPath::new("shop.ec");
        let reportable = Reportable::Diagnostic(DiagnosticAdapter::new(
            &diag,
            &path,
            "service S { sends event Missing }",
        ));

        let rendered = render(&reportable);
        assert!(rendered.contains("E200"));
        assert!(rendered.contains("cannot resolve `Missing`"));
    }

    #[test]
    fn test_line_column() {
        assert_eq!(line_column("event A\nservice S", Span::new(14..15)), (2, 7));
        assert_eq!(line_column("abc", Span::new(0..1)), (1, 1));
    }
}
