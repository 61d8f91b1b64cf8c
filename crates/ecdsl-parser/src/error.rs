//! Error and diagnostic system.
//!
//! This module provides:
//! - Error codes for documentation and searchability
//! - Multiple labeled spans for rich error context, optionally in other documents
//! - Severity levels
//! - A collector for accumulating diagnostics
//!
//! # Example
//!
//! ```
//! # use ecdsl_parser::error::{Diagnostic, ErrorCode};
//! # use ecdsl_parser::Span;
//!
//! let diag = Diagnostic::error("`OrderPlaced` is defined more than once")
//!     .with_code(ErrorCode::E201)
//!     .with_label(Span::new(100..111), "duplicate definition")
//!     .with_secondary_label(Span::new(50..61), "first defined here")
//!     .with_help("remove the duplicate or give it a different version");
//! ```

mod collector;
mod diagnostic;
mod error_code;
mod label;
mod severity;

pub use collector::DiagnosticCollector;
pub use diagnostic::Diagnostic;
pub use error_code::ErrorCode;
pub use label::Label;
pub use severity::Severity;
