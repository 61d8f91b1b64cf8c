//! ecdsl - compiler front end for the event-catalog architecture DSL.
//!
//! Documents describing domains, services, messages, channels and flows are
//! parsed, linked into a workspace-wide symbol table, validated and
//! projected onto a typed graph of nodes and edges. The same linked state
//! drives editor completion; the formatter works on raw text.
//!
//! The pipeline in order:
//!
//! 1. [`document`]: parse each document on its own (in parallel).
//! 2. [`scope`]: merge the exports of every document and bind imports.
//! 3. [`validate`]: duplicates, kind checks, unresolved references, cycles
//!    and version lints, all reported as [`Diagnostic`] values.
//! 4. [`graph`]: the node/edge projection.
//!
//! [`Compiler`] runs the whole pipeline over a set of sources;
//! [`Workspace`] keeps per-document state for an editor session.
//!
//! # Example
//!
//! ```
//! use ecdsl::{NodeKind, compile};
//!
//! let output = compile([
//!     ("orders.ec", "service Orders { sends event OrderCreated }"),
//!     ("events.ec", "event OrderCreated { version 1.0.0 }"),
//! ]);
//!
//! assert!(!output.has_errors());
//! assert_eq!(output.graph.nodes_of(NodeKind::Event).count(), 1);
//! ```

pub mod completion;
pub mod config;
pub mod document;
pub mod fields;
pub mod format;
pub mod graph;
pub mod import;
pub mod scope;
pub mod validate;

mod compiler;
mod error;
mod workspace;

pub use ecdsl_core::{
    graph::{DslGraph, EdgeKind, GraphEdge, GraphNode, NodeKind},
    kind::DefinitionKind,
    path::DocumentPath,
    version,
};
pub use ecdsl_parser::{Diagnostic, ErrorCode, Label, Severity, Span};

pub use compiler::{CompiledOutput, Compiler, FileDiagnostic, compile};
pub use completion::{CompletionItem, CompletionKind, complete};
pub use error::EcdslError;
pub use format::{format_ec, format_with};
pub use import::{FsImportResolver, ImportError, ImportResolver};
pub use workspace::Workspace;
