//! Ecdsl Core Types
//!
//! This crate provides the foundational types shared by every stage of the
//! event-catalog DSL pipeline. It includes:
//!
//! - **Kinds**: The closed set of definition kinds ([`kind::DefinitionKind`])
//! - **Versions**: Version coercion, ordering and selection ([`version`] module)
//! - **Paths**: Normalized workspace document paths ([`path::DocumentPath`])
//! - **Graph**: The typed node/edge projection consumed by visualization
//!   tooling ([`graph`] module)

pub mod graph;
pub mod kind;
pub mod path;
pub mod version;
