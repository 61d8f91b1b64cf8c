//! Definition kinds.
//!
//! Every top-level or nested declaration in a document has exactly one
//! [`DefinitionKind`]. Kinds double as the leading keyword of a definition
//! (`service Orders { ... }`) and as the prefix of graph node ids.

use std::{fmt, str::FromStr};

use serde::Serialize;
use thiserror::Error;

/// Error returned when a keyword does not name a definition kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown definition kind `{0}`")]
pub struct UnknownKind(pub String);

/// The kind of an architecture element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefinitionKind {
    Domain,
    Service,
    Event,
    Command,
    Query,
    Channel,
    Entity,
    Container,
    Flow,
    Actor,
    ExternalSystem,
    User,
    Team,
    Diagram,
    DataProduct,
}

impl DefinitionKind {
    /// All kinds, in keyword-table order.
    pub const ALL: [DefinitionKind; 15] = [
        DefinitionKind::Domain,
        DefinitionKind::Service,
        DefinitionKind::Event,
        DefinitionKind::Command,
        DefinitionKind::Query,
        DefinitionKind::Channel,
        DefinitionKind::Entity,
        DefinitionKind::Container,
        DefinitionKind::Flow,
        DefinitionKind::Actor,
        DefinitionKind::ExternalSystem,
        DefinitionKind::User,
        DefinitionKind::Team,
        DefinitionKind::Diagram,
        DefinitionKind::DataProduct,
    ];

    /// Kinds that can travel between producers and consumers.
    pub const MESSAGES: [DefinitionKind; 3] = [
        DefinitionKind::Event,
        DefinitionKind::Command,
        DefinitionKind::Query,
    ];

    /// Returns the source keyword for this kind.
    pub fn keyword(self) -> &'static str {
        match self {
            DefinitionKind::Domain => "domain",
            DefinitionKind::Service => "service",
            DefinitionKind::Event => "event",
            DefinitionKind::Command => "command",
            DefinitionKind::Query => "query",
            DefinitionKind::Channel => "channel",
            DefinitionKind::Entity => "entity",
            DefinitionKind::Container => "container",
            DefinitionKind::Flow => "flow",
            DefinitionKind::Actor => "actor",
            DefinitionKind::ExternalSystem => "external-system",
            DefinitionKind::User => "user",
            DefinitionKind::Team => "team",
            DefinitionKind::Diagram => "diagram",
            DefinitionKind::DataProduct => "data-product",
        }
    }

    /// Looks up a kind by its source keyword.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.keyword() == keyword)
    }

    /// Returns `true` for events, commands and queries.
    pub fn is_message(self) -> bool {
        Self::MESSAGES.contains(&self)
    }

    /// Returns `true` if definitions of this kind are expected to carry a
    /// `version` statement when version enforcement is enabled.
    pub fn requires_version(self) -> bool {
        !matches!(self, DefinitionKind::User | DefinitionKind::Team)
    }
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for DefinitionKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_keyword(s).ok_or_else(|| UnknownKind(s.to_string()))
    }
}
