//! The typed graph projection of a linked model.
//!
//! A [`DslGraph`] is a plain value: nodes and edges in emission order, each
//! identified by a string id derived only from what it represents. Identical
//! input therefore always produces identical id sets, which lets external
//! tools persist layouts keyed by node id.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::kind::DefinitionKind;

/// Type of a graph node: a definition kind or a synthetic kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
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
    /// A label-only flow step.
    Step,
    /// A channel parameter.
    Parameter,
    /// Stand-in for a reference that did not resolve.
    Unresolved,
}

impl NodeKind {
    /// Returns the id prefix and serialized name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Step => "step",
            NodeKind::Parameter => "parameter",
            NodeKind::Unresolved => "unresolved",
            other => other
                .definition_kind()
                .map_or("unresolved", DefinitionKind::keyword),
        }
    }

    /// Returns the definition kind for non-synthetic node kinds.
    pub fn definition_kind(self) -> Option<DefinitionKind> {
        Some(match self {
            NodeKind::Domain => DefinitionKind::Domain,
            NodeKind::Service => DefinitionKind::Service,
            NodeKind::Event => DefinitionKind::Event,
            NodeKind::Command => DefinitionKind::Command,
            NodeKind::Query => DefinitionKind::Query,
            NodeKind::Channel => DefinitionKind::Channel,
            NodeKind::Entity => DefinitionKind::Entity,
            NodeKind::Container => DefinitionKind::Container,
            NodeKind::Flow => DefinitionKind::Flow,
            NodeKind::Actor => DefinitionKind::Actor,
            NodeKind::ExternalSystem => DefinitionKind::ExternalSystem,
            NodeKind::User => DefinitionKind::User,
            NodeKind::Team => DefinitionKind::Team,
            NodeKind::Diagram => DefinitionKind::Diagram,
            NodeKind::DataProduct => DefinitionKind::DataProduct,
            NodeKind::Step | NodeKind::Parameter | NodeKind::Unresolved => return None,
        })
    }
}

impl From<DefinitionKind> for NodeKind {
    fn from(kind: DefinitionKind) -> Self {
        match kind {
            DefinitionKind::Domain => NodeKind::Domain,
            DefinitionKind::Service => NodeKind::Service,
            DefinitionKind::Event => NodeKind::Event,
            DefinitionKind::Command => NodeKind::Command,
            DefinitionKind::Query => NodeKind::Query,
            DefinitionKind::Channel => NodeKind::Channel,
            DefinitionKind::Entity => NodeKind::Entity,
            DefinitionKind::Container => NodeKind::Container,
            DefinitionKind::Flow => NodeKind::Flow,
            DefinitionKind::Actor => NodeKind::Actor,
            DefinitionKind::ExternalSystem => NodeKind::ExternalSystem,
            DefinitionKind::User => NodeKind::User,
            DefinitionKind::Team => NodeKind::Team,
            DefinitionKind::Diagram => NodeKind::Diagram,
            DefinitionKind::DataProduct => NodeKind::DataProduct,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of a graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    Sends,
    Receives,
    Publishes,
    Subscribes,
    WritesTo,
    ReadsFrom,
    ReadsWrites,
    Contains,
    Owns,
    MemberOf,
    RoutesTo,
    FlowStep,
}

impl EdgeKind {
    /// Returns the serialized name of this edge kind.
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Sends => "sends",
            EdgeKind::Receives => "receives",
            EdgeKind::Publishes => "publishes",
            EdgeKind::Subscribes => "subscribes",
            EdgeKind::WritesTo => "writes-to",
            EdgeKind::ReadsFrom => "reads-from",
            EdgeKind::ReadsWrites => "reads-writes",
            EdgeKind::Contains => "contains",
            EdgeKind::Owns => "owns",
            EdgeKind::MemberOf => "member-of",
            EdgeKind::RoutesTo => "routes-to",
            EdgeKind::FlowStep => "flow-step",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds a node id from its kind, name and resolved version.
///
/// # Examples
///
/// ```
/// # use ecdsl_core::graph::{NodeKind, node_id};
/// assert_eq!(node_id(NodeKind::Service, "Orders", None), "service:Orders");
/// assert_eq!(node_id(NodeKind::Event, "OrderCreated", Some("1.0.0")), "event:OrderCreated@1.0.0");
/// ```
pub fn node_id(kind: NodeKind, name: &str, version: Option<&str>) -> String {
    match version {
        Some(version) => format!("{kind}:{name}@{version}"),
        None => format!("{kind}:{name}"),
    }
}

/// Builds an edge id from its endpoints and type.
pub fn edge_id(source: &str, kind: EdgeKind, target: &str) -> String {
    format!("{source}-{kind}-{target}")
}

/// A node of the architecture graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// A directed, typed edge of the architecture graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Nodes and edges of a compiled workspace.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DslGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl DslGraph {
    /// Returns `true` if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Finds a node by id.
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Finds an edge by id.
    pub fn edge(&self, id: &str) -> Option<&GraphEdge> {
        self.edges.iter().find(|edge| edge.id == id)
    }

    /// Iterates over edges of one type, in emission order.
    pub fn edges_of(&self, kind: EdgeKind) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter().filter(move |edge| edge.kind == kind)
    }

    /// Iterates over nodes of one type, in emission order.
    pub fn nodes_of(&self, kind: NodeKind) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter().filter(move |node| node.kind == kind)
    }
}
