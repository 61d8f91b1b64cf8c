//! Projection of a linked workspace onto a typed node/edge graph.
//!
//! Every definition becomes one node whose id depends only on its kind,
//! name and version, so recompiling the same sources yields the same ids.
//! Relational fields become edges as laid out in [`crate::fields`];
//! references that do not resolve get a synthetic `unresolved` node so the
//! graph stays connected. References to a definition of the wrong kind are
//! left out, as are containment and ownership edges closing a cycle and the
//! relationships of duplicate definitions.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use indexmap::IndexMap;
use log::{debug, info};
use serde_json::{Map, Value, json};

use ecdsl_core::{
    graph::{DslGraph, EdgeKind, GraphEdge, GraphNode, NodeKind, edge_id, node_id},
    kind::DefinitionKind,
    path::DocumentPath,
};
use ecdsl_parser::syntax::{
    AttributeValue, ChannelBody, DataProductBody, Definition, DefinitionBody, FlowBody,
    LocalId, MessageRef, Ref, Step,
};

use crate::{
    document::ParsedDocument,
    fields::{self, Direction, Expected, FieldRef},
    scope::{DocumentId, ResolveError, SymbolTable},
    validate::Cycle,
};

/// Graph node id of a definition.
pub fn definition_node_id(definition: &Definition) -> String {
    node_id(
        NodeKind::from(definition.kind()),
        definition.name.as_str(),
        definition.version_str(),
    )
}

/// `name` or `name@version`, used to scope ids of nodes nested in a definition.
fn definition_key(definition: &Definition) -> String {
    match definition.version_str() {
        Some(version) => format!("{}@{version}", definition.name),
        None => definition.name.to_string(),
    }
}

/// Compile the graph for `documents` linked into `table`.
///
/// `cycles` are the containment cycles found by the validator.
pub fn compile_graph(
    documents: &[ParsedDocument],
    table: &SymbolTable,
    cycles: &[Cycle],
) -> DslGraph {
    let mut compiler = GraphCompiler::new(table, cycles);
    for document in documents {
        compiler.document(document);
    }
    let graph = compiler.finish();
    info!(nodes = graph.nodes.len(), edges = graph.edges.len(); "Compiled graph");
    graph
}

/// Accumulates nodes and edges; the first node or edge with a given id wins.
struct GraphCompiler<'t> {
    table: &'t SymbolTable,
    /// Cycle index of every definition taking part in a containment cycle.
    cyclic: HashMap<(DocumentId, LocalId), usize>,
    duplicates: HashSet<(DocumentId, LocalId)>,
    nodes: IndexMap<String, GraphNode>,
    edges: IndexMap<String, GraphEdge>,
}

impl<'t> GraphCompiler<'t> {
    fn new(table: &'t SymbolTable, cycles: &[Cycle]) -> Self {
        let cyclic = cycles
            .iter()
            .enumerate()
            .flat_map(|(index, cycle)| {
                cycle
                    .members
                    .iter()
                    .map(move |symbol| ((symbol.document, symbol.definition.id), index))
            })
            .collect();
        let duplicates = table
            .duplicates()
            .iter()
            .map(|duplicate| (duplicate.document, duplicate.definition.id))
            .collect();
        Self {
            table,
            cyclic,
            duplicates,
            nodes: IndexMap::new(),
            edges: IndexMap::new(),
        }
    }

    fn finish(self) -> DslGraph {
        DslGraph {
            nodes: self.nodes.into_values().collect(),
            edges: self.edges.into_values().collect(),
        }
    }

    fn document(&mut self, document: &ParsedDocument) {
        let Some(id) = self.table.document_id(document.path()) else {
            debug!(path = document.path().as_str(); "Skipping unlinked document");
            return;
        };
        for definition in &document.program().definitions {
            self.definition(id, document.path(), definition, None);
        }
    }

    fn add_node(&mut self, node: GraphNode) {
        self.nodes.entry(node.id.clone()).or_insert(node);
    }

    fn add_edge(&mut self, source: &str, kind: EdgeKind, target: &str, label: Option<String>) {
        let id = edge_id(source, kind, target);
        self.edges.entry(id.clone()).or_insert_with(|| GraphEdge {
            id,
            source: source.to_string(),
            target: target.to_string(),
            kind,
            label,
        });
    }

    fn definition(
        &mut self,
        document: DocumentId,
        path: &DocumentPath,
        definition: &Definition,
        parent: Option<&str>,
    ) {
        let id = definition_node_id(definition);
        self.add_node(GraphNode {
            id: id.clone(),
            kind: NodeKind::from(definition.kind()),
            label: definition.name.to_string(),
            parent_id: parent.map(str::to_string),
            metadata: definition_metadata(path, definition),
        });

        if self.duplicates.contains(&(document, definition.id)) {
            debug!(node = id.as_str(); "Skipping relationships of duplicate definition");
        } else {
            self.relationships(document, &id, definition);
        }

        let child_parent = if definition.kind() == DefinitionKind::Domain {
            Some(id.as_str())
        } else {
            parent
        };
        for child in definition.nested() {
            self.definition(document, path, child, child_parent);
        }
    }

    fn relationships(&mut self, document: DocumentId, id: &str, definition: &Definition) {
        for field in fields::references(definition) {
            let Some((kind, direction)) = field.edge else {
                continue;
            };
            if self.closes_cycle(document, definition, &field) {
                debug!(node = id, field = field.field; "Skipping cyclic relationship");
                continue;
            }
            let Some(target) = self.target(document, field.reference, field.inline, field.expected)
            else {
                continue;
            };
            match direction {
                Direction::Outgoing => self.add_edge(id, kind, &target, None),
                Direction::Incoming => self.add_edge(&target, kind, id, None),
            }
        }

        match &definition.body {
            DefinitionBody::Domain(domain) => {
                self.message_routes(document, id, &domain.sends, &domain.receives)
            }
            DefinitionBody::Service(service) => {
                self.message_routes(document, id, &service.sends, &service.receives)
            }
            DefinitionBody::Flow(flow) => self.flow(document, id, definition, flow),
            DefinitionBody::Channel(channel) => self.parameters(id, definition, channel),
            DefinitionBody::DataProduct(product) => self.contracts(id, product),
            _ => {}
        }
    }

    /// Returns `true` if `field` is a containment or ownership edge between
    /// two members of the same cycle.
    fn closes_cycle(
        &self,
        document: DocumentId,
        definition: &Definition,
        field: &FieldRef<'_>,
    ) -> bool {
        if !matches!(
            field.edge,
            Some((EdgeKind::Contains | EdgeKind::Owns, Direction::Outgoing))
        ) {
            return false;
        }
        let Some(cycle) = self.cyclic.get(&(document, definition.id)) else {
            return false;
        };
        let target = match field.inline {
            Some(inline) => Some((document, inline.id)),
            None => self
                .table
                .resolve(document, field.reference, field.expected)
                .ok()
                .map(|symbol| (symbol.document, symbol.definition.id)),
        };
        target.and_then(|key| self.cyclic.get(&key)) == Some(cycle)
    }

    /// Node id a reference points at, creating an unresolved node if needed.
    ///
    /// Returns `None` when the reference names a definition of the wrong kind.
    fn target(
        &mut self,
        document: DocumentId,
        reference: &Ref,
        inline: Option<&Arc<Definition>>,
        expected: Expected,
    ) -> Option<String> {
        if let Some(inline) = inline {
            return Some(definition_node_id(inline));
        }
        match self.table.resolve(document, reference, expected) {
            Ok(symbol) => Some(symbol.node_id()),
            Err(ResolveError::KindMismatch { .. }) => None,
            Err(ResolveError::NotFound | ResolveError::NoMatchingVersion) => {
                Some(self.unresolved(reference))
            }
        }
    }

    fn unresolved(&mut self, reference: &Ref) -> String {
        let name = reference.name.as_str();
        let selector = reference.version.as_str();
        let id = node_id(NodeKind::Unresolved, name, selector);

        let mut metadata = Map::new();
        metadata.insert("reference".to_string(), json!(name));
        if let Some(selector) = selector {
            metadata.insert("version".to_string(), json!(selector));
        }
        self.add_node(GraphNode {
            id: id.clone(),
            kind: NodeKind::Unresolved,
            label: name.to_string(),
            parent_id: None,
            metadata,
        });
        id
    }

    /// Channel wiring of `sends ... to` and `receives ... from`.
    fn message_routes(
        &mut self,
        document: DocumentId,
        owner: &str,
        sends: &[MessageRef],
        receives: &[MessageRef],
    ) {
        for (message, receiving) in sends
            .iter()
            .map(|m| (m, false))
            .chain(receives.iter().map(|m| (m, true)))
        {
            if message.channels.is_empty() {
                continue;
            }
            let Some(message_id) = self.target(
                document,
                &message.target,
                message.inline.as_ref(),
                Expected::Kind(*message.kind),
            ) else {
                continue;
            };
            for channel in &message.channels {
                let Some(channel_id) =
                    self.target(document, channel, None, Expected::Kind(DefinitionKind::Channel))
                else {
                    continue;
                };
                self.add_edge(&message_id, EdgeKind::Publishes, &channel_id, None);
                if receiving {
                    self.add_edge(&channel_id, EdgeKind::Subscribes, owner, None);
                }
            }
        }
    }

    fn flow(&mut self, document: DocumentId, flow_id: &str, definition: &Definition, flow: &FlowBody) {
        let key = definition_key(definition);

        for (c, chain) in flow.chains.iter().enumerate() {
            let mut previous: Option<(String, Option<String>)> = None;
            for (s, step) in chain.iter().enumerate() {
                let (step_id, label) = match step {
                    Step::Reference { target, label } => (
                        self.target(document, target, None, Expected::Any),
                        label.as_ref().map(|label| label.to_string()),
                    ),
                    Step::Node { label } => {
                        let id = node_id(NodeKind::Step, &format!("{key}/{c}.{s}"), None);
                        self.add_node(GraphNode {
                            id: id.clone(),
                            kind: NodeKind::Step,
                            label: label.to_string(),
                            parent_id: Some(flow_id.to_string()),
                            metadata: Map::new(),
                        });
                        (Some(id), None)
                    }
                };
                let Some(step_id) = step_id else {
                    previous = None;
                    continue;
                };
                if let Some((previous_id, previous_label)) = previous.take() {
                    self.add_edge(&previous_id, EdgeKind::FlowStep, &step_id, previous_label);
                }
                previous = Some((step_id, label));
            }
        }

        for trigger in &flow.triggers {
            let conditions: Vec<String> = trigger
                .conditions
                .iter()
                .filter_map(|condition| self.target(document, condition, None, Expected::Any))
                .collect();
            for action in &trigger.actions {
                let Some(action_id) = self.target(document, &action.target, None, Expected::Any)
                else {
                    continue;
                };
                let label = action.label.as_ref().map(|label| label.to_string());
                for condition in &conditions {
                    self.add_edge(condition, EdgeKind::FlowStep, &action_id, label.clone());
                }
                for output in &action.outputs {
                    if let Some(output_id) =
                        self.target(document, &output.target, None, Expected::Any)
                    {
                        let label = output.label.as_ref().map(|label| label.to_string());
                        self.add_edge(&action_id, EdgeKind::FlowStep, &output_id, label);
                    }
                }
            }
        }
    }

    fn parameters(&mut self, channel_id: &str, definition: &Definition, channel: &ChannelBody) {
        let key = definition_key(definition);
        for parameter in &channel.parameters {
            let metadata = parameter
                .attributes
                .iter()
                .map(|(name, value)| (name.clone(), attribute_json(value)))
                .collect();
            self.add_node(GraphNode {
                id: node_id(
                    NodeKind::Parameter,
                    &format!("{key}/{}", parameter.name),
                    None,
                ),
                kind: NodeKind::Parameter,
                label: parameter.name.to_string(),
                parent_id: Some(channel_id.to_string()),
                metadata,
            });
        }
    }

    /// Attach output contracts of a data product to its node.
    fn contracts(&mut self, product_id: &str, product: &DataProductBody) {
        let contracts: Map<String, Value> = product
            .outputs
            .iter()
            .filter(|output| !output.contract.is_empty())
            .map(|output| {
                let contract: Map<String, Value> = output
                    .contract
                    .iter()
                    .map(|(key, value)| (key.clone(), json!(value)))
                    .collect();
                (output.target.target.name.to_string(), Value::Object(contract))
            })
            .collect();
        if contracts.is_empty() {
            return;
        }
        if let Some(node) = self.nodes.get_mut(product_id) {
            node.metadata
                .insert("contracts".to_string(), Value::Object(contracts));
        }
    }
}

fn attribute_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Text(text) => json!(text),
        AttributeValue::Flag(flag) => json!(flag),
        AttributeValue::List(items) => json!(items),
    }
}

fn definition_metadata(path: &DocumentPath, definition: &Definition) -> Map<String, Value> {
    let mut metadata = Map::new();
    if let Some(version) = definition.version_str() {
        metadata.insert("version".to_string(), json!(version));
    }
    for (key, value) in &definition.attributes {
        metadata.insert(key.clone(), attribute_json(value));
    }
    if !definition.annotations.is_empty() {
        let annotations: Vec<Value> = definition
            .annotations
            .iter()
            .map(|annotation| {
                let args: Vec<Value> = annotation
                    .args
                    .iter()
                    .map(|arg| match &arg.key {
                        Some(key) => json!({ "key": key, "value": arg.value }),
                        None => json!({ "value": arg.value }),
                    })
                    .collect();
                json!({ "name": annotation.name.as_str(), "args": args })
            })
            .collect();
        metadata.insert("annotations".to_string(), Value::Array(annotations));
    }
    metadata.insert("source".to_string(), json!(path.as_str()));
    metadata
}
