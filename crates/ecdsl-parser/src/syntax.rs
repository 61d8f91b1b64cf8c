//! Syntax tree produced by the parser.
//!
//! A document parses to a [`Program`]: import statements followed by
//! definitions. [`Definition`] is a closed sum over the definition kinds;
//! the kind-specific payload lives in [`DefinitionBody`], and the kind itself
//! is derived from the body variant so the two can never disagree.
//!
//! Definitions are reference-counted so that nested and inline definitions
//! can be shared with the symbol table without copying.

use std::sync::Arc;

use indexmap::IndexMap;

use ecdsl_core::{kind::DefinitionKind, version::VersionSelector};

use crate::span::{Span, Spanned};

/// Document-local identity of a definition, assigned in pre-order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub u32);

/// Root of one document's syntax tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub imports: Vec<Import>,
    pub definitions: Vec<Arc<Definition>>,
}

impl Program {
    /// Every definition in the document, nested ones included, in pre-order.
    pub fn all_definitions(&self) -> Vec<Arc<Definition>> {
        let mut all = Vec::new();
        for definition in &self.definitions {
            collect(definition, &mut all);
        }
        all
    }
}

fn collect(definition: &Arc<Definition>, out: &mut Vec<Arc<Definition>>) {
    out.push(Arc::clone(definition));
    for child in definition.nested() {
        collect(child, out);
    }
}

/// `import { A, B as C } from "./other.ec"`
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub names: Vec<ImportedName>,
    pub source: Spanned<String>,
    pub span: Span,
}

impl Import {
    /// Returns `true` if the import points at a URL.
    pub fn is_remote(&self) -> bool {
        ecdsl_core::path::DocumentPath::is_remote_specifier(self.source.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportedName {
    pub name: Spanned<String>,
    pub alias: Option<Spanned<String>>,
}

impl ImportedName {
    /// The name this import binds in the importing document.
    pub fn local_name(&self) -> &Spanned<String> {
        self.alias.as_ref().unwrap_or(&self.name)
    }
}

/// A reference to another definition: `Orders`, `Orders@1.2.0`, `Orders@^1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Ref {
    pub name: Spanned<String>,
    pub version: VersionSelector,
    pub version_span: Option<Span>,
}

impl Ref {
    pub fn new(name: Spanned<String>, version: VersionSelector, version_span: Option<Span>) -> Self {
        Self {
            name,
            version,
            version_span,
        }
    }

    /// Span covering the name and the selector.
    pub fn span(&self) -> Span {
        match self.version_span {
            Some(version_span) => self.name.span().union(version_span),
            None => self.name.span(),
        }
    }
}

/// A reference that is either written inline as a nested definition or
/// points elsewhere by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub reference: Ref,
    pub inline: Option<Arc<Definition>>,
}

/// A reference prefixed by the kind it expects: `owns entity Order`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedRef {
    pub kind: Spanned<DefinitionKind>,
    pub target: Ref,
}

/// `sends event OrderCreated@1.0.0 to orders-topic { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRef {
    pub kind: Spanned<DefinitionKind>,
    pub target: Ref,
    pub channels: Vec<Ref>,
    pub inline: Option<Arc<Definition>>,
}

/// Value of a scalar attribute statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Text(String),
    Flag(bool),
    List(Vec<String>),
}

/// `@badge("Beta", color: "blue")`
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub name: Spanned<String>,
    pub args: Vec<AnnotationArg>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationArg {
    pub key: Option<String>,
    pub value: String,
}

/// One declared architecture element.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub id: LocalId,
    pub keyword_span: Span,
    pub name: Spanned<String>,
    pub version: Option<Spanned<String>>,
    pub attributes: IndexMap<String, Spanned<AttributeValue>>,
    pub annotations: Vec<Annotation>,
    pub body: DefinitionBody,
    pub span: Span,
}

impl Definition {
    pub fn kind(&self) -> DefinitionKind {
        self.body.kind()
    }

    pub fn version_str(&self) -> Option<&str> {
        self.version.as_ref().map(|version| version.as_str())
    }

    /// Definitions written inside this one, in source order.
    pub fn nested(&self) -> Vec<&Arc<Definition>> {
        fn from_messages(messages: &[MessageRef]) -> Vec<&Arc<Definition>> {
            messages.iter().filter_map(|m| m.inline.as_ref()).collect()
        }

        match &self.body {
            DefinitionBody::Domain(domain) => {
                let mut nested: Vec<&Arc<Definition>> = domain
                    .members()
                    .filter_map(|(_, member)| member.inline.as_ref())
                    .collect();
                nested.extend(from_messages(&domain.sends));
                nested.extend(from_messages(&domain.receives));
                nested.sort_by_key(|definition| definition.id);
                nested
            }
            DefinitionBody::Service(service) => {
                let mut nested = from_messages(&service.sends);
                nested.extend(from_messages(&service.receives));
                nested.sort_by_key(|definition| definition.id);
                nested
            }
            _ => Vec::new(),
        }
    }
}

/// Kind-specific payload of a definition.
#[derive(Debug, Clone, PartialEq)]
pub enum DefinitionBody {
    Domain(DomainBody),
    Service(ServiceBody),
    Event(MessageBody),
    Command(MessageBody),
    Query(MessageBody),
    Channel(ChannelBody),
    Entity(EntityBody),
    Container(ContainerBody),
    Flow(FlowBody),
    Actor(ParticipantBody),
    ExternalSystem(ParticipantBody),
    User(UserBody),
    Team(TeamBody),
    Diagram(DiagramBody),
    DataProduct(DataProductBody),
}

impl DefinitionBody {
    /// An empty body for the given kind.
    pub fn empty(kind: DefinitionKind) -> Self {
        match kind {
            DefinitionKind::Domain => DefinitionBody::Domain(DomainBody::default()),
            DefinitionKind::Service => DefinitionBody::Service(ServiceBody::default()),
            DefinitionKind::Event => DefinitionBody::Event(MessageBody::default()),
            DefinitionKind::Command => DefinitionBody::Command(MessageBody::default()),
            DefinitionKind::Query => DefinitionBody::Query(MessageBody::default()),
            DefinitionKind::Channel => DefinitionBody::Channel(ChannelBody::default()),
            DefinitionKind::Entity => DefinitionBody::Entity(EntityBody::default()),
            DefinitionKind::Container => DefinitionBody::Container(ContainerBody::default()),
            DefinitionKind::Flow => DefinitionBody::Flow(FlowBody::default()),
            DefinitionKind::Actor => DefinitionBody::Actor(ParticipantBody::default()),
            DefinitionKind::ExternalSystem => {
                DefinitionBody::ExternalSystem(ParticipantBody::default())
            }
            DefinitionKind::User => DefinitionBody::User(UserBody::default()),
            DefinitionKind::Team => DefinitionBody::Team(TeamBody::default()),
            DefinitionKind::Diagram => DefinitionBody::Diagram(DiagramBody::default()),
            DefinitionKind::DataProduct => DefinitionBody::DataProduct(DataProductBody::default()),
        }
    }

    pub fn kind(&self) -> DefinitionKind {
        match self {
            DefinitionBody::Domain(_) => DefinitionKind::Domain,
            DefinitionBody::Service(_) => DefinitionKind::Service,
            DefinitionBody::Event(_) => DefinitionKind::Event,
            DefinitionBody::Command(_) => DefinitionKind::Command,
            DefinitionBody::Query(_) => DefinitionKind::Query,
            DefinitionBody::Channel(_) => DefinitionKind::Channel,
            DefinitionBody::Entity(_) => DefinitionKind::Entity,
            DefinitionBody::Container(_) => DefinitionKind::Container,
            DefinitionBody::Flow(_) => DefinitionKind::Flow,
            DefinitionBody::Actor(_) => DefinitionKind::Actor,
            DefinitionBody::ExternalSystem(_) => DefinitionKind::ExternalSystem,
            DefinitionBody::User(_) => DefinitionKind::User,
            DefinitionBody::Team(_) => DefinitionKind::Team,
            DefinitionBody::Diagram(_) => DefinitionKind::Diagram,
            DefinitionBody::DataProduct(_) => DefinitionKind::DataProduct,
        }
    }
}

/// Which domain list a member belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainSection {
    Services,
    Subdomains,
    Entities,
    Containers,
    Channels,
    Flows,
    DataProducts,
}

impl DomainSection {
    /// The kind every member of this section must have.
    pub fn kind(self) -> DefinitionKind {
        match self {
            DomainSection::Services => DefinitionKind::Service,
            DomainSection::Subdomains => DefinitionKind::Domain,
            DomainSection::Entities => DefinitionKind::Entity,
            DomainSection::Containers => DefinitionKind::Container,
            DomainSection::Channels => DefinitionKind::Channel,
            DomainSection::Flows => DefinitionKind::Flow,
            DomainSection::DataProducts => DefinitionKind::DataProduct,
        }
    }

    /// Maps a statement keyword inside a domain to its section.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "service" => DomainSection::Services,
            "subdomain" | "domain" => DomainSection::Subdomains,
            "entity" => DomainSection::Entities,
            "container" => DomainSection::Containers,
            "channel" => DomainSection::Channels,
            "flow" => DomainSection::Flows,
            "data-product" => DomainSection::DataProducts,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomainBody {
    pub services: Vec<Member>,
    pub subdomains: Vec<Member>,
    pub entities: Vec<Member>,
    pub containers: Vec<Member>,
    pub channels: Vec<Member>,
    pub flows: Vec<Member>,
    pub data_products: Vec<Member>,
    pub sends: Vec<MessageRef>,
    pub receives: Vec<MessageRef>,
    pub owns: Vec<TypedRef>,
}

impl DomainBody {
    pub fn section_mut(&mut self, section: DomainSection) -> &mut Vec<Member> {
        match section {
            DomainSection::Services => &mut self.services,
            DomainSection::Subdomains => &mut self.subdomains,
            DomainSection::Entities => &mut self.entities,
            DomainSection::Containers => &mut self.containers,
            DomainSection::Channels => &mut self.channels,
            DomainSection::Flows => &mut self.flows,
            DomainSection::DataProducts => &mut self.data_products,
        }
    }

    /// All members with their section.
    pub fn members(&self) -> impl Iterator<Item = (DomainSection, &Member)> {
        [
            (DomainSection::Services, &self.services),
            (DomainSection::Subdomains, &self.subdomains),
            (DomainSection::Entities, &self.entities),
            (DomainSection::Containers, &self.containers),
            (DomainSection::Channels, &self.channels),
            (DomainSection::Flows, &self.flows),
            (DomainSection::DataProducts, &self.data_products),
        ]
        .into_iter()
        .flat_map(|(section, members)| members.iter().map(move |member| (section, member)))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceBody {
    pub sends: Vec<MessageRef>,
    pub receives: Vec<MessageRef>,
    pub writes_to: Vec<Ref>,
    pub reads_from: Vec<Ref>,
    pub reads_writes: Vec<Ref>,
    pub entities: Vec<Ref>,
    pub owns: Vec<TypedRef>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageBody {}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelBody {
    pub routes: Vec<Ref>,
    pub parameters: Vec<Parameter>,
}

/// `parameter region { description "..."  enum ["eu", "us"] }`
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: Spanned<String>,
    pub attributes: IndexMap<String, AttributeValue>,
    pub span: Span,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityBody {
    pub owns: Vec<TypedRef>,
}

/// Containers list the services that read from or write to them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerBody {
    pub reads_from: Vec<Ref>,
    pub writes_to: Vec<Ref>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowBody {
    /// Entry chains; steps within a chain are connected in order.
    pub chains: Vec<Vec<Step>>,
    pub triggers: Vec<Trigger>,
}

impl FlowBody {
    /// All chain steps in declaration order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.chains.iter().flatten()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// A step naming another definition, optionally labelled.
    Reference {
        target: Ref,
        label: Option<Spanned<String>>,
    },
    /// A label-only step.
    Node { label: Spanned<String> },
}

impl Step {
    pub fn label(&self) -> Option<&Spanned<String>> {
        match self {
            Step::Reference { label, .. } => label.as_ref(),
            Step::Node { label } => Some(label),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Step::Reference { target, label } => label
                .as_ref()
                .map_or(target.span(), |label| target.span().union(label.span())),
            Step::Node { label } => label.span(),
        }
    }
}

/// `when OrderPlaced and PaymentReceived` followed by its actions.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub conditions: Vec<Ref>,
    pub actions: Vec<Action>,
    pub span: Span,
}

/// `Fulfillment "ships order" -> "shipped": OrderShipped`
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub target: Ref,
    pub label: Option<Spanned<String>>,
    pub outputs: Vec<ActionOutput>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutput {
    pub label: Option<Spanned<String>>,
    pub target: Ref,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticipantBody {
    pub uses: Vec<Ref>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserBody {
    pub teams: Vec<Ref>,
    pub owns: Vec<TypedRef>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamBody {
    pub members: Vec<Ref>,
    pub owns: Vec<TypedRef>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagramBody {}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataProductBody {
    pub inputs: Vec<TypedRef>,
    pub outputs: Vec<DataOutput>,
}

/// `output event OrderStats { contract { path "stats.json" } }`
#[derive(Debug, Clone, PartialEq)]
pub struct DataOutput {
    pub target: TypedRef,
    pub contract: IndexMap<String, String>,
}
