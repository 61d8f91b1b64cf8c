//! Relational fields of every definition kind.
//!
//! [`references`] flattens the kind-specific payload of a definition into a
//! uniform list of [`FieldRef`]s. The validator walks this list to check
//! resolution and kind compatibility, and the graph compiler walks it to
//! emit edges, so both agree on which field accepts which kinds.

use std::sync::Arc;

use ecdsl_core::{graph::EdgeKind, kind::DefinitionKind};
use ecdsl_parser::syntax::{
    Definition, DefinitionBody, MessageRef, Ref, Step, TypedRef,
};

/// Kinds a field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    Kind(DefinitionKind),
    Any,
}

impl Expected {
    pub fn accepts(self, kind: DefinitionKind) -> bool {
        match self {
            Expected::Kind(expected) => expected == kind,
            Expected::Any => true,
        }
    }
}

/// Which end of the edge the referencing definition sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Referencing definition is the edge source.
    Outgoing,
    /// Referencing definition is the edge target.
    Incoming,
}

/// One reference held by a definition, with the rules that apply to it.
#[derive(Debug, Clone, Copy)]
pub struct FieldRef<'a> {
    /// Statement keyword the reference appears under.
    pub field: &'static str,
    pub reference: &'a Ref,
    /// Definition declared in place of a reference, if any.
    pub inline: Option<&'a Arc<Definition>>,
    pub expected: Expected,
    /// Edge emitted between the owner and the target; `None` when the graph
    /// compiler handles the field on its own.
    pub edge: Option<(EdgeKind, Direction)>,
}

impl<'a> FieldRef<'a> {
    fn new(field: &'static str, reference: &'a Ref, expected: Expected) -> Self {
        Self {
            field,
            reference,
            inline: None,
            expected,
            edge: None,
        }
    }

    fn inline(mut self, inline: Option<&'a Arc<Definition>>) -> Self {
        self.inline = inline;
        self
    }

    fn edge(mut self, kind: EdgeKind, direction: Direction) -> Self {
        self.edge = Some((kind, direction));
        self
    }
}

/// Lists every reference of `definition` in declaration order per field.
pub fn references(definition: &Definition) -> Vec<FieldRef<'_>> {
    let mut refs = Vec::new();
    match &definition.body {
        DefinitionBody::Domain(domain) => {
            for (section, member) in domain.members() {
                refs.push(
                    FieldRef::new(
                        section.kind().keyword(),
                        &member.reference,
                        Expected::Kind(section.kind()),
                    )
                    .inline(member.inline.as_ref())
                    .edge(EdgeKind::Contains, Direction::Outgoing),
                );
            }
            messages(&mut refs, &domain.sends, &domain.receives);
            owned(&mut refs, "owns", &domain.owns);
        }
        DefinitionBody::Service(service) => {
            messages(&mut refs, &service.sends, &service.receives);
            for (field, edge, targets) in [
                ("writes-to", EdgeKind::WritesTo, &service.writes_to),
                ("reads-from", EdgeKind::ReadsFrom, &service.reads_from),
                ("reads-writes", EdgeKind::ReadsWrites, &service.reads_writes),
            ] {
                for target in targets {
                    refs.push(
                        FieldRef::new(field, target, Expected::Kind(DefinitionKind::Container))
                            .edge(edge, Direction::Outgoing),
                    );
                }
            }
            for entity in &service.entities {
                refs.push(
                    FieldRef::new("entity", entity, Expected::Kind(DefinitionKind::Entity))
                        .edge(EdgeKind::Owns, Direction::Outgoing),
                );
            }
            owned(&mut refs, "owns", &service.owns);
        }
        DefinitionBody::Event(_)
        | DefinitionBody::Command(_)
        | DefinitionBody::Query(_)
        | DefinitionBody::Diagram(_) => {}
        DefinitionBody::Channel(channel) => {
            for route in &channel.routes {
                refs.push(
                    FieldRef::new("route", route, Expected::Kind(DefinitionKind::Channel))
                        .edge(EdgeKind::RoutesTo, Direction::Outgoing),
                );
            }
        }
        DefinitionBody::Entity(entity) => owned(&mut refs, "owns", &entity.owns),
        DefinitionBody::Container(container) => {
            for (field, edge, services) in [
                ("reads-from", EdgeKind::ReadsFrom, &container.reads_from),
                ("writes-to", EdgeKind::WritesTo, &container.writes_to),
            ] {
                for service in services {
                    refs.push(
                        FieldRef::new(field, service, Expected::Kind(DefinitionKind::Service))
                            .edge(edge, Direction::Incoming),
                    );
                }
            }
        }
        DefinitionBody::Flow(flow) => {
            for step in flow.steps() {
                if let Step::Reference { target, .. } = step {
                    refs.push(FieldRef::new("step", target, Expected::Any));
                }
            }
            for trigger in &flow.triggers {
                for condition in &trigger.conditions {
                    refs.push(FieldRef::new("when", condition, Expected::Any));
                }
                for action in &trigger.actions {
                    refs.push(FieldRef::new("action", &action.target, Expected::Any));
                    for output in &action.outputs {
                        refs.push(FieldRef::new("output", &output.target, Expected::Any));
                    }
                }
            }
        }
        DefinitionBody::Actor(participant) | DefinitionBody::ExternalSystem(participant) => {
            for target in &participant.uses {
                refs.push(
                    FieldRef::new("uses", target, Expected::Any)
                        .edge(EdgeKind::RoutesTo, Direction::Outgoing),
                );
            }
        }
        DefinitionBody::User(user) => {
            for team in &user.teams {
                refs.push(
                    FieldRef::new("team", team, Expected::Kind(DefinitionKind::Team))
                        .edge(EdgeKind::MemberOf, Direction::Outgoing),
                );
            }
            owned(&mut refs, "owns", &user.owns);
        }
        DefinitionBody::Team(team) => {
            for member in &team.members {
                refs.push(
                    FieldRef::new("member", member, Expected::Kind(DefinitionKind::User))
                        .edge(EdgeKind::MemberOf, Direction::Incoming),
                );
            }
            owned(&mut refs, "owns", &team.owns);
        }
        DefinitionBody::DataProduct(product) => {
            for input in &product.inputs {
                refs.push(typed("input", input).edge(EdgeKind::Receives, Direction::Incoming));
            }
            for output in &product.outputs {
                refs.push(
                    typed("output", &output.target).edge(EdgeKind::Sends, Direction::Outgoing),
                );
            }
        }
    }
    refs
}

fn typed<'a>(field: &'static str, typed: &'a TypedRef) -> FieldRef<'a> {
    FieldRef::new(field, &typed.target, Expected::Kind(*typed.kind))
}

fn owned<'a>(refs: &mut Vec<FieldRef<'a>>, field: &'static str, owned: &'a [TypedRef]) {
    refs.extend(
        owned
            .iter()
            .map(|target| typed(field, target).edge(EdgeKind::Owns, Direction::Outgoing)),
    );
}

fn messages<'a>(refs: &mut Vec<FieldRef<'a>>, sends: &'a [MessageRef], receives: &'a [MessageRef]) {
    for message in sends {
        refs.push(
            FieldRef::new("sends", &message.target, Expected::Kind(*message.kind))
                .inline(message.inline.as_ref())
                .edge(EdgeKind::Sends, Direction::Outgoing),
        );
        channels(refs, "to", &message.channels);
    }
    for message in receives {
        let field = FieldRef::new("receives", &message.target, Expected::Kind(*message.kind))
            .inline(message.inline.as_ref());
        // Channel-routed receives are wired through the channel instead.
        if message.channels.is_empty() {
            refs.push(field.edge(EdgeKind::Receives, Direction::Incoming));
        } else {
            refs.push(field);
        }
        channels(refs, "from", &message.channels);
    }
}

fn channels<'a>(refs: &mut Vec<FieldRef<'a>>, field: &'static str, channels: &'a [Ref]) {
    refs.extend(
        channels
            .iter()
            .map(|channel| FieldRef::new(field, channel, Expected::Kind(DefinitionKind::Channel))),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_definition(source: &str) -> Arc<Definition> {
        let output = ecdsl_parser::parse_document(source);
        assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
        Arc::clone(&output.program.definitions[0])
    }

    fn summary(definition: &Definition) -> Vec<(&'static str, String, Expected)> {
        references(definition)
            .into_iter()
            .map(|field| (field.field, field.reference.name.to_string(), field.expected))
            .collect()
    }

    #[test]
    fn test_service_fields() {
        let service = first_definition(
            r#"
            service Orders {
                sends event OrderPlaced to orders-topic
                receives command PlaceOrder
                writes-to container OrdersDb
                entity Order
                owns query GetOrder
            }
            "#,
        );

        assert_eq!(
            summary(&service),
            vec![
                ("sends", "OrderPlaced".to_string(), Expected::Kind(DefinitionKind::Event)),
                ("to", "orders-topic".to_string(), Expected::Kind(DefinitionKind::Channel)),
                ("receives", "PlaceOrder".to_string(), Expected::Kind(DefinitionKind::Command)),
                ("writes-to", "OrdersDb".to_string(), Expected::Kind(DefinitionKind::Container)),
                ("entity", "Order".to_string(), Expected::Kind(DefinitionKind::Entity)),
                ("owns", "GetOrder".to_string(), Expected::Kind(DefinitionKind::Query)),
            ]
        );
    }

    #[test]
    fn test_routed_receive_has_no_direct_edge() {
        let service = first_definition(
            r#"
            service Billing {
                receives event OrderPlaced from orders-topic
                receives event PaymentTaken
            }
            "#,
        );
        let edges: Vec<_> = references(&service)
            .into_iter()
            .filter(|field| field.field == "receives")
            .map(|field| field.edge)
            .collect();
        assert_eq!(
            edges,
            vec![None, Some((EdgeKind::Receives, Direction::Incoming))]
        );
    }

    #[test]
    fn test_domain_members_expect_section_kind() {
        let domain = first_definition(
            r#"
            domain Shop {
                service Orders
                subdomain Payments
                entity Order {
                    identifier "id"
                }
            }
            "#,
        );
        let fields = references(&domain);
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[1].expected, Expected::Kind(DefinitionKind::Domain));
        assert!(fields[2].inline.is_some());
        assert!(
            fields
                .iter()
                .all(|field| field.edge == Some((EdgeKind::Contains, Direction::Outgoing)))
        );
    }

    #[test]
    fn test_team_member_points_at_team() {
        let team = first_definition("team Platform { member alice }");
        let fields = references(&team);
        assert_eq!(
            fields[0].edge,
            Some((EdgeKind::MemberOf, Direction::Incoming))
        );
        assert_eq!(fields[0].expected, Expected::Kind(DefinitionKind::User));
    }

    #[test]
    fn test_flow_refs_accept_any_kind() {
        let flow = first_definition(
            r#"
            flow Checkout {
                Customer "places order" -> PlaceOrder -> "Done"
                when OrderPlaced
                    Billing "charges" -> "paid": PaymentTaken
            }
            "#,
        );
        let names: Vec<String> = references(&flow)
            .into_iter()
            .inspect(|field| assert_eq!(field.expected, Expected::Any))
            .map(|field| field.reference.name.to_string())
            .collect();
        assert_eq!(
            names,
            vec!["Customer", "PlaceOrder", "OrderPlaced", "Billing", "PaymentTaken"]
        );
    }
}
