//! Document-level parser tests.
//!
//! These go through [`parse_document`] so that lexing, trivia filtering and
//! recovery are exercised together.

use std::sync::Arc;

use ecdsl_core::kind::DefinitionKind;

use crate::{
    ErrorCode, ParseOutput, parse_document,
    syntax::{AttributeValue, Definition, DefinitionBody, Step},
};

/// Parse and assert that no diagnostics were produced.
fn parse_clean(source: &str) -> ParseOutput {
    let output = parse_document(source);
    assert!(
        output.diagnostics.is_empty(),
        "unexpected diagnostics: {:#?}",
        output.diagnostics
    );
    output
}

fn single_definition(source: &str) -> Arc<Definition> {
    let output = parse_clean(source);
    assert_eq!(output.program.definitions.len(), 1);
    Arc::clone(&output.program.definitions[0])
}

fn codes(output: &ParseOutput) -> Vec<ErrorCode> {
    output.diagnostics.iter().filter_map(|d| d.code()).collect()
}

fn text(definition: &Definition, key: &str) -> Option<String> {
    match definition.attributes.get(key).map(|value| value.inner()) {
        Some(AttributeValue::Text(text)) => Some(text.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod definition_tests {
    use super::*;

    #[test]
    fn test_empty_document() {
        let output = parse_clean("");
        assert!(output.program.definitions.is_empty());
        assert!(output.program.imports.is_empty());
    }

    #[test]
    fn test_definition_without_body() {
        let definition = single_definition("event OrderCreated");
        assert_eq!(definition.kind(), DefinitionKind::Event);
        assert_eq!(definition.name.as_str(), "OrderCreated");
        assert_eq!(definition.version_str(), None);
    }

    #[test]
    fn test_every_kind_keyword() {
        for kind in DefinitionKind::ALL {
            let source = format!("{} Thing {{}}", kind.keyword());
            let definition = single_definition(&source);
            assert_eq!(definition.kind(), kind);
        }
    }

    #[test]
    fn test_keywords_are_valid_names() {
        let output = parse_clean("event service {}\nservice event {}");
        let names: Vec<_> = output
            .program
            .definitions
            .iter()
            .map(|d| (d.kind(), d.name.as_str().to_string()))
            .collect();
        assert_eq!(
            names,
            vec![
                (DefinitionKind::Event, "service".to_string()),
                (DefinitionKind::Service, "event".to_string()),
            ]
        );
    }

    #[test]
    fn test_string_names() {
        let definition = single_definition(r#"service "Order Service" {}"#);
        assert_eq!(definition.name.as_str(), "Order Service");
    }

    #[test]
    fn test_common_attributes() {
        let definition = single_definition(
            r#"
            event OrderCreated {
              version 1.2.0
              name "Order created"
              summary "Raised when an order is stored"
              owner platform
              owner "checkout team"
              deprecated
              draft false
              schema "./schemas/order-created.json"
            }
            "#,
        );

        assert_eq!(definition.version_str(), Some("1.2.0"));
        assert_eq!(text(&definition, "summary").as_deref(), Some("Raised when an order is stored"));
        assert_eq!(text(&definition, "name").as_deref(), Some("Order created"));
        assert_eq!(
            definition.attributes.get("owners").map(|v| v.inner().clone()),
            Some(AttributeValue::List(vec![
                "platform".to_string(),
                "checkout team".to_string()
            ]))
        );
        assert_eq!(
            definition.attributes.get("deprecated").map(|v| v.inner().clone()),
            Some(AttributeValue::Flag(true))
        );
        assert_eq!(
            definition.attributes.get("draft").map(|v| v.inner().clone()),
            Some(AttributeValue::Flag(false))
        );
    }

    #[test]
    fn test_statements_on_one_line() {
        let definition = single_definition("service A { version 1.0.0 sends event B }");
        let DefinitionBody::Service(service) = &definition.body else {
            panic!("expected service body");
        };
        assert_eq!(definition.version_str(), Some("1.0.0"));
        assert_eq!(service.sends.len(), 1);
    }

    #[test]
    fn test_annotations() {
        let definition = single_definition(
            r#"
            event OrderCreated {
              @badge("Beta", color: "blue")
              @internal
            }
            "#,
        );
        let names: Vec<_> = definition
            .annotations
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["badge", "internal"]);
        assert_eq!(definition.annotations[0].args.len(), 2);
    }

    #[test]
    fn test_definition_span_covers_body() {
        let source = "event A {\n  summary \"x\"\n}";
        let definition = single_definition(source);
        assert_eq!(definition.span.start(), 0);
        assert_eq!(definition.span.end(), source.len());
        assert_eq!(definition.keyword_span.range(), 0..5);
    }
}

#[cfg(test)]
mod import_tests {
    use super::*;

    #[test]
    fn test_local_and_remote_imports() {
        let output = parse_clean(
            r#"
            import { Orders, Payments as Billing } from "./shared.ec"
            import { Catalog } from "https://example.com/catalog.ec"
            service Checkout {}
            "#,
        );
        assert_eq!(output.program.imports.len(), 2);
        assert!(!output.program.imports[0].is_remote());
        assert!(output.program.imports[1].is_remote());
        assert_eq!(
            output.program.imports[0].names[1].local_name().as_str(),
            "Billing"
        );
        assert_eq!(output.program.definitions.len(), 1);
    }

    #[test]
    fn test_import_missing_from() {
        let output = parse_document("import { Orders } \"./shared.ec\"\nevent A {}");
        assert_eq!(codes(&output), vec![ErrorCode::E100]);
        assert!(output.program.imports.is_empty());
        assert_eq!(output.program.definitions.len(), 1);
    }
}

#[cfg(test)]
mod service_tests {
    use super::*;

    #[test]
    fn test_service_relations() {
        let definition = single_definition(
            r#"
            service Orders {
              version 1.0.0
              sends event OrderCreated@1.0.0 to orders-topic, audit
              receives command PlaceOrder from commands
              writes-to container orders-db
              reads-from orders-cache
              reads-writes container sessions
              entity Order
              owns query GetOrder
            }
            "#,
        );
        let DefinitionBody::Service(service) = &definition.body else {
            panic!("expected service body");
        };

        let sent = &service.sends[0];
        assert_eq!(*sent.kind.inner(), DefinitionKind::Event);
        assert_eq!(sent.target.name.as_str(), "OrderCreated");
        assert_eq!(sent.target.version.as_str(), Some("1.0.0"));
        let channels: Vec<_> = sent.channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(channels, vec!["orders-topic", "audit"]);

        let received = &service.receives[0];
        assert_eq!(*received.kind.inner(), DefinitionKind::Command);
        assert_eq!(received.channels[0].name.as_str(), "commands");

        assert_eq!(service.writes_to[0].name.as_str(), "orders-db");
        assert_eq!(service.reads_from[0].name.as_str(), "orders-cache");
        assert_eq!(service.reads_writes[0].name.as_str(), "sessions");
        assert_eq!(service.entities[0].name.as_str(), "Order");
        assert_eq!(*service.owns[0].kind.inner(), DefinitionKind::Query);
    }

    #[test]
    fn test_inline_message() {
        let output = parse_clean(
            r#"
            service Orders {
              sends event OrderCreated@2.0.0 {
                summary "Raised once an order is stored"
              }
            }
            "#,
        );
        let all = output.program.all_definitions();
        assert_eq!(all.len(), 2);

        let message = &all[1];
        assert_eq!(message.kind(), DefinitionKind::Event);
        assert_eq!(message.name.as_str(), "OrderCreated");
        assert_eq!(message.version_str(), Some("2.0.0"));
        assert_eq!(
            text(message, "summary").as_deref(),
            Some("Raised once an order is stored")
        );
    }
}

#[cfg(test)]
mod domain_tests {
    use super::*;

    #[test]
    fn test_nested_definitions_in_source_order() {
        let output = parse_clean(
            r#"
            service Orders {
              receives command PlaceOrder { version 1.0.0 }
              sends event OrderPlaced { version 1.0.0 }
              sends event Referenced
            }
            domain Sales {
              sends event SaleClosed {}
              service Billing {}
              subdomain Pricing {}
            }
            "#,
        );

        let names = |index: usize| -> Vec<String> {
            output.program.definitions[index]
                .nested()
                .iter()
                .map(|definition| definition.name.to_string())
                .collect()
        };
        assert_eq!(names(0), vec!["PlaceOrder", "OrderPlaced"]);
        assert_eq!(names(1), vec!["SaleClosed", "Billing", "Pricing"]);
    }

    #[test]
    fn test_nested_and_referenced_members() {
        let output = parse_clean(
            r#"
            domain Sales {
              service Orders {
                version 1.0.0
              }
              service Billing@2.0.0
              subdomain Pricing {
                entity Price
              }
              owns entity Customer
              sends event SaleClosed
            }
            "#,
        );

        let domain = &output.program.definitions[0];
        let DefinitionBody::Domain(body) = &domain.body else {
            panic!("expected domain body");
        };
        assert_eq!(body.services.len(), 2);
        assert!(body.services[0].inline.is_some());
        assert!(body.services[1].inline.is_none());
        assert_eq!(body.services[1].reference.version.as_str(), Some("2.0.0"));
        assert_eq!(body.subdomains.len(), 1);
        assert_eq!(body.owns.len(), 1);
        assert_eq!(body.sends.len(), 1);

        let order: Vec<_> = output
            .program
            .all_definitions()
            .iter()
            .map(|d| (d.id.0, d.name.as_str().to_string()))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, "Sales".to_string()),
                (1, "Orders".to_string()),
                (2, "Pricing".to_string()),
            ]
        );
    }
}

#[cfg(test)]
mod flow_tests {
    use super::*;

    fn flow_body(source: &str) -> crate::syntax::FlowBody {
        let definition = single_definition(source);
        match &definition.body {
            DefinitionBody::Flow(flow) => flow.clone(),
            other => panic!("expected flow body, got {other:?}"),
        }
    }

    #[test]
    fn test_chains_and_labels() {
        let flow = flow_body(
            r#"
            flow Checkout {
              Customer "places order" -> Orders -> "Payment captured" -> Shipping
              Audit
            }
            "#,
        );

        assert_eq!(flow.chains.len(), 2);
        let first = &flow.chains[0];
        assert_eq!(first.len(), 4);
        match &first[0] {
            Step::Reference { target, label } => {
                assert_eq!(target.name.as_str(), "Customer");
                assert_eq!(label.as_ref().map(|l| l.as_str()), Some("places order"));
            }
            other => panic!("unexpected step {other:?}"),
        }
        assert!(matches!(&first[1], Step::Reference { label: None, .. }));
        assert!(matches!(&first[2], Step::Node { label } if label.as_str() == "Payment captured"));
        assert_eq!(flow.steps().count(), 5);
    }

    #[test]
    fn test_string_on_next_line_starts_new_chain() {
        let flow = flow_body(
            r#"
            flow Manual {
              A
              "manual step" -> B
            }
            "#,
        );
        assert_eq!(flow.chains.len(), 2);
        assert!(matches!(&flow.chains[0][0], Step::Reference { label: None, .. }));
        assert!(matches!(&flow.chains[1][0], Step::Node { .. }));
    }

    #[test]
    fn test_trigger_blocks() {
        let flow = flow_body(
            r#"
            flow Fulfilment {
              summary "Ships paid orders"
              when OrderPlaced and PaymentReceived
                Fulfillment "ships" -> "shipped": OrderShipped
                Notifier
              when OrderCancelled
                Refunds
            }
            "#,
        );

        assert!(flow.chains.is_empty());
        assert_eq!(flow.triggers.len(), 2);

        let trigger = &flow.triggers[0];
        let conditions: Vec<_> = trigger.conditions.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(conditions, vec!["OrderPlaced", "PaymentReceived"]);
        assert_eq!(trigger.actions.len(), 2);
        let action = &trigger.actions[0];
        assert_eq!(action.label.as_ref().map(|l| l.as_str()), Some("ships"));
        assert_eq!(action.outputs[0].target.name.as_str(), "OrderShipped");
        assert_eq!(
            action.outputs[0].label.as_ref().map(|l| l.as_str()),
            Some("shipped")
        );
        assert_eq!(flow.triggers[1].actions.len(), 1);
    }
}

#[cfg(test)]
mod resource_tests {
    use super::*;

    #[test]
    fn test_channel() {
        let definition = single_definition(
            r#"
            channel orders-topic {
              address "orders.{region}"
              protocol kafka
              protocol http
              route audit-topic
              parameter region {
                description "Deployment region"
                default "eu"
                enum ["eu", "us"]
              }
            }
            "#,
        );
        let DefinitionBody::Channel(channel) = &definition.body else {
            panic!("expected channel body");
        };
        assert_eq!(text(&definition, "address").as_deref(), Some("orders.{region}"));
        assert_eq!(
            definition.attributes.get("protocols").map(|v| v.inner().clone()),
            Some(AttributeValue::List(vec!["kafka".into(), "http".into()]))
        );
        assert_eq!(channel.routes[0].name.as_str(), "audit-topic");
        assert_eq!(channel.parameters[0].name.as_str(), "region");
        assert_eq!(channel.parameters[0].attributes.len(), 3);
    }

    #[test]
    fn test_container() {
        let definition = single_definition(
            r#"
            container orders-db {
              container-type database
              technology "Postgres 16"
              authoritative
              access-mode read-write
              reads-from service Reporting
              writes-to Orders
            }
            "#,
        );
        let DefinitionBody::Container(container) = &definition.body else {
            panic!("expected container body");
        };
        assert_eq!(text(&definition, "container-type").as_deref(), Some("database"));
        assert_eq!(text(&definition, "access-mode").as_deref(), Some("read-write"));
        assert_eq!(
            definition.attributes.get("authoritative").map(|v| v.inner().clone()),
            Some(AttributeValue::Flag(true))
        );
        assert_eq!(container.reads_from[0].name.as_str(), "Reporting");
        assert_eq!(container.writes_to[0].name.as_str(), "Orders");
    }

    #[test]
    fn test_users_and_teams() {
        let output = parse_clean(
            r##"
            user alice {
              name "Alice"
              email "alice@example.com"
              team platform
            }
            team platform {
              slack "#platform"
              member alice
              owns service Orders
            }
            actor Customer {
              uses Storefront
            }
            "##,
        );
        let definitions = &output.program.definitions;
        let DefinitionBody::User(user) = &definitions[0].body else {
            panic!("expected user body");
        };
        let DefinitionBody::Team(team) = &definitions[1].body else {
            panic!("expected team body");
        };
        let DefinitionBody::Actor(actor) = &definitions[2].body else {
            panic!("expected actor body");
        };
        assert_eq!(user.teams[0].name.as_str(), "platform");
        assert_eq!(team.members[0].name.as_str(), "alice");
        assert_eq!(*team.owns[0].kind.inner(), DefinitionKind::Service);
        assert_eq!(actor.uses[0].name.as_str(), "Storefront");
    }

    #[test]
    fn test_data_product_contract() {
        let definition = single_definition(
            r#"
            data-product OrderStats {
              input event OrderCreated
              output event OrderStatsPublished {
                contract {
                  path "contracts/stats.json"
                  name "Stats"
                }
              }
            }
            "#,
        );
        let DefinitionBody::DataProduct(product) = &definition.body else {
            panic!("expected data product body");
        };
        assert_eq!(product.inputs[0].target.name.as_str(), "OrderCreated");
        let output = &product.outputs[0];
        assert_eq!(output.target.target.name.as_str(), "OrderStatsPublished");
        assert_eq!(
            output.contract.get("path").map(String::as_str),
            Some("contracts/stats.json")
        );
    }
}

#[cfg(test)]
mod recovery_tests {
    use super::*;

    #[test]
    fn test_malformed_statement_resumes_on_next_line() {
        let output = parse_document(
            "service Orders {\n  sends OrderCreated\n  receives event PaymentDone\n}",
        );
        assert_eq!(codes(&output), vec![ErrorCode::E100]);
        assert!(output.diagnostics[0].message().contains("message kind"));

        let DefinitionBody::Service(service) = &output.program.definitions[0].body else {
            panic!("expected service body");
        };
        assert!(service.sends.is_empty());
        assert_eq!(service.receives.len(), 1);
    }

    #[test]
    fn test_unknown_statement() {
        let output =
            parse_document("service Orders {\n  address \"orders\"\n  sends event A\n}");
        assert_eq!(codes(&output), vec![ErrorCode::E102]);
        assert!(output.diagnostics[0].message().contains("address"));

        let DefinitionBody::Service(service) = &output.program.definitions[0].body else {
            panic!("expected service body");
        };
        assert_eq!(service.sends.len(), 1);
    }

    #[test]
    fn test_unclosed_block_keeps_definition() {
        let output = parse_document("service Orders {\n  sends event A\n");
        assert_eq!(codes(&output), vec![ErrorCode::E101]);
        assert_eq!(output.program.definitions.len(), 1);
    }

    #[test]
    fn test_malformed_header_skips_definition() {
        let output = parse_document("service {\n  sends event A\n}\nevent A {}");
        assert_eq!(codes(&output), vec![ErrorCode::E100]);
        let names: Vec<_> = output
            .program
            .definitions
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["A"]);
    }

    #[test]
    fn test_top_level_garbage() {
        let output = parse_document("hello world\nevent A {}");
        assert_eq!(codes(&output), vec![ErrorCode::E100]);
        assert_eq!(output.program.definitions.len(), 1);
        assert_eq!(
            output.diagnostics[0].primary_span().map(|s| s.range()),
            Some(0..5)
        );
    }

    #[test]
    fn test_truncated_statement() {
        let output = parse_document("service Orders {\n  sends event");
        let found = codes(&output);
        assert!(found.contains(&ErrorCode::E101), "codes: {found:?}");
    }

    #[test]
    fn test_has_errors() {
        assert!(!parse_document("event A {}\nservice B { sends event A }").has_errors());
        let output = parse_document("service Orders {\n  sends OrderCreated\n}");
        assert!(output.has_errors());
        assert_eq!(output.diagnostics.len(), 1);
    }
}

#[cfg(test)]
mod property_tests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn parse_document_never_panics(source in "\\PC{0,200}") {
            let first = parse_document(&source);
            let second = parse_document(&source);
            prop_assert_eq!(first.diagnostics, second.diagnostics);
        }

        #[test]
        fn parse_document_handles_fragments(
            fragments in proptest::collection::vec(
                prop_oneof![
                    Just("service"), Just("event"), Just("Orders"), Just("{"), Just("}"),
                    Just("sends"), Just("->"), Just("\n"), Just("\"x\""), Just("@1.0.0"),
                    Just("when"), Just("flow"), Just("import"), Just(","),
                ],
                0..40,
            )
        ) {
            let source = fragments.join(" ");
            let output = parse_document(&source);
            for diagnostic in &output.diagnostics {
                if let Some(span) = diagnostic.primary_span() {
                    prop_assert!(span.end() <= source.len());
                }
            }
        }
    }
}
