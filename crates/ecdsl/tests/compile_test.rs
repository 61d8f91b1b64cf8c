//! End-to-end tests for the compiler facade.
//!
//! Each test compiles a small workspace and checks the resulting graph and
//! diagnostics through the public API only.

use ecdsl::{
    CompiledOutput, DocumentPath, EdgeKind, ErrorCode, NodeKind, Severity, compile,
};

fn codes(output: &CompiledOutput) -> Vec<ErrorCode> {
    output
        .diagnostics
        .iter()
        .filter_map(|d| d.diagnostic.code())
        .collect()
}

fn edge_target<'a>(output: &'a CompiledOutput, source: &str, kind: EdgeKind) -> Vec<&'a str> {
    output
        .graph
        .edges_of(kind)
        .filter(|edge| edge.source == source)
        .map(|edge| edge.target.as_str())
        .collect()
}

#[test]
fn test_service_sending_event() {
    let output = compile([(
        "shop.ec",
        r#"
        service Orders {
          sends event OrderCreated
        }

        event OrderCreated {}
        "#,
    )]);

    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);

    let mut ids: Vec<&str> = output.graph.nodes.iter().map(|n| n.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["event:OrderCreated", "service:Orders"]);

    assert_eq!(output.graph.edges.len(), 1);
    let edge = &output.graph.edges[0];
    assert_eq!(edge.source, "service:Orders");
    assert_eq!(edge.target, "event:OrderCreated");
    assert_eq!(edge.kind, EdgeKind::Sends);
}

#[test]
fn test_version_selection() {
    let output = compile([
        (
            "events.ec",
            r#"
            event OrderCreated { version 1.0.0 }
            event OrderCreated { version 1.1.0 }
            event OrderCreated { version 2.0.0 }
            "#,
        ),
        (
            "services.ec",
            r#"
            service Latest { sends event OrderCreated }
            service Caret { sends event OrderCreated@^1 }
            service Exact { sends event OrderCreated@1.0.0 }
            service Named { sends event OrderCreated@latest }
            "#,
        ),
    ]);

    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert_eq!(
        edge_target(&output, "service:Latest", EdgeKind::Sends),
        vec!["event:OrderCreated@2.0.0"]
    );
    assert_eq!(
        edge_target(&output, "service:Caret", EdgeKind::Sends),
        vec!["event:OrderCreated@1.1.0"]
    );
    assert_eq!(
        edge_target(&output, "service:Exact", EdgeKind::Sends),
        vec!["event:OrderCreated@1.0.0"]
    );
    assert_eq!(
        edge_target(&output, "service:Named", EdgeKind::Sends),
        vec!["event:OrderCreated@2.0.0"]
    );
}

#[test]
fn test_no_matching_version_falls_back_to_unresolved_node() {
    let output = compile([(
        "shop.ec",
        "event OrderCreated { version 1.0.0 }\nservice S { sends event OrderCreated@^3 }",
    )]);

    assert_eq!(codes(&output), vec![ErrorCode::E304]);
    assert_eq!(
        edge_target(&output, "service:S", EdgeKind::Sends),
        vec!["unresolved:OrderCreated@^3"]
    );
}

#[test]
fn test_duplicate_export_across_documents() {
    let output = compile([
        ("a.ec", "service OrderService"),
        ("b.ec", "service OrderService"),
    ]);

    assert_eq!(output.diagnostics.len(), 1);
    let duplicate = &output.diagnostics[0];
    assert_eq!(duplicate.path.as_str(), "b.ec");
    assert_eq!(duplicate.diagnostic.code(), Some(ErrorCode::E202));
    assert_eq!(duplicate.diagnostic.severity(), Severity::Error);

    let locations: Vec<Option<&str>> = duplicate
        .diagnostic
        .labels()
        .iter()
        .map(|label| label.document().map(DocumentPath::as_str))
        .collect();
    assert_eq!(locations, vec![None, Some("a.ec")]);
}

#[test]
fn test_unresolved_reference() {
    let output = compile([("shop.ec", "service Orders { sends event Missing }")]);

    assert_eq!(output.diagnostics.len(), 1);
    let warning = &output.diagnostics[0].diagnostic;
    assert_eq!(warning.code(), Some(ErrorCode::E200));
    assert!(warning.severity().is_warning());

    let unresolved: Vec<&str> = output
        .graph
        .nodes_of(NodeKind::Unresolved)
        .map(|n| n.id.as_str())
        .collect();
    assert_eq!(unresolved, vec!["unresolved:Missing"]);
    assert!(
        output
            .graph
            .edge("service:Orders-sends-unresolved:Missing")
            .is_some()
    );
}

#[test]
fn test_flow_chain_edges() {
    let output = compile([(
        "checkout.ec",
        r#"
        command PlaceOrder
        event OrderPlaced
        service Billing

        flow Checkout {
          PlaceOrder -> OrderPlaced -> Billing
        }
        "#,
    )]);

    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    let steps: Vec<(&str, &str)> = output
        .graph
        .edges_of(EdgeKind::FlowStep)
        .map(|edge| (edge.source.as_str(), edge.target.as_str()))
        .collect();
    assert_eq!(
        steps,
        vec![
            ("command:PlaceOrder", "event:OrderPlaced"),
            ("event:OrderPlaced", "service:Billing"),
        ]
    );
}

#[test]
fn test_compile_is_deterministic() {
    let sources = [
        ("domains/shop.ec", "domain Shop {\n  service Orders\n  service Billing\n}"),
        (
            "services.ec",
            "service Orders { sends event Placed to orders }\nservice Billing { receives event Placed from orders }",
        ),
        ("events.ec", "event Placed { version 1.0.0 }\nchannel orders\nevent Placed"),
    ];

    let first = compile(sources);
    let mut reversed = sources;
    reversed.reverse();
    let second = compile(reversed);

    assert_eq!(first.graph, second.graph);
    assert_eq!(first.diagnostics, second.diagnostics);
    assert_eq!(
        serde_json::to_string(&first.graph).unwrap(),
        serde_json::to_string(&compile(sources).graph).unwrap()
    );
}

#[test]
fn test_import_alias() {
    let output = compile([
        ("shared/events.ec", "event OrderCreated { version 1.0.0 }"),
        (
            "orders.ec",
            r#"
            import { OrderCreated as Created } from "./shared/events.ec"
            service Orders { sends event Created }
            "#,
        ),
    ]);

    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert_eq!(
        edge_target(&output, "service:Orders", EdgeKind::Sends),
        vec!["event:OrderCreated@1.0.0"]
    );
}

#[test]
fn test_missing_local_import() {
    let output = compile([("orders.ec", "import { A } from \"./nowhere.ec\"")]);

    assert_eq!(codes(&output), vec![ErrorCode::E203]);
    assert!(output.has_errors());
}

#[test]
fn test_kind_mismatch_omits_edge() {
    let output = compile([(
        "shop.ec",
        "domain Shop\nservice Orders { sends event Shop }",
    )]);

    assert_eq!(codes(&output), vec![ErrorCode::E300]);
    assert_eq!(output.graph.edges_of(EdgeKind::Sends).count(), 0);
    assert_eq!(output.graph.nodes_of(NodeKind::Unresolved).count(), 0);
}

#[test]
fn test_containment_cycle() {
    let output = compile([
        ("a.ec", "domain A {\n  subdomain B\n}"),
        ("b.ec", "domain B {\n  subdomain A\n}"),
        ("c.ec", "domain C {\n  subdomain A\n}"),
    ]);

    let cycles: Vec<_> = output
        .diagnostics
        .iter()
        .filter(|d| d.diagnostic.code() == Some(ErrorCode::E301))
        .collect();
    assert_eq!(cycles.len(), 1);
    assert!(cycles[0].diagnostic.message().contains("A -> B -> A"));
    // Only the edge into the cycle survives.
    let contains: Vec<&str> = output
        .graph
        .edges_of(EdgeKind::Contains)
        .map(|edge| edge.id.as_str())
        .collect();
    assert_eq!(contains, vec!["domain:C-contains-domain:A"]);
    assert_eq!(output.graph.nodes_of(NodeKind::Domain).count(), 3);
}

#[test]
fn test_syntax_error_keeps_rest_of_document() {
    let output = compile([(
        "shop.ec",
        "service Orders {\n  address \"orders\"\n  sends command Ship\n}\ncommand Ship",
    )]);

    assert_eq!(codes(&output), vec![ErrorCode::E102]);
    assert!(output.graph.edge("service:Orders-sends-command:Ship").is_some());
}
