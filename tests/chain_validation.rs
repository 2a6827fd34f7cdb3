//! Structural validation: every graph-construction error class surfaces as
//! a typed `ChainError` instead of aborting the process.

use std::collections::HashMap;
use std::sync::Arc;

use chainflow::{Chain, ChainError, DefaultNode, NodeOutput, RunStores};

fn noop(name: &str) -> Arc<DefaultNode> {
    Arc::new(DefaultNode::new(name, HashMap::new(), |_ctx, _inputs| async {
        NodeOutput::next_empty()
    }))
}

#[test]
fn empty_chain_is_rejected() {
    let err = Chain::builder("empty").build().unwrap_err();
    assert!(matches!(err, ChainError::EmptyChain { .. }), "{err}");
}

#[test]
fn duplicate_node_ids_are_rejected() {
    let err = Chain::builder("dup")
        .node(noop("A"))
        .node(noop("A"))
        .build()
        .unwrap_err();
    assert!(matches!(err, ChainError::DuplicateNode { ref node_id, .. } if node_id == "A"), "{err}");
}

#[test]
fn edges_must_reference_known_nodes() {
    let err = Chain::builder("dangling")
        .node(noop("A"))
        .edge("A", "ghost")
        .build()
        .unwrap_err();
    assert!(matches!(err, ChainError::UnknownNode { ref node_id, .. } if node_id == "ghost"), "{err}");
}

#[test]
fn chain_without_entry_node_is_rejected() {
    // Two nodes depending on each other: no node is free of incoming edges.
    let err = Chain::builder("closed")
        .node(noop("A"))
        .node(noop("B"))
        .edge("A", "B")
        .edge("B", "A")
        .build()
        .unwrap_err();
    assert!(matches!(err, ChainError::NoEntryNode { .. }), "{err}");
}

#[test]
fn multiple_entry_nodes_are_rejected() {
    let err = Chain::builder("two-roots")
        .node(noop("A"))
        .node(noop("B"))
        .node(noop("C"))
        .edge("A", "C")
        .edge("B", "C")
        .build()
        .unwrap_err();
    match err {
        ChainError::MultipleEntryNodes { nodes, .. } => {
            assert_eq!(nodes, vec!["A".to_string(), "B".to_string()]);
        }
        other => panic!("expected MultipleEntryNodes, got {other}"),
    }
}

#[test]
fn opt_in_cycle_check_fails_fast() {
    let err = Chain::builder("looped")
        .node(noop("entry"))
        .node(noop("A"))
        .node(noop("B"))
        .edge("entry", "A")
        .edge("A", "B")
        .edge("B", "A")
        .detect_cycles(true)
        .build()
        .unwrap_err();
    assert!(matches!(err, ChainError::CycleDetected { .. }), "{err}");
}

#[test]
fn cycle_past_the_entry_node_builds_without_the_check() {
    // Default contract: acyclicity is the caller's responsibility, and a
    // cycle is only caught when the opt-in check is enabled.
    let chain = Chain::builder("looped")
        .node(noop("entry"))
        .node(noop("A"))
        .node(noop("B"))
        .edge("entry", "A")
        .edge("A", "B")
        .edge("B", "A")
        .build();
    assert!(chain.is_ok());
}

#[test]
fn malformed_param_references_are_rejected() {
    let bad_map = HashMap::from([("x".to_string(), "no-separator".to_string())]);
    let node = Arc::new(DefaultNode::new("A", bad_map, |_ctx, _inputs| async {
        NodeOutput::next_empty()
    }));
    let err = Chain::builder("bad-ref").node(node).build().unwrap_err();
    assert!(
        matches!(err, ChainError::MalformedParamRef { ref reference, .. } if reference == "no-separator"),
        "{err}"
    );
}

/// Chains assembled without the builder surface the same errors on the
/// first `execute` instead of panicking.
#[tokio::test]
async fn unvalidated_chain_reports_errors_at_run_time() {
    let mut chain = Chain::new("late");
    chain.add_node(noop("A")).unwrap();
    chain.add_node(noop("B")).unwrap();

    let err = Arc::new(chain).execute(&RunStores::new()).await.unwrap_err();
    assert!(matches!(err, ChainError::MultipleEntryNodes { .. }), "{err}");
}

/// An invalid nested chain is caught when the outer chain validates,
/// before anything is dispatched.
#[test]
fn invalid_nested_chain_fails_outer_validation() {
    let mut inner = Chain::new("inner");
    inner.add_node(noop("X")).unwrap();
    inner.add_node(noop("Y")).unwrap();

    let err = Chain::builder("outer")
        .node(noop("start"))
        .node(Arc::new(inner))
        .edge("start", "inner")
        .build()
        .unwrap_err();
    assert!(
        matches!(err, ChainError::MultipleEntryNodes { ref chain_id, .. } if chain_id == "inner"),
        "{err}"
    );
}
