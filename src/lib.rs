//! Chainflow - a library for executing chains: directed acyclic graphs of
//! named work units run concurrently in dependency order.
//!
//! A chain dispatches its entry node, fans out to successors as their
//! predecessors complete, and joins every launched task before returning.
//! Chains nest: a whole chain embeds as a single node of a larger one.
//! Data flows between nodes through a producer-prefixed param store, an ad
//! hoc variable store, and an append-only detail log, all shared across one
//! top-level run.

// Core infrastructure modules
pub mod core {
    pub mod errors;
}

pub mod chain;
pub mod store;

// Re-exports for convenience
pub use crate::core::errors::{ChainError, Result};
pub use chain::{
    Chain, ChainBuilder, DefaultNode, Edge, NodeOutput, RunContext, RunStores, RunSummary,
    RunnableNode,
};
pub use store::{DetailEntry, DetailLog, ParamStore, VariableStore};

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// End-to-end smoke test: a three-node pipeline passing data through
    /// the param store.
    #[tokio::test]
    async fn linear_pipeline_passes_params_downstream() {
        let fetch = Arc::new(DefaultNode::new("fetch", HashMap::new(), |_ctx, _inputs| async {
            NodeOutput::next_empty().with_output("body", json!("hello, chain"))
        }));

        let parse_map = HashMap::from([("raw".to_string(), "fetch/body".to_string())]);
        let parse = Arc::new(DefaultNode::new("parse", parse_map, |_ctx, inputs| async move {
            let raw = inputs["raw"].as_str().unwrap_or_default();
            NodeOutput::next_empty().with_output("words", json!(raw.split_whitespace().count()))
        }));

        let report_map = HashMap::from([("count".to_string(), "parse/words".to_string())]);
        let report = Arc::new(DefaultNode::new("report", report_map, |ctx, inputs| async move {
            ctx.details().append_value("word_count", inputs["count"].clone());
            NodeOutput::next_empty()
        }));

        let chain = Chain::builder("pipeline")
            .node(fetch)
            .node(parse)
            .node(report)
            .edge("fetch", "parse")
            .edge("parse", "report")
            .build()
            .unwrap();

        let stores = RunStores::new();
        let summary = chain.execute(&stores).await.unwrap();

        let mut completed = summary.completed.clone();
        completed.sort();
        assert_eq!(completed, vec!["fetch", "parse", "report"]);
        assert_eq!(stores.params.get("parse", "words"), Some(json!(2)));
        assert_eq!(stores.details.snapshot()[0].value, json!(2));
    }
}
