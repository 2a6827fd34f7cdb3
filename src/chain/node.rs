//! Node capability and the standard computation node.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::info;

use crate::chain::context::RunContext;
use crate::core::errors::{ChainError, Result};

/// A unit of work addressable by a unique ID within its chain.
///
/// The engine ships exactly two implementations: [`DefaultNode`] and
/// [`crate::chain::chain::Chain`] itself, which is how whole workflows embed
/// as single nodes of a larger one.
#[async_trait]
pub trait RunnableNode: Send + Sync {
    /// Unique ID within the owning chain, stable across a run.
    fn id(&self) -> &str;

    /// Structural self-check, run before the chain starts dispatching.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Executes the node. Implementations drive downstream dispatch by
    /// calling `ctx.chain().next(self.id(), &ctx)` on normal completion;
    /// skipping that call ends the branch.
    async fn run(self: Arc<Self>, ctx: RunContext);
}

/// What a run function hands back to the engine.
#[derive(Debug, Clone, Default)]
pub struct NodeOutput {
    /// Values to publish in the param store under the node's name.
    pub outputs: HashMap<String, Value>,
    /// When set, the owning chain is stopped and `outputs` are discarded.
    pub stop: bool,
}

impl NodeOutput {
    /// Proceed downstream, publishing `outputs` under the node's name.
    pub fn next(outputs: HashMap<String, Value>) -> Self {
        Self {
            outputs,
            stop: false,
        }
    }

    /// Proceed downstream with nothing to publish.
    pub fn next_empty() -> Self {
        Self::default()
    }

    /// Abort the whole chain: no successor of this node is dispatched and
    /// nodes not yet launched anywhere in the chain stay unlaunched.
    pub fn halt() -> Self {
        Self {
            outputs: HashMap::new(),
            stop: true,
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: Value) -> Self {
        self.outputs.insert(key.into(), value);
        self
    }
}

type NodeFn =
    Arc<dyn Fn(RunContext, HashMap<String, Value>) -> BoxFuture<'static, NodeOutput> + Send + Sync>;

/// The standard computation node: resolves its declared params into an
/// input map, invokes the run function, and publishes the returned outputs
/// under its own name.
///
/// A node with an empty param map receives an empty input map; there is no
/// implicit access to the rest of the store.
pub struct DefaultNode {
    id: String,
    name: String,
    param_map: HashMap<String, String>,
    run_fn: NodeFn,
}

impl DefaultNode {
    /// Builds a node whose ID and producer name are both `name`.
    pub fn new<F, Fut>(name: impl Into<String>, param_map: HashMap<String, String>, run: F) -> Self
    where
        F: Fn(RunContext, HashMap<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = NodeOutput> + Send + 'static,
    {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            param_map,
            run_fn: Arc::new(move |ctx, inputs| Box::pin(run(ctx, inputs))),
        }
    }

    /// Overrides the node ID when it must differ from the producer name.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// The producer name this node publishes its outputs under.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl RunnableNode for DefaultNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<()> {
        for (local, reference) in &self.param_map {
            if !reference.contains('/') {
                return Err(ChainError::MalformedParamRef {
                    node_id: self.id.clone(),
                    local: local.clone(),
                    reference: reference.clone(),
                });
            }
        }
        Ok(())
    }

    async fn run(self: Arc<Self>, ctx: RunContext) {
        let inputs = ctx.params().resolve(&self.param_map);
        let output = (self.run_fn)(ctx.clone(), inputs).await;

        if output.stop {
            info!("Node '{}' requested stop, halting chain '{}'", self.id, ctx.chain().id());
            ctx.chain().stop();
            return;
        }
        if !output.outputs.is_empty() {
            ctx.params().store_outputs(&self.name, output.outputs);
        }
        ctx.chain().next(&self.id, &ctx);
    }
}
