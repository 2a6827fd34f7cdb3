//! The chain scheduler: dependency-ordered concurrent dispatch with a join
//! barrier and cooperative cancellation.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

use crate::chain::context::{RunContext, RunStores};
use crate::chain::node::RunnableNode;
use crate::core::errors::{ChainError, Result};

/// A directed "must-complete-before" dependency between two node IDs.
///
/// Edges order execution only; data flow stays explicit through the param
/// store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

/// Identifier and completion order of one finished chain run.
///
/// Carries no success or failure judgment: a returned summary means the
/// graph quiesced, and any interpretation of the outcome is derived from
/// the final store state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    /// Node IDs in the order their tasks finished.
    pub completed: Vec<String>,
}

/// Transient bookkeeping for the run in progress, recreated on every run.
#[derive(Debug, Default)]
struct RunState {
    completed: DashSet<String>,
    /// Nodes parked until their outstanding predecessors complete.
    waiting: DashMap<String, HashSet<String>>,
    /// First-dispatch guard enforcing at-most-once execution per run.
    dispatched: DashSet<String>,
    cancelled: AtomicBool,
}

impl RunState {
    fn reset(&self) {
        self.completed.clear();
        self.waiting.clear();
        self.dispatched.clear();
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// A named graph of nodes and edges plus the scheduler that runs it.
///
/// The graph definition is static; `execute` may be invoked repeatedly and
/// each run starts from fresh transient state. A chain also satisfies
/// [`RunnableNode`], so it can be added, unmodified, as a single node of a
/// larger chain.
pub struct Chain {
    id: String,
    nodes: HashMap<String, Arc<dyn RunnableNode>>,
    edges: Vec<Edge>,
    detect_cycles: bool,
    state: RunState,
    run_lock: Mutex<()>,
}

impl Chain {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nodes: HashMap::new(),
            edges: Vec::new(),
            detect_cycles: false,
            state: RunState::default(),
            run_lock: Mutex::new(()),
        }
    }

    pub fn builder(id: impl Into<String>) -> ChainBuilder {
        ChainBuilder::new(id)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Enables the upfront acyclicity check for this chain. Off by default:
    /// a cyclic graph otherwise parks its nodes on the wait-list forever
    /// and the run never returns.
    pub fn detect_cycles(&mut self, enabled: bool) {
        self.detect_cycles = enabled;
    }

    /// Adds a node. IDs must be unique within the chain.
    ///
    /// Construction is not safe concurrently with a run.
    pub fn add_node(&mut self, node: Arc<dyn RunnableNode>) -> Result<()> {
        let node_id = node.id().to_string();
        if self.nodes.contains_key(&node_id) {
            return Err(ChainError::DuplicateNode {
                chain_id: self.id.clone(),
                node_id,
            });
        }
        self.nodes.insert(node_id, node);
        Ok(())
    }

    pub fn add_edge(&mut self, source: impl Into<String>, target: impl Into<String>) {
        self.edges.push(Edge {
            source: source.into(),
            target: target.into(),
        });
    }

    /// Full structural validation: edges must reference known nodes, every
    /// node passes its own self-check (recursing through nested chains),
    /// the opt-in cycle check holds, and exactly one node has no incoming
    /// edge.
    pub fn validate(&self) -> Result<()> {
        self.entry_node().map(|_| ())
    }

    fn entry_node(&self) -> Result<Arc<dyn RunnableNode>> {
        if self.nodes.is_empty() {
            return Err(ChainError::EmptyChain {
                chain_id: self.id.clone(),
            });
        }
        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !self.nodes.contains_key(endpoint) {
                    return Err(ChainError::UnknownNode {
                        chain_id: self.id.clone(),
                        node_id: endpoint.clone(),
                    });
                }
            }
        }
        for node in self.nodes.values() {
            node.validate()?;
        }
        if self.detect_cycles {
            self.check_acyclic()?;
        }

        let targets: HashSet<&String> = self.edges.iter().map(|edge| &edge.target).collect();
        let mut entries: Vec<&String> = self
            .nodes
            .keys()
            .filter(|node_id| !targets.contains(node_id))
            .collect();
        entries.sort();
        match entries.as_slice() {
            [] => Err(ChainError::NoEntryNode {
                chain_id: self.id.clone(),
            }),
            [entry] => Ok(self.nodes[entry.as_str()].clone()),
            _ => Err(ChainError::MultipleEntryNodes {
                chain_id: self.id.clone(),
                nodes: entries.into_iter().cloned().collect(),
            }),
        }
    }

    fn check_acyclic(&self) -> Result<()> {
        let mut graph = DiGraph::<&str, ()>::new();
        let mut indices: HashMap<&str, NodeIndex> = HashMap::new();
        for node_id in self.nodes.keys() {
            indices.insert(node_id.as_str(), graph.add_node(node_id.as_str()));
        }
        for edge in &self.edges {
            graph.add_edge(
                indices[edge.source.as_str()],
                indices[edge.target.as_str()],
                (),
            );
        }
        if is_cyclic_directed(&graph) {
            return Err(ChainError::CycleDetected {
                chain_id: self.id.clone(),
            });
        }
        Ok(())
    }

    /// Runs the chain to quiescence against the given store bundle.
    ///
    /// Returns once every node transitively launched by this chain,
    /// including any nested chains, has finished. Structural errors are
    /// reported here if the chain was assembled without going through
    /// [`ChainBuilder::build`].
    pub async fn execute(self: &Arc<Self>, stores: &RunStores) -> Result<RunSummary> {
        let run_id = cuid2::create_id();
        info!("Chain '{}' run '{}' started", self.id, run_id);
        let summary = self.launch(None, stores, &run_id).await?;
        info!(
            "Chain '{}' run '{}' finished with {} nodes completed",
            self.id,
            run_id,
            summary.completed.len()
        );
        Ok(summary)
    }

    /// Shared run protocol for top-level and nested invocations: validate,
    /// reset transient state, dispatch the entry node, then drain the join
    /// channel until every launched task has finished.
    async fn launch(
        self: &Arc<Self>,
        parent: Option<&RunContext>,
        stores: &RunStores,
        run_id: &str,
    ) -> Result<RunSummary> {
        let entry = self.entry_node()?;

        // Runs of one chain instance are serialized; transient state
        // belongs to the active run.
        let _run = self.run_lock.lock().await;
        self.state.reset();

        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let ctx = match parent {
            Some(outer) => outer.scoped(self.clone(), done_tx),
            None => RunContext::new(run_id.to_string(), self.clone(), stores.clone(), done_tx),
        };
        self.dispatch(entry, &ctx);
        // Every launched task owns a context clone; dropping ours lets the
        // channel close once the last task finishes.
        drop(ctx);

        let mut completed = Vec::new();
        while let Some(node_id) = done_rx.recv().await {
            debug!("Chain '{}': node '{}' task finished", self.id, node_id);
            completed.push(node_id);
        }
        Ok(RunSummary {
            run_id: run_id.to_string(),
            completed,
        })
    }

    /// Launches one node as a concurrent task, unless the chain is
    /// cancelled or the node was already dispatched in this run.
    fn dispatch(&self, node: Arc<dyn RunnableNode>, ctx: &RunContext) {
        if self.state.cancelled.load(Ordering::SeqCst) {
            debug!(
                "Chain '{}': dispatch of '{}' suppressed, chain stopped",
                self.id,
                node.id()
            );
            return;
        }
        if !self.state.dispatched.insert(node.id().to_string()) {
            // Two predecessors finishing together can both find a successor
            // ready; only the first launch counts.
            debug!(
                "Chain '{}': node '{}' already dispatched in this run",
                self.id,
                node.id()
            );
            return;
        }

        let node_id = node.id().to_string();
        debug!("Chain '{}': dispatching node '{}'", self.id, node_id);
        let ctx = ctx.clone();
        tokio::spawn(async move {
            node.run(ctx.clone()).await;
            ctx.signal_done(&node_id);
        });
    }

    /// Dependency-satisfaction dispatch, invoked by a node (or nested
    /// chain) on completion.
    ///
    /// Marks `current` completed, then checks each successor: a successor
    /// with no outstanding predecessors is launched immediately; the rest
    /// are parked on the wait-list keyed by the predecessors still owed.
    /// Nodes with no successors end their branch here, silently.
    pub fn next(&self, current: &str, ctx: &RunContext) {
        if self.state.cancelled.load(Ordering::SeqCst) {
            debug!(
                "Chain '{}': successor dispatch from '{}' suppressed, chain stopped",
                self.id, current
            );
            return;
        }
        self.state.completed.insert(current.to_string());

        for candidate in self.successors_of(current) {
            // The wait-list entry is updated under its shard lock, so
            // concurrent completions of two predecessors cannot both see
            // the set drain; the dispatch guard covers the vacant path.
            let ready = match self.state.waiting.entry(candidate.clone()) {
                Entry::Occupied(mut entry) => {
                    entry
                        .get_mut()
                        .retain(|pred| !self.state.completed.contains(pred));
                    if entry.get().is_empty() {
                        entry.remove();
                        true
                    } else {
                        false
                    }
                }
                Entry::Vacant(slot) => {
                    let outstanding: HashSet<String> = self
                        .predecessors_of(&candidate)
                        .into_iter()
                        .filter(|pred| !self.state.completed.contains(pred))
                        .collect();
                    if outstanding.is_empty() {
                        true
                    } else {
                        slot.insert(outstanding);
                        false
                    }
                }
            };

            if ready {
                if let Some(node) = self.nodes.get(&candidate) {
                    self.dispatch(node.clone(), ctx);
                } else {
                    error!(
                        "Chain '{}': edge targets unknown node '{}'",
                        self.id, candidate
                    );
                }
            }
        }
    }

    /// Cooperatively cancels the run in progress: no new node is
    /// dispatched, nodes already running are not interrupted, and the run
    /// still joins everything in flight before returning.
    pub fn stop(&self) {
        if !self.state.cancelled.swap(true, Ordering::SeqCst) {
            info!("Chain '{}' stopped, suppressing further dispatch", self.id);
        }
    }

    fn successors_of(&self, node_id: &str) -> Vec<String> {
        let mut successors = Vec::new();
        for edge in &self.edges {
            if edge.source == node_id && !successors.contains(&edge.target) {
                successors.push(edge.target.clone());
            }
        }
        successors
    }

    fn predecessors_of(&self, node_id: &str) -> Vec<String> {
        let mut predecessors = Vec::new();
        for edge in &self.edges {
            if edge.target == node_id && !predecessors.contains(&edge.source) {
                predecessors.push(edge.source.clone());
            }
        }
        predecessors
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut node_ids: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        node_ids.sort_unstable();
        f.debug_struct("Chain")
            .field("id", &self.id)
            .field("nodes", &node_ids)
            .field("edges", &self.edges)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl RunnableNode for Chain {
    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<()> {
        Chain::validate(self)
    }

    /// Runs the whole sub-graph against a context scoped to this chain,
    /// then notifies the outer chain exactly as an ordinary node would.
    async fn run(self: Arc<Self>, ctx: RunContext) {
        match self.launch(Some(&ctx), ctx.stores(), ctx.run_id()).await {
            Ok(summary) => {
                debug!(
                    "Nested chain '{}' finished with {} nodes completed",
                    self.id,
                    summary.completed.len()
                );
            }
            Err(err) => {
                // Unreachable when the outer chain was validated up front;
                // stop the outer run rather than dispatch past a broken
                // sub-graph.
                error!("Nested chain '{}' failed validation: {}", self.id, err);
                ctx.chain().stop();
            }
        }
        ctx.chain().next(self.id(), &ctx);
    }
}

/// Fluent graph construction; validates the finished chain at `build`.
pub struct ChainBuilder {
    id: String,
    nodes: Vec<Arc<dyn RunnableNode>>,
    edges: Vec<Edge>,
    detect_cycles: bool,
}

impl ChainBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            detect_cycles: false,
        }
    }

    pub fn node(mut self, node: Arc<dyn RunnableNode>) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn edge(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.edges.push(Edge {
            source: source.into(),
            target: target.into(),
        });
        self
    }

    pub fn detect_cycles(mut self, enabled: bool) -> Self {
        self.detect_cycles = enabled;
        self
    }

    pub fn build(self) -> Result<Arc<Chain>> {
        let mut chain = Chain::new(self.id);
        chain.detect_cycles(self.detect_cycles);
        for node in self.nodes {
            chain.add_node(node)?;
        }
        for edge in self.edges {
            chain.add_edge(edge.source, edge.target);
        }
        chain.validate()?;
        Ok(Arc::new(chain))
    }
}
