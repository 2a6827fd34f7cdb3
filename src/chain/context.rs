//! Run-scoped execution context handed to every dispatched node.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::chain::chain::Chain;
use crate::store::{DetailLog, ParamStore, VariableStore};

/// The Param/Variable/Detail stores backing one top-level run.
///
/// Created by the caller, shared by reference with every nested chain
/// invoked during the run. Cloning shares the underlying storage.
#[derive(Debug, Clone, Default)]
pub struct RunStores {
    pub params: ParamStore,
    pub variables: VariableStore,
    pub details: DetailLog,
}

impl RunStores {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Context passed to every node task launched by a chain.
///
/// Carries the owning chain explicitly rather than through ambient state:
/// `chain()` is always the chain that dispatched this node, and `parent()`
/// reaches the enclosing context when that chain runs nested inside
/// another. The context also holds this run's join-channel sender, so a
/// clone kept alive past a node's return keeps the run joined on it.
#[derive(Clone)]
pub struct RunContext {
    run_id: String,
    chain: Arc<Chain>,
    parent: Option<Arc<RunContext>>,
    stores: RunStores,
    done_tx: mpsc::UnboundedSender<String>,
}

impl RunContext {
    pub(crate) fn new(
        run_id: String,
        chain: Arc<Chain>,
        stores: RunStores,
        done_tx: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            run_id,
            chain,
            parent: None,
            stores,
            done_tx,
        }
    }

    /// Derives the context a nested chain hands to its own nodes: same run,
    /// same stores, chain reference replaced, this context kept as parent.
    pub(crate) fn scoped(
        &self,
        chain: Arc<Chain>,
        done_tx: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            run_id: self.run_id.clone(),
            chain,
            parent: Some(Arc::new(self.clone())),
            stores: self.stores.clone(),
            done_tx,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The chain that dispatched this node.
    pub fn chain(&self) -> &Arc<Chain> {
        &self.chain
    }

    /// The enclosing context when the current chain runs as a nested node.
    pub fn parent(&self) -> Option<&RunContext> {
        self.parent.as_deref()
    }

    pub fn stores(&self) -> &RunStores {
        &self.stores
    }

    pub fn params(&self) -> &ParamStore {
        &self.stores.params
    }

    pub fn variables(&self) -> &VariableStore {
        &self.stores.variables
    }

    pub fn details(&self) -> &DetailLog {
        &self.stores.details
    }

    /// Cooperatively cancels the owning chain.
    pub fn stop(&self) {
        self.chain.stop();
    }

    pub(crate) fn signal_done(&self, node_id: &str) {
        // The receiver only closes once the run has drained; a send can
        // fail only if the run was abandoned, which is fine to ignore.
        let _ = self.done_tx.send(node_id.to_string());
    }
}
