pub mod chain;
pub mod context;
pub mod node;

pub use chain::{Chain, ChainBuilder, Edge, RunSummary};
pub use context::{RunContext, RunStores};
pub use node::{DefaultNode, NodeOutput, RunnableNode};
