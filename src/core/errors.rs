use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = ChainError> = std::result::Result<T, E>;

/// Structural and configuration errors surfaced by chain construction,
/// validation, and serialization.
///
/// Business-logic failure inside a node is deliberately absent: a run
/// function signals failure through `stop` or through sentinel outputs in
/// the param store, never through this enum.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain '{chain_id}' has no nodes")]
    EmptyChain { chain_id: String },

    #[error("duplicate node '{node_id}' in chain '{chain_id}'")]
    DuplicateNode { chain_id: String, node_id: String },

    #[error("edge in chain '{chain_id}' references unknown node '{node_id}'")]
    UnknownNode { chain_id: String, node_id: String },

    #[error("chain '{chain_id}' has no entry node")]
    NoEntryNode { chain_id: String },

    #[error("chain '{chain_id}' has multiple entry nodes: {nodes:?}")]
    MultipleEntryNodes { chain_id: String, nodes: Vec<String> },

    #[error("chain '{chain_id}' contains a cycle")]
    CycleDetected { chain_id: String },

    #[error("node '{node_id}' maps input '{local}' to malformed reference '{reference}' (expected \"producer/key\")")]
    MalformedParamRef {
        node_id: String,
        local: String,
        reference: String,
    },

    #[error("serialization failed")]
    Serialization(#[from] serde_json::Error),
}
