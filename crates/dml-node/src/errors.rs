use dml_consensus::ConsensusError;
use dml_core::ChainError;
use dml_healing::HealingError;
use dml_network::NetworkError;
use thiserror::Error;

/// Everything a [`crate::LedgerNode`] operation can fail with. Component
/// errors pass through unchanged.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Healing(#[from] HealingError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type NodeResult<T> = Result<T, NodeError>;

impl From<serde_json::Error> for NodeError {
    fn from(e: serde_json::Error) -> Self {
        NodeError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for NodeError {
    fn from(e: toml::de::Error) -> Self {
        NodeError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for NodeError {
    fn from(e: toml::ser::Error) -> Self {
        NodeError::Config(e.to_string())
    }
}
