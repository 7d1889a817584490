use crate::cross_shard::TransferState;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Node {0} already present")]
    DuplicateNode(String),

    #[error("Node {0} not found")]
    UnknownNode(String),

    #[error("Shard {0} does not exist")]
    UnknownShard(u32),

    #[error("Transaction {0} already pending in shard {1}")]
    DuplicateTransaction(String, u32),

    #[error("Cross-shard processing is disabled")]
    CrossShardDisabled,

    #[error("Invalid transaction: {0:?}")]
    InvalidTransaction(Vec<String>),

    #[error("Transfer {0}: could not lock both accounts before timeout")]
    LockTimeout(String),

    #[error("Transfer {0}: lock lease expired before commit")]
    LeaseExpired(String),

    #[error("Transfer {0} not found")]
    UnknownTransfer(String),

    #[error("Transfer {id} is {state:?}, expected {expected:?}")]
    InvalidTransferState {
        id: String,
        state: TransferState,
        expected: TransferState,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type NetworkResult<T> = Result<T, NetworkError>;

impl From<serde_json::Error> for NetworkError {
    fn from(e: serde_json::Error) -> Self {
        NetworkError::Serialization(e.to_string())
    }
}
