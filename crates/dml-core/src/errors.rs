use thiserror::Error;

/// Failures raised by the chain state machine.
///
/// Structural problems carry the full violation list so callers can log or
/// surface every broken invariant at once.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Invalid transaction: {}", .0.join("; "))]
    InvalidTransaction(Vec<String>),

    #[error("Transaction already pending: {0}")]
    DuplicateTransaction(String),

    #[error("Invalid block: {}", .0.join("; "))]
    InvalidBlock(Vec<String>),

    #[error("Block gas limit exceeded: {used} + {requested} > {limit}")]
    BlockGasExceeded { used: u64, requested: u64, limit: u64 },

    #[error("Invalid consensus proof for block {0}")]
    InvalidProof(u64),

    #[error("Proof generation failed: {0}")]
    Proof(#[from] ProofError),

    #[error("Merkle proof index {index} out of range for {leaves} leaves")]
    MerkleIndexOutOfRange { index: usize, leaves: usize },

    #[error("Transaction {0} not found in block")]
    TransactionNotInBlock(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures raised by a [`crate::ProofScheme`] while producing a proof.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    #[error("Unknown validator: {0}")]
    UnknownValidator(String),

    #[error("Validator {0} is not eligible to propose")]
    IneligibleValidator(String),

    #[error("Block has no hash to prove")]
    MissingBlockHash,

    #[error("Proof search exhausted after {0} attempts")]
    SearchExhausted(u32),
}

pub type ChainResult<T> = Result<T, ChainError>;

impl From<serde_json::Error> for ChainError {
    fn from(e: serde_json::Error) -> Self {
        ChainError::Serialization(e.to_string())
    }
}
