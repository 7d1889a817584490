use dml_core::ProofError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("Validator {0} already registered")]
    AlreadyRegistered(String),

    #[error("Stake {stake} below minimum {minimum}")]
    StakeBelowMinimum { stake: String, minimum: String },

    #[error("Validator {0} not registered")]
    UnknownValidator(String),

    #[error("No eligible validator (total voting power is zero)")]
    NoEligibleValidator,

    #[error("Cannot withdraw {requested}: only {available} staked")]
    InsufficientStake { requested: String, available: String },

    #[error(transparent)]
    Proof(#[from] ProofError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type ConsensusResult<T> = Result<T, ConsensusError>;

impl From<serde_json::Error> for ConsensusError {
    fn from(e: serde_json::Error) -> Self {
        ConsensusError::Serialization(e.to_string())
    }
}
