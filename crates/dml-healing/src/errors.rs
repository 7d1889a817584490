use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HealingError {
    #[error("Fork {0} not found")]
    UnknownFork(String),

    #[error("Fork {0} was already resolved")]
    ForkAlreadyResolved(String),

    #[error("Recovery unavailable: {0}")]
    RecoveryUnavailable(String),

    #[error("Partition {0} not found")]
    UnknownPartition(String),

    #[error("Self-healing is disabled")]
    Disabled,

    #[error("Checkpoint signing failed: {0}")]
    Signing(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type HealingResult<T> = Result<T, HealingError>;

impl From<serde_json::Error> for HealingError {
    fn from(e: serde_json::Error) -> Self {
        HealingError::Serialization(e.to_string())
    }
}

impl From<dml_crypto::CryptoError> for HealingError {
    fn from(e: dml_crypto::CryptoError) -> Self {
        HealingError::Signing(e.to_string())
    }
}
