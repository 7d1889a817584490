// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - CORE MODULE
//
// Ledger primitives: Transaction, MerkleTree, Block, the pluggable consensus
// proof capability, and the Blockchain state machine with its pending pool.
// Amounts are arbitrary-precision (num-bigint) and serialize as decimal strings.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::time::{SystemTime, UNIX_EPOCH};

pub mod block;
pub mod chain;
pub mod codec;
pub mod errors;
pub mod merkle;
pub mod proof;
pub mod state;
pub mod transaction;

pub use block::Block;
pub use chain::{AccountState, Blockchain, ChainConfig, ChainStats};
pub use errors::{ChainError, ChainResult, ProofError};
pub use merkle::MerkleTree;
pub use proof::{ConsensusProof, DigestProofScheme, ProofAlgorithm, ProofScheme};
pub use state::ChainState;
pub use transaction::{shard_of, SignatureScheme, Transaction, TransactionSignature, TxStatus};

/// Default per-block gas ceiling.
pub const DEFAULT_BLOCK_GAS_LIMIT: u64 = 30_000_000;
/// Upper bound on transactions assembled into one block.
pub const MAX_BLOCK_TRANSACTIONS: usize = 1000;
/// Shortest accepted sender/recipient address.
pub const MIN_ADDRESS_LEN: usize = 10;
/// `previous_hash` of block 0.
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Unix time in milliseconds. A clock before 1970 reads as 0.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Result of offering a block to the chain.
/// Callers check `is_new()` before re-propagating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessResult {
    Applied(String),
    Duplicate(String),
}

impl ProcessResult {
    pub fn hash(&self) -> &str {
        match self {
            ProcessResult::Applied(h) | ProcessResult::Duplicate(h) => h,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, ProcessResult::Applied(_))
    }
}
