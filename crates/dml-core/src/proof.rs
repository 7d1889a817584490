// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - CONSENSUS PROOF CAPABILITY
//
// Every non-genesis block carries a proof produced by the proposing
// validator. The scheme is pluggable: the chain only needs `generate` and
// `verify`. No adversarial soundness is claimed for any scheme here.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::block::Block;
use crate::errors::ProofError;
use dml_crypto::sha3_hex_parts;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProofAlgorithm {
    /// Placeholder attached to block 0.
    Genesis,
    /// Hash chain only.
    Digest,
    /// Modular exponentiation commitment.
    DiscreteLog,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConsensusProof {
    pub algorithm: ProofAlgorithm,
    pub challenge: String,
    pub response: String,
    /// Scheme-specific witness values (decimal or hex strings).
    #[serde(default)]
    pub verification_data: BTreeMap<String, String>,
    pub difficulty: u32,
}

impl ConsensusProof {
    pub fn genesis() -> Self {
        ConsensusProof {
            algorithm: ProofAlgorithm::Genesis,
            challenge: "genesis".to_string(),
            response: "genesis".to_string(),
            verification_data: BTreeMap::new(),
            difficulty: 0,
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.algorithm == ProofAlgorithm::Genesis
    }
}

/// Produces and checks the proof attached to a block.
pub trait ProofScheme: Debug + Send + Sync {
    fn generate(&self, block: &Block, validator: &str) -> Result<ConsensusProof, ProofError>;

    fn verify(&self, block: &Block, proof: &ConsensusProof, validator: &str) -> bool;
}

/// challenge = H(block hash ‖ validator ‖ timestamp ‖ difficulty)
pub fn proof_challenge(block: &Block, validator: &str, difficulty: u32) -> String {
    sha3_hex_parts(&[
        block.hash.as_bytes(),
        validator.as_bytes(),
        &block.timestamp.to_be_bytes(),
        &difficulty.to_be_bytes(),
    ])
}

/// Default scheme: challenge plus a response hash bound to the validator.
#[derive(Debug, Clone)]
pub struct DigestProofScheme {
    pub difficulty: u32,
}

impl DigestProofScheme {
    pub fn new(difficulty: u32) -> Self {
        DigestProofScheme { difficulty }
    }

    fn response(challenge: &str, validator: &str) -> String {
        sha3_hex_parts(&[challenge.as_bytes(), validator.as_bytes()])
    }
}

impl Default for DigestProofScheme {
    fn default() -> Self {
        DigestProofScheme::new(1)
    }
}

impl ProofScheme for DigestProofScheme {
    fn generate(&self, block: &Block, validator: &str) -> Result<ConsensusProof, ProofError> {
        if block.hash.is_empty() {
            return Err(ProofError::MissingBlockHash);
        }
        let challenge = proof_challenge(block, validator, self.difficulty);
        let response = Self::response(&challenge, validator);
        Ok(ConsensusProof {
            algorithm: ProofAlgorithm::Digest,
            challenge,
            response,
            verification_data: BTreeMap::new(),
            difficulty: self.difficulty,
        })
    }

    fn verify(&self, block: &Block, proof: &ConsensusProof, validator: &str) -> bool {
        if proof.algorithm != ProofAlgorithm::Digest || proof.difficulty < self.difficulty {
            return false;
        }
        let challenge = proof_challenge(block, validator, proof.difficulty);
        proof.challenge == challenge && proof.response == Self::response(&challenge, validator)
    }
}
