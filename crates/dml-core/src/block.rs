// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - BLOCKS
//
// A block batches transactions of one shard behind a previous-hash link.
// Hash covers: number, timestamp, previous hash, Merkle root, state root,
// validator, shard, nonce, gas used, gas limit. The consensus proof is made
// over the finished hash and is therefore not part of it.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::errors::{ChainError, ChainResult};
use crate::merkle::{hash_leaf, MerkleTree};
use crate::proof::ConsensusProof;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Block {
    pub number: u64,
    /// Unix milliseconds.
    pub timestamp: u64,
    pub previous_hash: String,
    pub hash: String,
    pub validator: String,
    pub shard_id: u32,
    pub transactions: Vec<Transaction>,
    pub merkle_root: String,
    /// Opaque; carried in the hash, never interpreted.
    #[serde(default)]
    pub state_root: String,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub nonce: u64,
    /// Serialized JSON length in bytes, refreshed with the hash.
    #[serde(default)]
    pub size: usize,
    #[serde(default)]
    pub proof: Option<ConsensusProof>,
}

impl Block {
    pub fn new(
        number: u64,
        previous_hash: impl Into<String>,
        validator: impl Into<String>,
        shard_id: u32,
        gas_limit: u64,
        timestamp: u64,
    ) -> Self {
        let mut block = Block {
            number,
            timestamp,
            previous_hash: previous_hash.into(),
            hash: String::new(),
            validator: validator.into(),
            shard_id,
            transactions: Vec::new(),
            merkle_root: String::new(),
            state_root: String::new(),
            gas_used: 0,
            gas_limit,
            nonce: 0,
            size: 0,
            proof: None,
        };
        block.refresh();
        block
    }

    pub fn calculate_merkle_root(&self) -> String {
        MerkleTree::new(self.transactions.iter().map(|tx| tx.hash.as_bytes())).root().to_string()
    }

    pub fn calculate_hash(&self) -> String {
        let mut hasher = Sha3_256::new();
        hasher.update(self.number.to_be_bytes());
        hasher.update(self.timestamp.to_be_bytes());
        hasher.update(self.previous_hash.as_bytes());
        hasher.update(self.merkle_root.as_bytes());
        hasher.update((self.state_root.len() as u64).to_be_bytes());
        hasher.update(self.state_root.as_bytes());
        hasher.update((self.validator.len() as u64).to_be_bytes());
        hasher.update(self.validator.as_bytes());
        hasher.update(self.shard_id.to_be_bytes());
        hasher.update(self.nonce.to_be_bytes());
        hasher.update(self.gas_used.to_be_bytes());
        hasher.update(self.gas_limit.to_be_bytes());
        hex::encode(hasher.finalize())
    }

    /// Recompute every derived field: Merkle root, hash, size.
    pub fn refresh(&mut self) {
        self.merkle_root = self.calculate_merkle_root();
        self.hash = self.calculate_hash();
        self.size = serde_json::to_vec(&*self).map(|b| b.len()).unwrap_or(0);
    }

    /// Set the opaque state root and re-hash.
    pub fn set_state_root(&mut self, state_root: impl Into<String>) {
        self.state_root = state_root.into();
        self.refresh();
    }

    /// Append `tx` if it validates and its estimated gas fits the block.
    ///
    /// The estimate becomes the transaction's `gas_used`.
    pub fn add_transaction(&mut self, mut tx: Transaction) -> ChainResult<()> {
        let errors = tx.validate();
        if !errors.is_empty() {
            return Err(ChainError::InvalidTransaction(errors));
        }

        let estimate = tx.intrinsic_gas();
        if self.gas_used.saturating_add(estimate) > self.gas_limit {
            return Err(ChainError::BlockGasExceeded {
                used: self.gas_used,
                requested: estimate,
                limit: self.gas_limit,
            });
        }

        tx.gas_used = estimate;
        self.gas_used += estimate;
        self.transactions.push(tx);
        self.refresh();
        Ok(())
    }

    pub fn attach_proof(&mut self, proof: ConsensusProof) {
        self.proof = Some(proof);
    }

    /// Structural checks against the predecessor. Empty means valid.
    ///
    /// The consensus proof is checked by the caller's proof scheme, not here.
    pub fn validate(&self, previous: &Block) -> Vec<String> {
        let mut errors = Vec::new();

        if self.number != previous.number + 1 {
            errors.push(format!(
                "Invalid block number: expected {}, got {}",
                previous.number + 1,
                self.number
            ));
        }
        if self.previous_hash != previous.hash {
            errors.push("Invalid previous hash".to_string());
        }
        if self.merkle_root != self.calculate_merkle_root() {
            errors.push("Invalid Merkle root".to_string());
        }
        if self.hash != self.calculate_hash() {
            errors.push("Invalid block hash".to_string());
        }
        if self.timestamp <= previous.timestamp {
            errors.push("Timestamp must be after previous block".to_string());
        }
        if self.gas_used > self.gas_limit {
            errors.push("Gas used exceeds gas limit".to_string());
        }
        let tx_gas: u64 = self.transactions.iter().map(|tx| tx.gas_used).sum();
        if tx_gas != self.gas_used {
            errors.push(format!(
                "Gas used {} does not match transactions total {}",
                self.gas_used, tx_gas
            ));
        }
        for (i, tx) in self.transactions.iter().enumerate() {
            for err in tx.validate() {
                errors.push(format!("Transaction {} ({}): {}", i, tx.hash, err));
            }
        }

        errors
    }

    pub fn transaction_index(&self, tx_hash: &str) -> Option<usize> {
        self.transactions.iter().position(|tx| tx.hash == tx_hash)
    }

    pub fn transaction_proof(&self, tx_hash: &str) -> ChainResult<Vec<String>> {
        let index = self
            .transaction_index(tx_hash)
            .ok_or_else(|| ChainError::TransactionNotInBlock(tx_hash.to_string()))?;
        MerkleTree::new(self.transactions.iter().map(|tx| tx.hash.as_bytes())).proof(index)
    }

    pub fn verify_transaction_proof(&self, tx_hash: &str, proof: &[String]) -> bool {
        match self.transaction_index(tx_hash) {
            Some(index) => {
                MerkleTree::verify_proof(&hash_leaf(tx_hash.as_bytes()), proof, &self.merkle_root, index)
            }
            None => false,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dml_crypto::generate_keypair_from_seed;
    use num_bigint::BigUint;

    fn signed_tx(nonce: u64, payload: Option<Vec<u8>>, gas_limit: u64) -> Transaction {
        let kp = generate_keypair_from_seed(&[1u8; 32]).unwrap();
        let mut tx = Transaction::new(
            "0xsender0000000000001",
            "0xrecipient000000002",
            BigUint::from(10u32),
            BigUint::from(2u32),
            gas_limit,
            nonce,
            payload,
        )
        .with_timestamp(1_700_000_000_000 + nonce);
        tx.sign(&kp.secret_key, &kp.public_key).unwrap();
        tx
    }

    fn genesis() -> Block {
        Block::new(0, "0".repeat(64), "genesis", 0, 30_000_000, 1_000)
    }

    fn child(prev: &Block) -> Block {
        Block::new(prev.number + 1, prev.hash.clone(), "0xvalidator", 0, 30_000_000, prev.timestamp + 1)
    }

    #[test]
    fn test_empty_block_merkle_root() {
        let b = genesis();
        assert_eq!(b.merkle_root, dml_crypto::sha3_hex(b""));
        assert!(b.size > 0);
    }

    #[test]
    fn test_add_transaction_updates_derived_fields() {
        let g = genesis();
        let mut b = child(&g);
        let before = b.hash.clone();
        b.add_transaction(signed_tx(0, Some(vec![0u8; 4]), 50_000)).unwrap();
        assert_ne!(b.hash, before);
        assert_eq!(b.gas_used, 21_000 + 4 * 68);
        assert_eq!(b.transactions[0].gas_used, b.gas_used);
        assert!(b.validate(&g).is_empty(), "{:?}", b.validate(&g));
    }

    #[test]
    fn test_gas_limit_enforced() {
        let g = genesis();
        let mut b = Block::new(1, g.hash.clone(), "0xvalidator", 0, 50_000, 2_000);
        b.add_transaction(signed_tx(0, None, 21_000)).unwrap();
        b.add_transaction(signed_tx(1, None, 21_000)).unwrap();
        let err = b.add_transaction(signed_tx(2, None, 21_000)).unwrap_err();
        assert!(matches!(err, ChainError::BlockGasExceeded { used: 42_000, .. }));
        assert_eq!(b.transactions.len(), 2);
    }

    #[test]
    fn test_intrinsic_gas_over_tx_limit_rejected() {
        let mut b = child(&genesis());
        let err = b.add_transaction(signed_tx(0, Some(vec![1u8; 100]), 21_000)).unwrap_err();
        assert!(matches!(err, ChainError::InvalidTransaction(_)));
    }

    #[test]
    fn test_unsigned_transaction_rejected() {
        let mut b = child(&genesis());
        let mut tx = signed_tx(0, None, 21_000);
        tx.signature = None;
        assert!(matches!(
            b.add_transaction(tx),
            Err(ChainError::InvalidTransaction(_))
        ));
    }

    #[test]
    fn test_validate_detects_each_violation() {
        let g = genesis();
        let good = child(&g);

        let mut wrong_number = good.clone();
        wrong_number.number = 5;
        wrong_number.hash = wrong_number.calculate_hash();
        assert!(wrong_number.validate(&g)[0].starts_with("Invalid block number"));

        let mut wrong_link = good.clone();
        wrong_link.previous_hash = "f".repeat(64);
        wrong_link.hash = wrong_link.calculate_hash();
        assert_eq!(wrong_link.validate(&g), vec!["Invalid previous hash".to_string()]);

        let mut stale = good.clone();
        stale.timestamp = g.timestamp;
        stale.hash = stale.calculate_hash();
        assert_eq!(stale.validate(&g), vec!["Timestamp must be after previous block".to_string()]);

        let mut forged = good.clone();
        forged.hash = "a".repeat(64);
        assert_eq!(forged.validate(&g), vec!["Invalid block hash".to_string()]);
    }

    #[test]
    fn test_tampered_transaction_breaks_merkle_root() {
        let g = genesis();
        let mut b = child(&g);
        b.add_transaction(signed_tx(0, None, 21_000)).unwrap();
        b.transactions[0].hash = "b".repeat(64);
        let errors = b.validate(&g);
        assert!(errors.contains(&"Invalid Merkle root".to_string()));
    }

    #[test]
    fn test_transaction_proofs() {
        let mut b = child(&genesis());
        for n in 0..5 {
            b.add_transaction(signed_tx(n, None, 21_000)).unwrap();
        }
        let target = b.transactions[3].hash.clone();
        let proof = b.transaction_proof(&target).unwrap();
        assert!(b.verify_transaction_proof(&target, &proof));

        let other = b.transactions[1].hash.clone();
        assert!(!b.verify_transaction_proof(&other, &proof));
        assert!(matches!(
            b.transaction_proof("missing"),
            Err(ChainError::TransactionNotInBlock(_))
        ));
    }

    #[test]
    fn test_hash_ignores_proof() {
        let mut b = child(&genesis());
        let h = b.hash.clone();
        b.attach_proof(ConsensusProof::genesis());
        assert_eq!(b.calculate_hash(), h);
    }

    #[test]
    fn test_state_root_is_hashed() {
        let mut b = child(&genesis());
        let h = b.hash.clone();
        b.set_state_root("root-a");
        assert_ne!(b.hash, h);
    }

    #[test]
    fn test_json_round_trip() {
        let mut b = child(&genesis());
        b.add_transaction(signed_tx(0, Some(vec![9, 9]), 30_000)).unwrap();
        b.attach_proof(ConsensusProof::genesis());
        let back = Block::from_json(&b.to_json().unwrap()).unwrap();
        assert_eq!(back, b);
    }
}
