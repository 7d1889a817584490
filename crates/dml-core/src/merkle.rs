// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - MERKLE TREE
//
// Commits an ordered item list to one SHA3-256 root.
// - leaf      = H(item)
// - parent    = H(left_hex ‖ right_hex)
// - odd level → last node is paired with itself
// - no items  → single level [H("")]
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::errors::ChainError;
use dml_crypto::{sha3_hex, sha3_hex_parts};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleTree {
    /// `levels[0]` are the leaves, the last level holds only the root.
    levels: Vec<Vec<String>>,
    leaf_count: usize,
}

pub fn hash_leaf(item: &[u8]) -> String {
    sha3_hex(item)
}

fn hash_pair(left: &str, right: &str) -> String {
    sha3_hex_parts(&[left.as_bytes(), right.as_bytes()])
}

impl MerkleTree {
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let leaves: Vec<String> = items.into_iter().map(|i| hash_leaf(i.as_ref())).collect();
        let leaf_count = leaves.len();
        if leaves.is_empty() {
            return MerkleTree {
                levels: vec![vec![sha3_hex(b"")]],
                leaf_count: 0,
            };
        }

        let mut levels = vec![leaves];
        while let Some(current) = levels.last().filter(|l| l.len() > 1) {
            let next: Vec<String> = current
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&pair[0])))
                .collect();
            levels.push(next);
        }

        MerkleTree { levels, leaf_count }
    }

    pub fn root(&self) -> &str {
        // Construction always leaves at least one level with one node.
        self.levels
            .last()
            .and_then(|l| l.first())
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn leaves(&self) -> &[String] {
        if self.leaf_count == 0 {
            return &[];
        }
        &self.levels[0]
    }

    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Number of hashing rounds from leaf to root.
    pub fn depth(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    /// Sibling hashes from leaf `index` up to (excluding) the root.
    pub fn proof(&self, index: usize) -> Result<Vec<String>, ChainError> {
        if index >= self.leaf_count {
            return Err(ChainError::MerkleIndexOutOfRange {
                index,
                leaves: self.leaf_count,
            });
        }

        let mut proof = Vec::with_capacity(self.depth());
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
            // Unpaired node stands in for its own sibling.
            proof.push(level.get(sibling).unwrap_or(&level[idx]).clone());
            idx /= 2;
        }
        Ok(proof)
    }

    /// Re-derive the root from `leaf_hash` and its sibling path.
    pub fn verify_proof(leaf_hash: &str, proof: &[String], root: &str, index: usize) -> bool {
        let mut computed = leaf_hash.to_string();
        let mut idx = index;
        for sibling in proof {
            computed = if idx % 2 == 0 {
                hash_pair(&computed, sibling)
            } else {
                hash_pair(sibling, &computed)
            };
            idx /= 2;
        }
        computed == root
    }
}
