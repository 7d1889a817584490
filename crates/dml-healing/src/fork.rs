// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - FORK RESOLVER
//
// A fork is two branches that start at the same height with different hashes.
// Each fork is resolved exactly once by the strategy fixed at construction:
//   LongestChain   - more blocks
//   HeaviestChain  - more cumulative gas used
//   ValidatorVote  - more distinct proposers
// Ties go to the first branch.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::errors::{HealingError, HealingResult};
use dml_core::{now_millis, Block};
use dml_crypto::sha3_hex_parts;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForkStrategy {
    #[default]
    LongestChain,
    HeaviestChain,
    ValidatorVote,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Branch {
    First,
    Second,
}

/// Last block both branches agree on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommonAncestor {
    pub number: u64,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fork {
    pub id: String,
    /// `None` when the branches share no known block.
    pub common_ancestor: Option<CommonAncestor>,
    pub branch1: Vec<Block>,
    pub branch2: Vec<Block>,
    pub detected_at: u64,
    pub resolution: Option<Branch>,
}

impl Fork {
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    pub fn height(&self) -> u64 {
        self.branch1.first().map(|b| b.number).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ForkStats {
    pub total: usize,
    pub active: usize,
    pub resolved: usize,
}

fn fork_id(first: &Block, second: &Block) -> String {
    sha3_hex_parts(&[first.hash.as_bytes(), second.hash.as_bytes()])
}

fn cumulative_gas(branch: &[Block]) -> u128 {
    branch.iter().map(|b| b.gas_used as u128).sum()
}

fn distinct_validators(branch: &[Block]) -> usize {
    branch.iter().map(|b| b.validator.as_str()).collect::<BTreeSet<_>>().len()
}

#[derive(Debug, Clone, Default)]
pub struct ForkResolver {
    strategy: ForkStrategy,
    forks: BTreeMap<String, Fork>,
}

impl ForkResolver {
    pub fn new(strategy: ForkStrategy) -> Self {
        ForkResolver {
            strategy,
            forks: BTreeMap::new(),
        }
    }

    pub fn strategy(&self) -> ForkStrategy {
        self.strategy
    }

    /// Two competing blocks at one height. Their ancestor is known only when
    /// they extend the same parent.
    pub fn detect_fork(&mut self, first: &Block, second: &Block) -> Option<Fork> {
        if first.number != second.number || first.hash == second.hash {
            return None;
        }
        let common_ancestor = (first.previous_hash == second.previous_hash && first.number > 0).then(|| {
            CommonAncestor {
                number: first.number - 1,
                hash: first.previous_hash.clone(),
            }
        });
        Some(self.record(first, second, common_ancestor, vec![first.clone()], vec![second.clone()]))
    }

    /// Compare two chains block by block from genesis. A chain that is a
    /// prefix of the other is behind, not forked.
    pub fn detect_fork_between(&mut self, chain_a: &[Block], chain_b: &[Block]) -> Option<Fork> {
        let shared = chain_a
            .iter()
            .zip(chain_b)
            .take_while(|(a, b)| a.hash == b.hash)
            .count();
        let (Some(first), Some(second)) = (chain_a.get(shared), chain_b.get(shared)) else {
            return None;
        };
        if first.number != second.number {
            return None;
        }
        let common_ancestor = shared
            .checked_sub(1)
            .and_then(|i| chain_a.get(i))
            .map(|b| CommonAncestor {
                number: b.number,
                hash: b.hash.clone(),
            });
        Some(self.record(
            first,
            second,
            common_ancestor,
            chain_a[shared..].to_vec(),
            chain_b[shared..].to_vec(),
        ))
    }

    fn record(
        &mut self,
        first: &Block,
        second: &Block,
        common_ancestor: Option<CommonAncestor>,
        branch1: Vec<Block>,
        branch2: Vec<Block>,
    ) -> Fork {
        let id = fork_id(first, second);
        if let Some(existing) = self.forks.get(&id) {
            return existing.clone();
        }
        warn!(
            "fork detected at height {}: {} vs {}",
            first.number, first.hash, second.hash
        );
        let fork = Fork {
            id: id.clone(),
            common_ancestor,
            branch1,
            branch2,
            detected_at: now_millis(),
            resolution: None,
        };
        self.forks.insert(id, fork.clone());
        fork
    }

    pub fn resolve_fork(&mut self, id: &str) -> HealingResult<Branch> {
        let strategy = self.strategy;
        let fork = self
            .forks
            .get_mut(id)
            .ok_or_else(|| HealingError::UnknownFork(id.to_string()))?;
        if fork.is_resolved() {
            return Err(HealingError::ForkAlreadyResolved(id.to_string()));
        }

        let first_wins = match strategy {
            ForkStrategy::LongestChain => fork.branch1.len() >= fork.branch2.len(),
            ForkStrategy::HeaviestChain => cumulative_gas(&fork.branch1) >= cumulative_gas(&fork.branch2),
            ForkStrategy::ValidatorVote => {
                distinct_validators(&fork.branch1) >= distinct_validators(&fork.branch2)
            }
        };
        let winner = if first_wins { Branch::First } else { Branch::Second };
        fork.resolution = Some(winner);
        info!("fork {} resolved by {:?}: {:?} wins", id, strategy, winner);
        Ok(winner)
    }

    pub fn get_fork(&self, id: &str) -> Option<&Fork> {
        self.forks.get(id)
    }

    pub fn active_forks(&self) -> Vec<&Fork> {
        self.forks.values().filter(|f| !f.is_resolved()).collect()
    }

    pub fn stats(&self) -> ForkStats {
        let resolved = self.forks.values().filter(|f| f.is_resolved()).count();
        ForkStats {
            total: self.forks.len(),
            active: self.forks.len() - resolved,
            resolved,
        }
    }
}
