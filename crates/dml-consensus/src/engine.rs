// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - CONSENSUS ENGINE
//
// Validator registry, stake-weighted proposer selection, proof handling,
// rewards and slashing.
//
// Selection:
// 1. total = Σ voting power over validators that can propose
// 2. target = SHA-256(previous hash ‖ height) as big-endian integer mod total
// 3. walk the registry in address order accumulating power; the first
//    validator whose running sum exceeds the target is chosen
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::errors::{ConsensusError, ConsensusResult};
use crate::proof::ModExpProofScheme;
use crate::validator::Validator;
use dml_core::{codec, now_millis, Block, ConsensusProof, ProofError, ProofScheme};
use log::{info, warn};
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fraction of stake removed per slash, as a divisor (10%).
pub const SLASH_STAKE_DIVISOR: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConsensusConfig {
    #[serde(with = "codec::decimal")]
    pub min_stake: BigUint,
    #[serde(with = "codec::decimal")]
    pub block_reward: BigUint,
    pub proof_difficulty: u32,
    /// Confirmations after which a block is final.
    pub finalization_blocks: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig {
            min_stake: BigUint::from(1_000u32) * BigUint::from(10u32).pow(18),
            block_reward: dml_core::chain::default_block_reward(),
            proof_difficulty: 1,
            finalization_blocks: 12,
        }
    }
}

/// Audit record of one slash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlashEvent {
    pub validator_address: String,
    pub reason: String,
    #[serde(with = "codec::decimal")]
    pub amount: BigUint,
    pub slash_count: u32,
    pub deactivated: bool,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsensusStats {
    pub total_validators: usize,
    pub active_validators: usize,
    #[serde(with = "codec::decimal")]
    pub total_stake: BigUint,
    pub average_reputation: f64,
    pub current_epoch: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsensusEngine {
    /// BTreeMap: selection walks validators in address order.
    validators: BTreeMap<String, Validator>,
    config: ConsensusConfig,
    current_epoch: u64,
    #[serde(default)]
    slash_log: Vec<SlashEvent>,
}

impl ConsensusEngine {
    pub fn new(config: ConsensusConfig) -> Self {
        ConsensusEngine {
            validators: BTreeMap::new(),
            config,
            current_epoch: 0,
            slash_log: Vec::new(),
        }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn current_epoch(&self) -> u64 {
        self.current_epoch
    }

    pub fn advance_epoch(&mut self) -> u64 {
        self.current_epoch += 1;
        info!("consensus epoch → {}", self.current_epoch);
        self.current_epoch
    }

    /// Proof scheme matching this engine's difficulty.
    pub fn proof_scheme(&self) -> ModExpProofScheme {
        ModExpProofScheme::new(self.config.proof_difficulty)
    }

    // ─────────────────────────────────────────────────────────────────
    // REGISTRY
    // ─────────────────────────────────────────────────────────────────

    pub fn register_validator(&mut self, validator: Validator) -> ConsensusResult<()> {
        if validator.stake < self.config.min_stake {
            return Err(ConsensusError::StakeBelowMinimum {
                stake: validator.stake.to_string(),
                minimum: self.config.min_stake.to_string(),
            });
        }
        if self.validators.contains_key(&validator.address) {
            return Err(ConsensusError::AlreadyRegistered(validator.address));
        }
        info!("validator registered: {} (stake {})", validator.address, validator.stake);
        self.validators.insert(validator.address.clone(), validator);
        Ok(())
    }

    pub fn unregister_validator(&mut self, address: &str) -> ConsensusResult<Validator> {
        self.validators
            .remove(address)
            .ok_or_else(|| ConsensusError::UnknownValidator(address.to_string()))
    }

    pub fn get_validator(&self, address: &str) -> Option<&Validator> {
        self.validators.get(address)
    }

    pub fn validators(&self) -> impl Iterator<Item = &Validator> {
        self.validators.values()
    }

    /// Validators that can currently propose, in address order.
    pub fn active_validators(&self) -> Vec<&Validator> {
        self.validators.values().filter(|v| v.can_propose()).collect()
    }

    /// Stake of every registered validator, active or not.
    pub fn total_stake(&self) -> BigUint {
        self.validators.values().map(|v| &v.stake).sum()
    }

    pub fn total_voting_power(&self) -> BigUint {
        self.active_validators().iter().map(|v| v.voting_power()).sum()
    }

    // ─────────────────────────────────────────────────────────────────
    // SELECTION
    // ─────────────────────────────────────────────────────────────────

    pub fn select_validator(&self, previous_hash: &str, height: u64) -> ConsensusResult<&Validator> {
        let active = self.active_validators();
        let total: BigUint = active.iter().map(|v| v.voting_power()).sum();
        if total.is_zero() {
            return Err(ConsensusError::NoEligibleValidator);
        }

        let mut seed = previous_hash.as_bytes().to_vec();
        seed.extend_from_slice(height.to_string().as_bytes());
        let target = BigUint::from_bytes_be(&dml_crypto::sha256_bytes(&seed)) % &total;

        let mut cumulative = BigUint::zero();
        for v in active {
            cumulative += v.voting_power();
            if cumulative > target {
                return Ok(v);
            }
        }
        // cumulative ends at total > target, so the loop always returns.
        Err(ConsensusError::NoEligibleValidator)
    }

    // ─────────────────────────────────────────────────────────────────
    // PROOFS & BLOCK VALIDATION
    // ─────────────────────────────────────────────────────────────────

    fn check_eligible(&self, validator: &str) -> Result<(), ProofError> {
        match self.validators.get(validator) {
            None => Err(ProofError::UnknownValidator(validator.to_string())),
            Some(v) if !v.can_propose() => Err(ProofError::IneligibleValidator(validator.to_string())),
            Some(_) => Ok(()),
        }
    }

    pub fn generate_proof(&self, block: &Block, validator: &str) -> ConsensusResult<ConsensusProof> {
        Ok(ProofScheme::generate(self, block, validator)?)
    }

    pub fn verify_proof(&self, block: &Block, proof: &ConsensusProof, validator: &str) -> bool {
        ProofScheme::verify(self, block, proof, validator)
    }

    /// Proposer eligibility, proof and linkage against `previous`.
    pub fn validate_block(&self, block: &Block, previous: &Block) -> Vec<String> {
        let mut errors = Vec::new();

        match self.validators.get(&block.validator) {
            None => errors.push("Validator not found".to_string()),
            Some(v) if !v.can_propose() => errors.push("Validator cannot propose blocks".to_string()),
            Some(_) => {}
        }
        match &block.proof {
            None => errors.push("Missing consensus proof".to_string()),
            Some(p) if !self.verify_proof(block, p, &block.validator) => {
                errors.push("Invalid consensus proof".to_string())
            }
            Some(_) => {}
        }
        if block.number != previous.number + 1 {
            errors.push("Invalid block number".to_string());
        }
        if block.previous_hash != previous.hash {
            errors.push("Invalid previous hash".to_string());
        }

        errors
    }

    // ─────────────────────────────────────────────────────────────────
    // REWARDS, SLASHING, FINALITY
    // ─────────────────────────────────────────────────────────────────

    /// Pay the configured block reward. Returns the amount paid.
    pub fn reward_validator(&mut self, address: &str) -> ConsensusResult<BigUint> {
        let reward = self.config.block_reward.clone();
        let v = self
            .validators
            .get_mut(address)
            .ok_or_else(|| ConsensusError::UnknownValidator(address.to_string()))?;
        v.reward(&reward);
        Ok(reward)
    }

    /// Remove 10% of stake and 10 reputation. Returns the stake removed.
    pub fn slash_validator(&mut self, address: &str, reason: &str) -> ConsensusResult<BigUint> {
        let v = self
            .validators
            .get_mut(address)
            .ok_or_else(|| ConsensusError::UnknownValidator(address.to_string()))?;

        let amount = &v.stake / BigUint::from(SLASH_STAKE_DIVISOR);
        let removed = v.slash(&amount);
        warn!(
            "validator {} slashed ({}): -{} stake, count {}{}",
            address,
            reason,
            removed,
            v.slash_count,
            if v.is_active { "" } else { ", deactivated" }
        );

        self.slash_log.push(SlashEvent {
            validator_address: address.to_string(),
            reason: reason.to_string(),
            amount: removed.clone(),
            slash_count: v.slash_count,
            deactivated: !v.is_active,
            timestamp: now_millis(),
        });
        Ok(removed)
    }

    pub fn slash_log(&self) -> &[SlashEvent] {
        &self.slash_log
    }

    pub fn is_finalized(&self, block_number: u64, current_height: u64) -> bool {
        current_height >= block_number
            && current_height - block_number >= self.config.finalization_blocks
    }

    pub fn stats(&self) -> ConsensusStats {
        let total = self.validators.len();
        let average_reputation = if total == 0 {
            0.0
        } else {
            self.validators.values().map(|v| v.reputation as f64).sum::<f64>() / total as f64
        };
        ConsensusStats {
            total_validators: total,
            active_validators: self.active_validators().len(),
            total_stake: self.total_stake(),
            average_reputation,
            current_epoch: self.current_epoch,
        }
    }

    pub fn to_json(&self) -> ConsensusResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> ConsensusResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Generation is gated on the registry; verification is not, so historic
/// blocks stay valid after their proposer is slashed out or unregistered.
impl ProofScheme for ConsensusEngine {
    fn generate(&self, block: &Block, validator: &str) -> Result<ConsensusProof, ProofError> {
        self.check_eligible(validator)?;
        self.proof_scheme().generate(block, validator)
    }

    fn verify(&self, block: &Block, proof: &ConsensusProof, validator: &str) -> bool {
        self.proof_scheme().verify(block, proof, validator)
    }
}
