// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - VALIDATOR
//
// Staked participant with a reputation score.
// - reputation ∈ [0, 200], starts at 100
// - reward: +1 reputation (capped), counters bumped
// - slash:  stake reduced, −10 reputation, inactive after 3 slashes (permanent)
// - voting power = stake × reputation / 100, zero if inactive or reputation < 50
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::errors::{ConsensusError, ConsensusResult};
use dml_core::codec;
use dml_core::now_millis;
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

pub const DEFAULT_REPUTATION: u32 = 100;
pub const MAX_REPUTATION: u32 = 200;
/// Below this, voting power is zero.
pub const MIN_VOTING_REPUTATION: u32 = 50;
/// Proposing needs strictly more than this.
pub const MIN_PROPOSER_REPUTATION: u32 = 50;
pub const SLASH_REPUTATION_PENALTY: u32 = 10;
/// Slash count at which a validator is deactivated for good.
pub const MAX_SLASHES: u32 = 3;
pub const DEFAULT_COMMISSION_PCT: u8 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Validator {
    pub address: String,
    #[serde(with = "codec::decimal")]
    pub stake: BigUint,
    pub reputation: u32,
    pub is_active: bool,
    pub total_blocks: u64,
    #[serde(with = "codec::decimal")]
    pub total_rewards: BigUint,
    pub slash_count: u32,
    pub commission_pct: u8,
    /// Unix milliseconds of the last rewarded block.
    pub last_block_time: u64,
}

impl Validator {
    pub fn new(address: impl Into<String>, stake: BigUint) -> Self {
        Validator {
            address: address.into(),
            stake,
            reputation: DEFAULT_REPUTATION,
            is_active: true,
            total_blocks: 0,
            total_rewards: BigUint::zero(),
            slash_count: 0,
            commission_pct: DEFAULT_COMMISSION_PCT,
            last_block_time: now_millis(),
        }
    }

    pub fn with_reputation(mut self, reputation: u32) -> Self {
        self.reputation = reputation.min(MAX_REPUTATION);
        self
    }

    /// stake × reputation / 100
    pub fn effective_stake(&self) -> BigUint {
        &self.stake * BigUint::from(self.reputation) / BigUint::from(100u32)
    }

    pub fn voting_power(&self) -> BigUint {
        if !self.is_active || self.reputation < MIN_VOTING_REPUTATION {
            return BigUint::zero();
        }
        self.effective_stake()
    }

    pub fn can_propose(&self) -> bool {
        self.is_active && !self.stake.is_zero() && self.reputation > MIN_PROPOSER_REPUTATION
    }

    pub fn reward(&mut self, amount: &BigUint) {
        self.total_blocks += 1;
        self.total_rewards += amount;
        self.last_block_time = now_millis();
        self.reputation = (self.reputation + 1).min(MAX_REPUTATION);
    }

    /// Remove up to `amount` of stake. Returns what was actually removed.
    pub fn slash(&mut self, amount: &BigUint) -> BigUint {
        self.slash_count += 1;
        let removed = if &self.stake > amount {
            amount.clone()
        } else {
            self.stake.clone()
        };
        self.stake -= &removed;
        self.reputation = self.reputation.saturating_sub(SLASH_REPUTATION_PENALTY);
        if self.slash_count >= MAX_SLASHES {
            self.is_active = false;
        }
        removed
    }

    pub fn add_stake(&mut self, amount: &BigUint) {
        self.stake += amount;
    }

    pub fn withdraw_stake(&mut self, amount: &BigUint) -> ConsensusResult<()> {
        if &self.stake < amount {
            return Err(ConsensusError::InsufficientStake {
                requested: amount.to_string(),
                available: self.stake.to_string(),
            });
        }
        self.stake -= amount;
        Ok(())
    }
}
