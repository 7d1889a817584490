// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - CHAIN STATE MACHINE
//
// Append-only block sequence plus the global pending pool.
//
// How appends work:
// 1. stage()  → every fallible check (structure, linkage, proof)
// 2. commit() → infallible: confirm txs, drain pool, update account index
//
// Balances and nonces are served from an account index maintained on commit.
// The replay functions over the full chain stay available as the reference.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::block::Block;
use crate::codec;
use crate::errors::{ChainError, ChainResult};
use crate::proof::{ConsensusProof, DigestProofScheme, ProofScheme};
use crate::transaction::Transaction;
use crate::{now_millis, ProcessResult, DEFAULT_BLOCK_GAS_LIMIT, GENESIS_PREVIOUS_HASH, MAX_BLOCK_TRANSACTIONS};
use log::{debug, info, warn};
use num_bigint::{BigInt, BigUint};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// 10 coins at 18 decimals.
pub fn default_block_reward() -> BigUint {
    BigUint::from(10u32) * BigUint::from(10u32).pow(18)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ChainConfig {
    /// Target spacing between blocks.
    pub block_time_ms: u64,
    pub block_size_limit: usize,
    pub gas_limit: u64,
    /// Number of shards transactions are routed across.
    pub shard_count: u32,
    pub max_block_transactions: usize,
    pub genesis_validator: String,
    /// Pinned genesis time; `None` uses the wall clock.
    pub genesis_timestamp: Option<u64>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            block_time_ms: 5_000,
            block_size_limit: 1_048_576,
            gas_limit: DEFAULT_BLOCK_GAS_LIMIT,
            shard_count: 4,
            max_block_transactions: MAX_BLOCK_TRANSACTIONS,
            genesis_validator: "genesis".to_string(),
            genesis_timestamp: None,
        }
    }
}

/// Per-address totals derived from committed blocks.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountState {
    #[serde(with = "codec::signed_decimal")]
    pub balance: BigInt,
    pub nonce: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChainStats {
    pub total_blocks: usize,
    pub total_transactions: usize,
    pub pending_transactions: usize,
    /// Mean spacing between consecutive blocks, in seconds.
    pub average_block_time_secs: f64,
    pub chain_length: u64,
}

/// Persisted layout of a [`Blockchain`].
#[derive(Serialize, Deserialize, Debug, Clone)]
struct ChainSnapshot {
    config: ChainConfig,
    difficulty: u32,
    #[serde(with = "codec::decimal")]
    block_reward: BigUint,
    chain: Vec<Block>,
    pending_transactions: Vec<Transaction>,
}

#[derive(Debug, Clone)]
pub struct Blockchain {
    config: ChainConfig,
    difficulty: u32,
    block_reward: BigUint,
    chain: Vec<Block>,
    pending: Vec<Transaction>,
    accounts: BTreeMap<String, AccountState>,
    /// block hash → height
    block_index: HashMap<String, u64>,
    /// confirmed tx hash → height
    tx_index: HashMap<String, u64>,
    proof_scheme: Arc<dyn ProofScheme>,
}

impl Blockchain {
    /// New chain with the default digest proof scheme.
    pub fn new(config: ChainConfig) -> Self {
        Self::with_proof_scheme(config, Arc::new(DigestProofScheme::default()))
    }

    pub fn with_proof_scheme(config: ChainConfig, proof_scheme: Arc<dyn ProofScheme>) -> Self {
        let mut genesis = Block::new(
            0,
            GENESIS_PREVIOUS_HASH,
            config.genesis_validator.clone(),
            0,
            config.gas_limit,
            config.genesis_timestamp.unwrap_or_else(now_millis),
        );
        genesis.attach_proof(ConsensusProof::genesis());

        let mut chain = Blockchain {
            config,
            difficulty: 1,
            block_reward: default_block_reward(),
            chain: Vec::new(),
            pending: Vec::new(),
            accounts: BTreeMap::new(),
            block_index: HashMap::new(),
            tx_index: HashMap::new(),
            proof_scheme,
        };
        chain.commit(genesis);
        chain
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Minimum proof difficulty accepted for appended blocks.
    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn set_difficulty(&mut self, difficulty: u32) {
        self.difficulty = difficulty;
    }

    pub fn block_reward(&self) -> &BigUint {
        &self.block_reward
    }

    pub fn set_block_reward(&mut self, reward: BigUint) {
        self.block_reward = reward;
        self.rebuild_indices();
    }

    pub fn proof_scheme(&self) -> Arc<dyn ProofScheme> {
        Arc::clone(&self.proof_scheme)
    }

    // ─────────────────────────────────────────────────────────────────
    // READS
    // ─────────────────────────────────────────────────────────────────

    pub fn head(&self) -> &Block {
        // Genesis is committed in every constructor and never removed.
        &self.chain[self.chain.len() - 1]
    }

    pub fn height(&self) -> u64 {
        self.head().number
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    pub fn get_block(&self, number: u64) -> Option<&Block> {
        usize::try_from(number).ok().and_then(|i| self.chain.get(i))
    }

    pub fn get_block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.block_index.get(hash).and_then(|n| self.get_block(*n))
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending
    }

    /// Confirmed first, then pending.
    pub fn get_transaction(&self, hash: &str) -> Option<&Transaction> {
        if let Some(block) = self.tx_index.get(hash).and_then(|n| self.get_block(*n)) {
            return block.transactions.iter().find(|tx| tx.hash == hash);
        }
        self.pending.iter().find(|tx| tx.hash == hash)
    }

    /// Confirmed transactions touching `address`, oldest first.
    pub fn get_transactions_by_address(&self, address: &str) -> Vec<&Transaction> {
        self.chain
            .iter()
            .flat_map(|b| b.transactions.iter())
            .filter(|tx| tx.from == address || tx.to == address)
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────
    // PENDING POOL
    // ─────────────────────────────────────────────────────────────────

    pub fn add_transaction(&mut self, tx: Transaction) -> ChainResult<()> {
        let errors = tx.validate();
        if !errors.is_empty() {
            return Err(ChainError::InvalidTransaction(errors));
        }
        if self.tx_index.contains_key(&tx.hash) || self.pending.iter().any(|p| p.hash == tx.hash) {
            return Err(ChainError::DuplicateTransaction(tx.hash));
        }
        debug!("pending += {}", tx.hash);
        self.pending.push(tx);
        Ok(())
    }

    /// Drop pending entries by hash (already included elsewhere, expired).
    pub fn remove_pending(&mut self, hashes: &HashSet<String>) -> usize {
        let before = self.pending.len();
        self.pending.retain(|tx| !hashes.contains(&tx.hash));
        before - self.pending.len()
    }

    // ─────────────────────────────────────────────────────────────────
    // BLOCK PRODUCTION
    // ─────────────────────────────────────────────────────────────────

    /// Assemble, prove and append the next block for `shard_id` using the
    /// chain's own proof scheme.
    pub fn mine_next(&mut self, validator: &str, shard_id: u32) -> ChainResult<Option<Block>> {
        let scheme = self.proof_scheme();
        self.mine_next_with(validator, shard_id, scheme.as_ref())
    }

    /// Same as [`Self::mine_next`] with an explicit proof scheme.
    ///
    /// Returns `Ok(None)` when no pending transaction of the shard fits.
    /// Candidates that can never enter a block are evicted from the pool once
    /// the block is appended, or right away when nothing was assembled. If
    /// proof generation fails the pending pool is left untouched.
    pub fn mine_next_with(
        &mut self,
        validator: &str,
        shard_id: u32,
        scheme: &dyn ProofScheme,
    ) -> ChainResult<Option<Block>> {
        let head = self.head();
        let timestamp = now_millis().max(head.timestamp + 1);
        let mut block = Block::new(
            head.number + 1,
            head.hash.clone(),
            validator,
            shard_id,
            self.config.gas_limit,
            timestamp,
        );

        let shard_count = self.config.shard_count;
        let candidates = self
            .pending
            .iter()
            .filter(|tx| tx.shard_id_for(shard_count) == shard_id)
            .take(self.config.max_block_transactions);
        let mut unminable = HashSet::new();
        for tx in candidates {
            match block.add_transaction(tx.clone()) {
                Ok(()) => {}
                // Over the block limit on its own: it will never fit.
                Err(ChainError::BlockGasExceeded { used: 0, .. }) => {
                    warn!("evicting pending tx {}: exceeds block gas limit", tx.hash);
                    unminable.insert(tx.hash.clone());
                }
                Err(ChainError::BlockGasExceeded { .. }) => break,
                Err(e) => {
                    warn!("evicting pending tx {}: {}", tx.hash, e);
                    unminable.insert(tx.hash.clone());
                }
            }
        }

        if block.transactions.is_empty() {
            self.remove_pending(&unminable);
            return Ok(None);
        }

        let proof = scheme.generate(&block, validator)?;
        block.attach_proof(proof);

        self.add_block_with(block, scheme)?;
        self.remove_pending(&unminable);
        Ok(Some(self.head().clone()))
    }

    /// Validate and append an externally produced block.
    pub fn add_block(&mut self, block: Block) -> ChainResult<ProcessResult> {
        let scheme = self.proof_scheme();
        self.add_block_with(block, scheme.as_ref())
    }

    pub fn add_block_with(
        &mut self,
        block: Block,
        scheme: &dyn ProofScheme,
    ) -> ChainResult<ProcessResult> {
        if self.block_index.contains_key(&block.hash) {
            return Ok(ProcessResult::Duplicate(block.hash));
        }
        self.stage(&block, scheme)?;
        let hash = block.hash.clone();
        self.commit(block);
        Ok(ProcessResult::Applied(hash))
    }

    fn stage(&self, block: &Block, scheme: &dyn ProofScheme) -> ChainResult<()> {
        let errors = block.validate(self.head());
        if !errors.is_empty() {
            warn!("rejecting block {}: {:?}", block.number, errors);
            return Err(ChainError::InvalidBlock(errors));
        }
        if self.proof_accepted(block, scheme) {
            Ok(())
        } else {
            Err(ChainError::InvalidProof(block.number))
        }
    }

    fn proof_accepted(&self, block: &Block, scheme: &dyn ProofScheme) -> bool {
        block
            .proof
            .as_ref()
            .is_some_and(|p| p.difficulty >= self.difficulty && scheme.verify(block, p, &block.validator))
    }

    /// Infallible once `stage` has passed.
    fn commit(&mut self, mut block: Block) {
        let hash = block.hash.clone();
        for tx in block.transactions.iter_mut() {
            tx.confirm(block.number, &hash);
        }

        let included: HashSet<&str> = block.transactions.iter().map(|tx| tx.hash.as_str()).collect();
        self.pending.retain(|tx| !included.contains(tx.hash.as_str()));

        self.apply_to_accounts(&block);
        for tx in &block.transactions {
            self.tx_index.insert(tx.hash.clone(), block.number);
        }
        self.block_index.insert(hash, block.number);

        info!(
            "block #{} appended: {} txs, shard {}, validator {}",
            block.number,
            block.transactions.len(),
            block.shard_id,
            block.validator
        );
        self.chain.push(block);
    }

    fn apply_to_accounts(&mut self, block: &Block) {
        for tx in &block.transactions {
            let sender = self.accounts.entry(tx.from.clone()).or_default();
            sender.balance -= BigInt::from(tx.value.clone() + tx.fee());
            sender.nonce += 1;
            let recipient = self.accounts.entry(tx.to.clone()).or_default();
            recipient.balance += BigInt::from(tx.value.clone());
        }
        if block.number > 0 {
            let v = self.accounts.entry(block.validator.clone()).or_default();
            v.balance += BigInt::from(self.block_reward.clone());
        }
    }

    fn rebuild_indices(&mut self) {
        self.accounts.clear();
        self.block_index.clear();
        self.tx_index.clear();
        let blocks = std::mem::take(&mut self.chain);
        for block in &blocks {
            self.apply_to_accounts(block);
            for tx in &block.transactions {
                self.tx_index.insert(tx.hash.clone(), block.number);
            }
            self.block_index.insert(block.hash.clone(), block.number);
        }
        self.chain = blocks;
    }

    // ─────────────────────────────────────────────────────────────────
    // ACCOUNTS
    // ─────────────────────────────────────────────────────────────────

    /// received − (sent + fees) + block rewards. May be negative: the
    /// ledger does not enforce funding.
    pub fn balance(&self, address: &str) -> BigInt {
        self.accounts
            .get(address)
            .map(|a| a.balance.clone())
            .unwrap_or_default()
    }

    /// Count of confirmed transactions sent by `address`.
    pub fn nonce(&self, address: &str) -> u64 {
        self.accounts.get(address).map_or(0, |a| a.nonce)
    }

    pub fn accounts(&self) -> &BTreeMap<String, AccountState> {
        &self.accounts
    }

    /// Full-chain replay of [`Self::balance`].
    pub fn balance_by_replay(&self, address: &str) -> BigInt {
        let mut balance = BigInt::default();
        for block in &self.chain {
            for tx in &block.transactions {
                if tx.from == address {
                    balance -= BigInt::from(tx.value.clone() + tx.fee());
                }
                if tx.to == address {
                    balance += BigInt::from(tx.value.clone());
                }
            }
            if block.validator == address && block.number > 0 {
                balance += BigInt::from(self.block_reward.clone());
            }
        }
        balance
    }

    /// Full-chain replay of [`Self::nonce`].
    pub fn nonce_by_replay(&self, address: &str) -> u64 {
        self.chain
            .iter()
            .flat_map(|b| b.transactions.iter())
            .filter(|tx| tx.from == address)
            .count() as u64
    }

    // ─────────────────────────────────────────────────────────────────
    // INTEGRITY & STATS
    // ─────────────────────────────────────────────────────────────────

    /// Every adjacent pair re-validated, every non-genesis proof re-verified.
    pub fn is_valid(&self) -> bool {
        self.validation_errors().is_empty()
    }

    /// `(height, violations)` for each block that fails.
    pub fn validation_errors(&self) -> Vec<(u64, Vec<String>)> {
        let mut failures = Vec::new();
        match self.chain.first() {
            Some(genesis) if genesis.number == 0 && genesis.previous_hash == GENESIS_PREVIOUS_HASH => {}
            Some(genesis) => failures.push((genesis.number, vec!["Invalid genesis block".to_string()])),
            None => failures.push((0, vec!["Chain is empty".to_string()])),
        }

        for pair in self.chain.windows(2) {
            let (prev, block) = (&pair[0], &pair[1]);
            let mut errors = block.validate(prev);
            if !self.proof_accepted(block, self.proof_scheme.as_ref()) {
                errors.push("Invalid consensus proof".to_string());
            }
            if !errors.is_empty() {
                failures.push((block.number, errors));
            }
        }
        failures
    }

    pub fn stats(&self) -> ChainStats {
        let total_transactions = self.chain.iter().map(|b| b.transactions.len()).sum();
        let spacing: u64 = self
            .chain
            .windows(2)
            .map(|w| w[1].timestamp.saturating_sub(w[0].timestamp))
            .sum();
        let average_block_time_secs = if self.chain.len() > 1 {
            spacing as f64 / (self.chain.len() - 1) as f64 / 1000.0
        } else {
            0.0
        };

        ChainStats {
            total_blocks: self.chain.len(),
            total_transactions,
            pending_transactions: self.pending.len(),
            average_block_time_secs,
            chain_length: self.height(),
        }
    }

    // ─────────────────────────────────────────────────────────────────
    // JSON
    // ─────────────────────────────────────────────────────────────────

    pub fn to_json(&self) -> ChainResult<String> {
        let snapshot = ChainSnapshot {
            config: self.config.clone(),
            difficulty: self.difficulty,
            block_reward: self.block_reward.clone(),
            chain: self.chain.clone(),
            pending_transactions: self.pending.clone(),
        };
        Ok(serde_json::to_string(&snapshot)?)
    }

    /// Import an exported chain. Indices are rebuilt from the blocks; the
    /// blocks themselves are not re-validated (call [`Self::is_valid`]).
    pub fn from_json(json: &str, proof_scheme: Arc<dyn ProofScheme>) -> ChainResult<Self> {
        let snapshot: ChainSnapshot = serde_json::from_str(json)?;
        if snapshot.chain.is_empty() {
            return Err(ChainError::InvalidBlock(vec!["Chain is empty".to_string()]));
        }
        let mut chain = Blockchain {
            config: snapshot.config,
            difficulty: snapshot.difficulty,
            block_reward: snapshot.block_reward,
            chain: snapshot.chain,
            pending: snapshot.pending_transactions,
            accounts: BTreeMap::new(),
            block_index: HashMap::new(),
            tx_index: HashMap::new(),
            proof_scheme,
        };
        chain.rebuild_indices();
        Ok(chain)
    }
}
