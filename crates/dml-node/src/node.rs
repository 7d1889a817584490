// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - LEDGER NODE
//
// Composes chain, consensus, sharded network and self-healing into one
// process-level node.
//
// Lock order: consensus → chain → network → healing → competing blocks.
// A production round holds consensus and chain across select → mine →
// reward, then releases both before the network fan-out is awaited.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::config::LedgerConfig;
use crate::errors::NodeResult;
use dml_consensus::{ConsensusEngine, ConsensusState, ConsensusStats, ModExpProofScheme, Validator};
use dml_core::{Block, Blockchain, ChainError, ChainState, ChainStats, ProcessResult, Transaction};
use dml_healing::{
    Branch, Checkpoint, ForkHandling, HealingStats, HealthUpdate, NetworkPartition, SelfHealingSystem,
    SystemHealth,
};
use dml_network::{
    CrossShardOutcome, MultiDimensionalNetwork, NetworkError, NetworkState, NetworkStats, PropagationReport,
    TransferState, VirtualNode,
};
use log::{debug, info, warn};
use num_bigint::{BigInt, BigUint};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Outcome of one production round.
#[derive(Debug, Clone)]
pub struct BlockProduction {
    pub block: Block,
    pub proposer: String,
    pub reward: BigUint,
    pub propagation: PropagationReport,
}

/// What happened to a block received from elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReceipt {
    Applied(String),
    Duplicate(String),
    /// Valid block at an occupied height; queued for the fork monitor.
    Competing { number: u64, hash: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeStatus {
    pub node_id: String,
    pub height: u64,
    pub head_hash: String,
    pub chain: ChainStats,
    pub consensus: ConsensusStats,
    pub network: NetworkStats,
    pub healing: HealingStats,
    pub health: SystemHealth,
}

/// Persisted layout of a whole node.
#[derive(Serialize, Deserialize)]
struct NodeExport {
    node_id: String,
    /// Chain in its own export format.
    chain: serde_json::Value,
    consensus: ConsensusEngine,
    network: MultiDimensionalNetwork,
    checkpoints: Vec<Checkpoint>,
}

#[derive(Debug, Clone)]
pub struct LedgerNode {
    config: Arc<LedgerConfig>,
    chain: ChainState,
    consensus: ConsensusState,
    network: NetworkState,
    healing: Arc<Mutex<SelfHealingSystem>>,
    /// Foreign blocks clashing with a block already on the chain.
    competing: Arc<Mutex<Vec<Block>>>,
}

fn recover_lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("{} lock was poisoned, recovering", what);
            poisoned.into_inner()
        }
    }
}

/// State root a checkpoint commits to: the block's own, or its hash while
/// state roots are unset.
pub fn checkpoint_root(block: &Block) -> &str {
    if block.state_root.is_empty() {
        &block.hash
    } else {
        &block.state_root
    }
}

/// Shards with pending work, rotating from the current height.
fn shards_with_work(chain: &Blockchain) -> Vec<u32> {
    let count = chain.config().shard_count.max(1);
    let start = (chain.height() % count as u64) as u32;
    (0..count)
        .map(|i| (start + i) % count)
        .filter(|shard| {
            chain
                .pending_transactions()
                .iter()
                .any(|tx| tx.shard_id_for(count) == *shard)
        })
        .collect()
}

fn pending_hashes(chain: &Blockchain) -> HashSet<String> {
    chain.pending_transactions().iter().map(|tx| tx.hash.clone()).collect()
}

fn peer_count(net: &MultiDimensionalNetwork, node: &VirtualNode) -> u32 {
    net.nodes()
        .filter(|other| other.id != node.id && other.is_online && !other.shards.is_disjoint(&node.shards))
        .count() as u32
}

impl LedgerNode {
    pub fn new(config: LedgerConfig) -> NodeResult<Self> {
        config.validate()?;

        let difficulty = config.consensus.proof_difficulty;
        let mut chain =
            Blockchain::with_proof_scheme(config.chain.clone(), Arc::new(ModExpProofScheme::new(difficulty)));
        chain.set_difficulty(difficulty);
        chain.set_block_reward(config.consensus.block_reward.clone());

        let mut engine = ConsensusEngine::new(config.consensus.clone());
        for v in &config.node.validators {
            engine.register_validator(Validator::new(v.address.clone(), v.stake.clone()))?;
        }

        let mut network = MultiDimensionalNetwork::new(config.network.clone());
        let simulated = config.network.nodes_per_shard * network.shard_count() as usize;
        network.simulate_network(simulated, config.node.simulation_seed)?;

        Self::assemble(config, chain, engine, network, Vec::new())
    }

    /// Rebuild a node from [`Self::export_json`] output. The chain is
    /// re-validated; checkpoints verify only if `config` carries the signing
    /// seed they were made with.
    pub fn restore(config: LedgerConfig, json: &str) -> NodeResult<Self> {
        config.validate()?;
        let export: NodeExport = serde_json::from_str(json)?;
        let scheme = Arc::new(ModExpProofScheme::new(export.consensus.config().proof_difficulty));
        let chain = Blockchain::from_json(&export.chain.to_string(), scheme)?;
        let failures = chain.validation_errors();
        if let Some((height, errors)) = failures.into_iter().next() {
            warn!("restored chain is invalid at #{}", height);
            return Err(ChainError::InvalidBlock(errors).into());
        }
        info!(
            "restored node {} at height {} ({} checkpoints)",
            export.node_id,
            chain.height(),
            export.checkpoints.len()
        );
        Self::assemble(config, chain, export.consensus, export.network, export.checkpoints)
    }

    fn assemble(
        config: LedgerConfig,
        chain: Blockchain,
        engine: ConsensusEngine,
        network: MultiDimensionalNetwork,
        checkpoints: Vec<Checkpoint>,
    ) -> NodeResult<Self> {
        let mut healing = match config.node.signing_keypair()? {
            Some(keypair) => SelfHealingSystem::with_keypair(config.healing.clone(), keypair),
            None => SelfHealingSystem::new(config.healing.clone()),
        };
        let registered = engine.validators().count();
        if registered > 0 {
            healing.bft_mut().set_total_nodes(registered);
        }
        for checkpoint in checkpoints {
            healing.state_recovery_mut().import_checkpoint(checkpoint);
        }

        info!(
            "node {} ready: height {}, {} validators, {} simulated nodes",
            config.node.node_id,
            chain.height(),
            registered,
            network.node_count()
        );
        Ok(LedgerNode {
            config: Arc::new(config),
            chain: ChainState::new(chain),
            consensus: ConsensusState::new(engine),
            network: NetworkState::new(network),
            healing: Arc::new(Mutex::new(healing)),
            competing: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn chain(&self) -> &ChainState {
        &self.chain
    }

    pub fn consensus(&self) -> &ConsensusState {
        &self.consensus
    }

    pub fn network(&self) -> &NetworkState {
        &self.network
    }

    pub fn healing(&self) -> MutexGuard<'_, SelfHealingSystem> {
        recover_lock(&self.healing, "self-healing")
    }

    // ─────────────────────────────────────────────────────────────────
    // VALIDATORS
    // ─────────────────────────────────────────────────────────────────

    /// Register a validator and resize BFT accounting to the registry.
    pub fn register_validator(&self, address: &str, stake: BigUint) -> NodeResult<()> {
        let registered = {
            let mut engine = self.consensus.lock();
            engine.register_validator(Validator::new(address, stake))?;
            engine.validators().count()
        };
        self.healing().bft_mut().set_total_nodes(registered);
        Ok(())
    }

    /// Slash a misbehaving validator and report it as Byzantine.
    pub fn slash_validator(&self, address: &str, reason: &str) -> NodeResult<BigUint> {
        let removed = self.consensus.lock().slash_validator(address, reason)?;
        self.healing().report_byzantine_node(address, reason);
        Ok(removed)
    }

    pub fn active_validators(&self) -> Vec<Validator> {
        self.consensus
            .lock()
            .active_validators()
            .into_iter()
            .cloned()
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────
    // TRANSACTIONS
    // ─────────────────────────────────────────────────────────────────

    /// Queue `tx` in the chain pool and its shard's pool. Returns the shard.
    pub fn submit_transaction(&self, tx: Transaction) -> NodeResult<u32> {
        let hash = tx.hash.clone();
        self.chain.write().add_transaction(tx.clone())?;
        let routed = self.network.lock().add_transaction(tx);
        match routed {
            Ok(shard) => Ok(shard),
            Err(e) => {
                self.chain.write().remove_pending(&HashSet::from([hash]));
                Err(e.into())
            }
        }
    }

    /// Queue `tx`, settling it through two-phase commit when sender and
    /// recipient live on different shards. A failed commit leaves no trace
    /// in either pool.
    pub async fn submit_cross_shard_transaction(&self, tx: Transaction) -> NodeResult<CrossShardOutcome> {
        let hash = tx.hash.clone();
        self.chain.write().add_transaction(tx.clone())?;
        let outcome = self.network.process_cross_shard_transaction(tx).await;
        match outcome {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.chain.write().remove_pending(&HashSet::from([hash]));
                Err(e.into())
            }
        }
    }

    pub fn transfer_state(&self, transfer_id: &str) -> Option<TransferState> {
        self.network.transfer_state(transfer_id)
    }

    // ─────────────────────────────────────────────────────────────────
    // BLOCK PRODUCTION
    // ─────────────────────────────────────────────────────────────────

    /// One round: select a proposer from the head, mine the first shard
    /// with pending work that yields a block, reward the proposer and
    /// propagate. Transactions the chain evicts as unminable leave the
    /// network pool too. `Ok(None)` when no shard yields a block.
    pub async fn produce_block(&self) -> NodeResult<Option<BlockProduction>> {
        let (block, proposer, reward) = {
            let mut engine = self.consensus.lock();
            let mut chain = self.chain.write();
            let shards = shards_with_work(&chain);
            if shards.is_empty() {
                return Ok(None);
            }
            let head = chain.head();
            let proposer = engine.select_validator(&head.hash, head.number + 1)?.address.clone();

            let before = pending_hashes(&chain);
            let mut mined = None;
            for shard in shards {
                if let Some(block) = chain.mine_next_with(&proposer, shard, &*engine)? {
                    mined = Some(block);
                    break;
                }
            }

            let remaining = pending_hashes(&chain);
            let evicted: HashSet<String> = before
                .into_iter()
                .filter(|h| !remaining.contains(h))
                .filter(|h| !mined.as_ref().is_some_and(|b: &Block| b.transaction_index(h).is_some()))
                .collect();
            if !evicted.is_empty() {
                let dropped = self.network.lock().remove_transactions(&evicted);
                warn!("evicted {} unminable txs ({} from network pools)", evicted.len(), dropped);
            }

            let Some(block) = mined else {
                return Ok(None);
            };
            let reward = engine.reward_validator(&proposer)?;
            (block, proposer, reward)
        };

        let propagation = self.network.propagate(&block).await?;
        debug!(
            "round #{} done: proposer {}, {}/{} nodes reached",
            block.number,
            proposer,
            propagation.delivered.len(),
            propagation.attempted()
        );
        Ok(Some(BlockProduction {
            block,
            proposer,
            reward,
            propagation,
        }))
    }

    /// Produce until the pools are empty or `max_blocks` is reached.
    pub async fn produce_pending(&self, max_blocks: usize) -> NodeResult<Vec<BlockProduction>> {
        let mut produced = Vec::new();
        while produced.len() < max_blocks {
            match self.produce_block().await? {
                Some(p) => produced.push(p),
                None => break,
            }
        }
        Ok(produced)
    }

    /// Accept a block produced elsewhere. A block for an occupied height is
    /// checked against its parent and, if sound, queued as a fork candidate.
    pub fn receive_block(&self, block: Block) -> NodeResult<BlockReceipt> {
        let engine = self.consensus.lock();
        let mut chain = self.chain.write();

        if let Some(local) = chain.get_block(block.number) {
            if local.hash == block.hash {
                return Ok(BlockReceipt::Duplicate(block.hash));
            }
            let Some(parent) = block.number.checked_sub(1).and_then(|n| chain.get_block(n)) else {
                return Err(ChainError::InvalidBlock(vec!["Competing genesis block".to_string()]).into());
            };
            let mut errors = engine.validate_block(&block, parent);
            errors.extend(block.validate(parent));
            if !errors.is_empty() {
                return Err(ChainError::InvalidBlock(errors).into());
            }

            warn!(
                "competing block #{} {} from {} (local {})",
                block.number,
                &block.hash[..16],
                block.validator,
                &local.hash[..16]
            );
            let receipt = BlockReceipt::Competing {
                number: block.number,
                hash: block.hash.clone(),
            };
            recover_lock(&self.competing, "competing blocks").push(block);
            return Ok(receipt);
        }

        let errors = engine.validate_block(&block, chain.head());
        if !errors.is_empty() {
            warn!("rejecting block #{} from {}: {:?}", block.number, block.validator, errors);
            return Err(ChainError::InvalidBlock(errors).into());
        }
        let applied = block.clone();
        match chain.add_block_with(block, &*engine)? {
            ProcessResult::Duplicate(hash) => Ok(BlockReceipt::Duplicate(hash)),
            ProcessResult::Applied(hash) => {
                let settled = PropagationReport::new(&hash, applied.shard_id);
                self.network.lock().finish_propagation(&applied, &settled)?;
                Ok(BlockReceipt::Applied(hash))
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────
    // SELF-HEALING
    // ─────────────────────────────────────────────────────────────────

    /// Checkpoint the highest interval boundary reached so far, unless it
    /// is already covered.
    pub fn checkpoint_tick(&self) -> NodeResult<Option<Checkpoint>> {
        let validators: Vec<String> = self
            .consensus
            .lock()
            .active_validators()
            .iter()
            .map(|v| v.address.clone())
            .collect();
        let chain = self.chain.snapshot();

        let mut healing = self.healing();
        let interval = healing.state_recovery().interval();
        if interval == 0 {
            return Ok(None);
        }
        let target = chain.height() / interval * interval;
        if !healing.should_checkpoint(target) {
            return Ok(None);
        }
        if healing
            .state_recovery()
            .stats()
            .latest_block
            .is_some_and(|latest| latest >= target)
        {
            return Ok(None);
        }
        let Some(block) = chain.get_block(target) else {
            return Ok(None);
        };
        let checkpoint = healing.create_auto_checkpoint(target, checkpoint_root(block), validators)?;
        Ok(Some(checkpoint))
    }

    /// Resolve queued competing blocks against the local chain, then refresh
    /// node health and partition state.
    pub fn fork_monitor_tick(&self) -> Vec<ForkHandling> {
        let competing = std::mem::take(&mut *recover_lock(&self.competing, "competing blocks"));
        let mut handled = Vec::with_capacity(competing.len());
        if !competing.is_empty() {
            let chain = self.chain.snapshot();
            let mut healing = self.healing();
            for foreign in &competing {
                let Some(local) = chain.get_block(foreign.number) else {
                    continue;
                };
                let outcome = healing.handle_fork(local, foreign);
                if outcome.winner == Some(Branch::Second) {
                    warn!(
                        "fork at #{} favours foreign block {}; local chain kept",
                        foreign.number,
                        &foreign.hash[..16]
                    );
                }
                handled.push(outcome);
            }
        }
        self.refresh_node_health();
        handled
    }

    /// Report every online simulated node as synced at the current height,
    /// close partitions whose nodes are back, and flag silent nodes.
    pub fn refresh_node_health(&self) -> Option<NetworkPartition> {
        let height = self.chain.height();
        let (online, all) = {
            let net = self.network.lock();
            let online: Vec<(String, u32)> = net
                .nodes()
                .filter(|n| n.is_online)
                .map(|n| (n.id.clone(), peer_count(&net, n)))
                .collect();
            let all: Vec<String> = net.nodes().map(|n| n.id.clone()).collect();
            (online, all)
        };

        let mut healing = self.healing();
        for (id, peers) in online {
            healing.update_node_health(&id, HealthUpdate::synced(height, peers));
        }
        let open: Vec<String> = healing
            .partition_handler()
            .active_partitions()
            .iter()
            .map(|p| p.id.clone())
            .collect();
        for id in open {
            if let Err(e) = healing.partition_handler_mut().resolve_partition(&id) {
                warn!("partition {}: {}", id, e);
            }
        }
        healing.handle_network_partition(&all)
    }

    /// Take a simulated node on or offline.
    pub fn set_node_online(&self, node_id: &str, online: bool) -> NodeResult<()> {
        let mut net = self.network.lock();
        let node = net
            .get_node_mut(node_id)
            .ok_or_else(|| NetworkError::UnknownNode(node_id.to_string()))?;
        node.is_online = online;
        if online {
            node.touch();
        }
        Ok(())
    }

    /// Nearest verified checkpoint at or below `height` (latest when `None`).
    pub fn recover(&self, height: Option<u64>) -> NodeResult<Checkpoint> {
        let checkpoint = self.healing().recover_from_failure(height)?;
        let agrees = self
            .chain
            .read()
            .get_block(checkpoint.block_number)
            .is_some_and(|b| checkpoint_root(b) == checkpoint.state_root);
        if agrees {
            info!("recovery point #{} matches the local chain", checkpoint.block_number);
        } else {
            warn!("local chain diverges from checkpoint #{}", checkpoint.block_number);
        }
        Ok(checkpoint)
    }

    pub fn system_health(&self) -> SystemHealth {
        self.healing().check_system_health()
    }

    // ─────────────────────────────────────────────────────────────────
    // QUERIES & EXPORT
    // ─────────────────────────────────────────────────────────────────

    pub fn height(&self) -> u64 {
        self.chain.height()
    }

    pub fn head(&self) -> Block {
        self.chain.head()
    }

    pub fn balance(&self, address: &str) -> BigInt {
        self.chain.read().balance(address)
    }

    pub fn nonce(&self, address: &str) -> u64 {
        self.chain.read().nonce(address)
    }

    pub fn status(&self) -> NodeStatus {
        let consensus = self.consensus.lock().stats();
        let (height, head_hash, chain) = {
            let chain = self.chain.read();
            (chain.height(), chain.head().hash.clone(), chain.stats())
        };
        let network = self.network.lock().stats();
        let healing = self.healing();
        NodeStatus {
            node_id: self.config.node.node_id.clone(),
            height,
            head_hash,
            chain,
            consensus,
            network,
            healing: healing.stats(),
            health: healing.check_system_health(),
        }
    }

    pub fn export_json(&self) -> NodeResult<String> {
        let consensus = self.consensus.snapshot();
        let chain: serde_json::Value = serde_json::from_str(&self.chain.read().to_json()?)?;
        let network = self.network.snapshot();
        let checkpoints = self.healing().state_recovery().checkpoints().cloned().collect();
        let export = NodeExport {
            node_id: self.config.node.node_id.clone(),
            chain,
            consensus,
            network,
            checkpoints,
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }
}
