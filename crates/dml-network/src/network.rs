// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - MULTI-DIMENSIONAL NETWORK
//
// Owns shard membership and the per-shard pending pools.
//
// Routing:     shard = SHA-256(recipient)[0..8] big-endian mod shard_count
// Propagation: targets are collected under the caller's lock, delivered by
//              `propagation::fan_out` with no lock held, then settled here
//              with `finish_propagation`.
// State root:  root' = H(root ‖ block hash), starting from H("")
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::errors::{NetworkError, NetworkResult};
use crate::node::{Position, VirtualNode};
use crate::propagation::{fan_out, DeliveryTarget, PropagationReport};
use dml_core::{now_millis, shard_of, Block, Transaction, MAX_BLOCK_TRANSACTIONS};
use dml_crypto::{sha3_hex, sha3_hex_parts};
use log::{debug, info};
use num_bigint::BigUint;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::time::Duration;

/// Delivery records kept for observed throughput.
const THROUGHPUT_LOG_CAP: usize = 4096;

// ─────────────────────────────────────────────────────────────────────────────
// CONFIG
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub shard_count: u32,
    /// Simulated nodes started per shard.
    pub nodes_per_shard: usize,
    pub cross_shard_enabled: bool,
    /// Per-node delivery deadline.
    pub propagation_timeout_ms: u64,
    pub max_concurrent_deliveries: usize,
    /// How long a 2PC lock phase may wait for contended accounts.
    pub lock_timeout_ms: u64,
    /// Lifetime of an acquired 2PC lock.
    pub lock_lease_ms: u64,
    pub block_time_ms: u64,
    pub max_block_transactions: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            shard_count: 4,
            nodes_per_shard: 3,
            cross_shard_enabled: true,
            propagation_timeout_ms: 500,
            max_concurrent_deliveries: 16,
            lock_timeout_ms: 200,
            lock_lease_ms: 2_000,
            block_time_ms: 5_000,
            max_block_transactions: MAX_BLOCK_TRANSACTIONS,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SHARD
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Shard {
    pub id: u32,
    pub members: BTreeSet<String>,
    pub transaction_count: u64,
    pub block_count: u64,
    pub state_root: String,
    /// Cross-shard transfers debited from this shard (transaction hashes).
    pub outbound_transfers: Vec<String>,
}

impl Shard {
    fn new(id: u32) -> Self {
        Shard {
            id,
            members: BTreeSet::new(),
            transaction_count: 0,
            block_count: 0,
            state_root: sha3_hex(b""),
            outbound_transfers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkStats {
    pub total_nodes: usize,
    pub total_shards: usize,
    pub total_transactions: u64,
    pub total_blocks: u64,
    pub average_nodes_per_shard: f64,
    pub healthy_nodes: usize,
    pub pending_transactions: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// NETWORK
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiDimensionalNetwork {
    config: NetworkConfig,
    nodes: BTreeMap<String, VirtualNode>,
    shards: BTreeMap<u32, Shard>,
    pools: BTreeMap<u32, Vec<Transaction>>,
    /// (unix ms, transactions settled) per propagated block.
    #[serde(default)]
    deliveries: VecDeque<(u64, u64)>,
}

impl MultiDimensionalNetwork {
    pub fn new(config: NetworkConfig) -> Self {
        let shard_count = config.shard_count.max(1);
        let shards = (0..shard_count).map(|id| (id, Shard::new(id))).collect();
        let pools = (0..shard_count).map(|id| (id, Vec::new())).collect();
        MultiDimensionalNetwork {
            config: NetworkConfig {
                shard_count,
                ..config
            },
            nodes: BTreeMap::new(),
            shards,
            pools,
            deliveries: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn shard_count(&self) -> u32 {
        self.config.shard_count
    }

    // ── Membership ───────────────────────────────────────────────────────────

    pub fn add_node(&mut self, node: VirtualNode) -> NetworkResult<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(NetworkError::DuplicateNode(node.id));
        }
        if let Some(&bad) = node.shards.iter().find(|s| !self.shards.contains_key(s)) {
            return Err(NetworkError::UnknownShard(bad));
        }
        for shard_id in &node.shards {
            if let Some(shard) = self.shards.get_mut(shard_id) {
                shard.members.insert(node.id.clone());
            }
        }
        debug!("node {} joined shards {:?}", node.id, node.shards);
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    pub fn remove_node(&mut self, node_id: &str) -> NetworkResult<VirtualNode> {
        let node = self
            .nodes
            .remove(node_id)
            .ok_or_else(|| NetworkError::UnknownNode(node_id.to_string()))?;
        for shard in self.shards.values_mut() {
            shard.members.remove(node_id);
        }
        Ok(node)
    }

    pub fn get_node(&self, node_id: &str) -> Option<&VirtualNode> {
        self.nodes.get(node_id)
    }

    pub fn get_node_mut(&mut self, node_id: &str) -> Option<&mut VirtualNode> {
        self.nodes.get_mut(node_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &VirtualNode> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes_in_shard(&self, shard_id: u32) -> Vec<&VirtualNode> {
        match self.shards.get(&shard_id) {
            Some(shard) => shard.members.iter().filter_map(|id| self.nodes.get(id)).collect(),
            None => Vec::new(),
        }
    }

    pub fn get_shard(&self, shard_id: u32) -> Option<&Shard> {
        self.shards.get(&shard_id)
    }

    pub(crate) fn shard_mut(&mut self, shard_id: u32) -> NetworkResult<&mut Shard> {
        self.shards
            .get_mut(&shard_id)
            .ok_or(NetworkError::UnknownShard(shard_id))
    }

    pub fn shards(&self) -> impl Iterator<Item = &Shard> {
        self.shards.values()
    }

    /// Up to `count` nodes nearest to `node_id`.
    pub fn nearest_neighbors(&self, node_id: &str, count: usize) -> NetworkResult<Vec<&VirtualNode>> {
        let me = self
            .nodes
            .get(node_id)
            .ok_or_else(|| NetworkError::UnknownNode(node_id.to_string()))?;
        Ok(me.find_nearest_neighbors(self.nodes.values(), count))
    }

    // ── Transactions ─────────────────────────────────────────────────────────

    /// Destination shard of `tx`. Pure.
    pub fn route_transaction(&self, tx: &Transaction) -> u32 {
        shard_of(&tx.to, self.config.shard_count)
    }

    pub fn route_address(&self, address: &str) -> u32 {
        shard_of(address, self.config.shard_count)
    }

    /// Route `tx`, stamp its shard and queue it in that shard's pool.
    pub fn add_transaction(&mut self, mut tx: Transaction) -> NetworkResult<u32> {
        let shard_id = self.route_transaction(&tx);
        tx.shard_id = Some(shard_id);
        self.add_transaction_to_shard(shard_id, tx)?;
        Ok(shard_id)
    }

    pub(crate) fn add_transaction_to_shard(&mut self, shard_id: u32, tx: Transaction) -> NetworkResult<()> {
        let pool = self
            .pools
            .get_mut(&shard_id)
            .ok_or(NetworkError::UnknownShard(shard_id))?;
        if pool.iter().any(|t| t.hash == tx.hash) {
            return Err(NetworkError::DuplicateTransaction(tx.hash, shard_id));
        }
        pool.push(tx.clone());
        let accepted = self.process_at_members(shard_id, &tx);
        debug!("tx {} queued in shard {}, {} members processed it", tx.hash, shard_id, accepted);
        Ok(())
    }

    pub fn pending_transactions(&self, shard_id: u32) -> &[Transaction] {
        self.pools.get(&shard_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pending_count(&self) -> usize {
        self.pools.values().map(Vec::len).sum()
    }

    /// Drop the given transactions from every shard pool.
    pub fn remove_transactions(&mut self, hashes: &HashSet<String>) -> usize {
        let mut removed = 0;
        for pool in self.pools.values_mut() {
            let before = pool.len();
            pool.retain(|t| !hashes.contains(&t.hash));
            removed += before - pool.len();
        }
        removed
    }

    /// Let every online member of `shard_id` process `tx`. Returns how many
    /// accepted it.
    fn process_at_members(&mut self, shard_id: u32, tx: &Transaction) -> usize {
        let Some(shard) = self.shards.get(&shard_id) else {
            return 0;
        };
        let mut accepted = 0;
        for id in &shard.members {
            if let Some(node) = self.nodes.get_mut(id) {
                if node.is_online && node.process_transaction(tx) {
                    accepted += 1;
                }
            }
        }
        accepted
    }

    // ── Propagation ──────────────────────────────────────────────────────────

    /// Every member of `shard_id`, with its simulated latency and liveness.
    pub fn propagation_targets(&self, shard_id: u32) -> NetworkResult<Vec<DeliveryTarget>> {
        let shard = self
            .shards
            .get(&shard_id)
            .ok_or(NetworkError::UnknownShard(shard_id))?;
        Ok(shard
            .members
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .map(|n| DeliveryTarget {
                node_id: n.id.clone(),
                latency_ms: n.latency_ms,
                online: n.is_online,
            })
            .collect())
    }

    pub fn propagation_timeout(&self) -> Duration {
        Duration::from_millis(self.config.propagation_timeout_ms)
    }

    /// Settle a finished fan-out: mark deliveries, bump shard counters,
    /// chain the shard root and drop the block's transactions from the pool.
    pub fn finish_propagation(&mut self, block: &Block, report: &PropagationReport) -> NetworkResult<()> {
        let shard_id = block.shard_id;
        for id in &report.delivered {
            if let Some(node) = self.nodes.get_mut(id) {
                node.receive_block(&block.hash);
            }
        }

        let shard = self.shard_mut(shard_id)?;
        shard.block_count += 1;
        shard.transaction_count += block.transactions.len() as u64;
        shard.state_root = sha3_hex_parts(&[shard.state_root.as_bytes(), block.hash.as_bytes()]);

        let included: HashSet<&str> = block.transactions.iter().map(|t| t.hash.as_str()).collect();
        if let Some(pool) = self.pools.get_mut(&shard_id) {
            pool.retain(|t| !included.contains(t.hash.as_str()));
        }

        self.deliveries.push_back((now_millis(), block.transactions.len() as u64));
        if self.deliveries.len() > THROUGHPUT_LOG_CAP {
            self.deliveries.pop_front();
        }

        info!(
            "block #{} propagated in shard {}: {} delivered, {} timed out, {} offline",
            block.number,
            shard_id,
            report.delivered.len(),
            report.timed_out.len(),
            report.failed.len()
        );
        Ok(())
    }

    /// Fan out and settle in one call. Needs exclusive ownership across the
    /// await, so shared handles use the three-step form instead.
    pub async fn propagate(&mut self, block: &Block) -> NetworkResult<PropagationReport> {
        let targets = self.propagation_targets(block.shard_id)?;
        let report = fan_out(
            &block.hash,
            block.shard_id,
            targets,
            self.propagation_timeout(),
            self.config.max_concurrent_deliveries,
        )
        .await;
        self.finish_propagation(block, &report)?;
        Ok(report)
    }

    // ── Global view ──────────────────────────────────────────────────────────

    /// Global root over all shard roots in shard order.
    pub fn synchronize(&self) -> String {
        let joined: String = self.shards.values().map(|s| s.state_root.as_str()).collect();
        sha3_hex(joined.as_bytes())
    }

    /// Upper bound in transactions per second.
    pub fn theoretical_throughput(&self) -> f64 {
        let block_secs = self.config.block_time_ms.max(1) as f64 / 1000.0;
        self.config.max_block_transactions as f64 / block_secs * self.config.shard_count as f64
    }

    /// Settled transactions per second over the trailing window.
    pub fn observed_throughput(&self, window_ms: u64) -> f64 {
        if window_ms == 0 {
            return 0.0;
        }
        let since = now_millis().saturating_sub(window_ms);
        let settled: u64 = self
            .deliveries
            .iter()
            .filter(|(at, _)| *at >= since)
            .map(|(_, n)| n)
            .sum();
        settled as f64 / (window_ms as f64 / 1000.0)
    }

    pub fn stats(&self) -> NetworkStats {
        let now = now_millis();
        let shard_count = self.shards.len();
        NetworkStats {
            total_nodes: self.nodes.len(),
            total_shards: shard_count,
            total_transactions: self.shards.values().map(|s| s.transaction_count).sum(),
            total_blocks: self.shards.values().map(|s| s.block_count).sum(),
            average_nodes_per_shard: if shard_count > 0 {
                self.nodes.len() as f64 / shard_count as f64
            } else {
                0.0
            },
            healthy_nodes: self.nodes.values().filter(|n| n.is_healthy_at(now)).count(),
            pending_transactions: self.pending_count(),
        }
    }

    // ── Simulation ───────────────────────────────────────────────────────────

    /// Add `count` nodes `node-<i>` round-robin over shards. About 30% join
    /// the next shard as well. Same seed, same network.
    pub fn simulate_network(&mut self, count: usize, seed: u64) -> NetworkResult<()> {
        let mut rng = StdRng::seed_from_u64(seed);
        let shard_count = self.config.shard_count;
        let offset = self.nodes.len();
        let unit = BigUint::from(10u32).pow(18);

        for i in 0..count {
            let primary = (i % shard_count as usize) as u32;
            let mut shards = vec![primary];
            if shard_count > 1 && rng.gen_bool(0.3) {
                shards.push((primary + 1) % shard_count);
            }
            let stake = BigUint::from(rng.gen_range(1_000u64..10_000)) * &unit;
            let position = Position::new(
                rng.gen_range(-100.0..100.0),
                rng.gen_range(-100.0..100.0),
                rng.gen_range(-100.0..100.0),
            );
            let node = VirtualNode::new(format!("node-{}", offset + i), shards, stake)
                .with_position(position)
                .with_latency(rng.gen_range(5..50));
            self.add_node(node)?;
        }
        info!("simulated {} nodes across {} shards", count, shard_count);
        Ok(())
    }

    // ── Export ───────────────────────────────────────────────────────────────

    pub fn to_json(&self) -> NetworkResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> NetworkResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
