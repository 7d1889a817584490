// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - VIRTUAL NODE
//
// Simulated network participant. Owns shard memberships, a synthetic 3-D
// position (nearest-neighbour queries only), a reputation that creeps up with
// processed work, and a delivery latency used by propagation.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use dml_core::{codec, now_millis, Transaction};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

pub const NODE_DEFAULT_REPUTATION: f64 = 100.0;
pub const NODE_MAX_REPUTATION: f64 = 200.0;
/// Reputation gained per processed transaction.
pub const NODE_REPUTATION_STEP: f64 = 0.1;
/// Health requires strictly more than this.
pub const NODE_HEALTHY_REPUTATION: f64 = 50.0;
/// Silence longer than this marks a node unhealthy (1 minute).
pub const NODE_MAX_INACTIVITY_MS: u64 = 60_000;
/// Received block hashes remembered per node.
pub const NODE_RECENT_BLOCKS: usize = 256;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Position { x, y, z }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VirtualNode {
    pub id: String,
    pub shards: BTreeSet<u32>,
    pub position: Position,
    pub reputation: f64,
    #[serde(with = "codec::decimal")]
    pub stake: BigUint,
    pub processed_transactions: u64,
    pub is_online: bool,
    /// Unix milliseconds.
    pub last_activity: u64,
    /// Simulated one-way delivery time.
    pub latency_ms: u64,
    #[serde(default)]
    pub received_blocks: VecDeque<String>,
}

impl VirtualNode {
    pub fn new(id: impl Into<String>, shards: impl IntoIterator<Item = u32>, stake: BigUint) -> Self {
        VirtualNode {
            id: id.into(),
            shards: shards.into_iter().collect(),
            position: Position::default(),
            reputation: NODE_DEFAULT_REPUTATION,
            stake,
            processed_transactions: 0,
            is_online: true,
            last_activity: now_millis(),
            latency_ms: 0,
            received_blocks: VecDeque::new(),
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn participates_in(&self, shard: u32) -> bool {
        self.shards.contains(&shard)
    }

    /// Accept `tx` if it belongs to one of our shards and validates.
    pub fn process_transaction(&mut self, tx: &Transaction) -> bool {
        let Some(shard) = tx.shard_id else {
            return false;
        };
        if !self.participates_in(shard) || !tx.is_valid() {
            return false;
        }
        self.processed_transactions += 1;
        self.last_activity = now_millis();
        self.reputation = (self.reputation + NODE_REPUTATION_STEP).min(NODE_MAX_REPUTATION);
        true
    }

    pub fn receive_block(&mut self, block_hash: &str) {
        self.last_activity = now_millis();
        if self.received_blocks.iter().any(|h| h == block_hash) {
            return;
        }
        self.received_blocks.push_back(block_hash.to_string());
        if self.received_blocks.len() > NODE_RECENT_BLOCKS {
            self.received_blocks.pop_front();
        }
    }

    pub fn has_block(&self, block_hash: &str) -> bool {
        self.received_blocks.iter().any(|h| h == block_hash)
    }

    /// Record liveness without doing work (heartbeat).
    pub fn touch(&mut self) {
        self.last_activity = now_millis();
    }

    pub fn distance_to(&self, other: &VirtualNode) -> f64 {
        self.position.distance_to(&other.position)
    }

    /// Up to `count` other nodes, closest first.
    pub fn find_nearest_neighbors<'a, I>(&self, nodes: I, count: usize) -> Vec<&'a VirtualNode>
    where
        I: IntoIterator<Item = &'a VirtualNode>,
    {
        let mut by_distance: Vec<(f64, &VirtualNode)> = nodes
            .into_iter()
            .filter(|n| n.id != self.id)
            .map(|n| (self.distance_to(n), n))
            .collect();
        by_distance.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        by_distance.into_iter().take(count).map(|(_, n)| n).collect()
    }

    /// Online, reputable, and active within the last minute of `now`.
    pub fn is_healthy_at(&self, now: u64) -> bool {
        self.is_online
            && self.reputation > NODE_HEALTHY_REPUTATION
            && now.saturating_sub(self.last_activity) < NODE_MAX_INACTIVITY_MS
    }

    pub fn is_healthy(&self) -> bool {
        self.is_healthy_at(now_millis())
    }
}
