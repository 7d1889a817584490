// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - PARTITION HANDLER
//
// Per-node liveness records. A node silent for longer than the detection
// threshold is isolated; a partition closes only once every isolated node
// reports SYNCED again.
//
// Health score: 100, −20 with fewer than 3 peers, −10 while syncing,
// −100 when offline, floored at 0.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::errors::{HealingError, HealingResult};
use dml_core::now_millis;
use dml_crypto::sha3_hex;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_PARTITION_THRESHOLD_MS: u64 = 30_000;
pub const MIN_HEALTHY_PEERS: u32 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Synced,
    #[default]
    Syncing,
    Offline,
}

pub fn health_score(peer_count: u32, status: SyncStatus) -> u32 {
    let mut score: i32 = 100;
    if peer_count < MIN_HEALTHY_PEERS {
        score -= 20;
    }
    match status {
        SyncStatus::Synced => {}
        SyncStatus::Syncing => score -= 10,
        SyncStatus::Offline => score -= 100,
    }
    score.max(0) as u32
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeHealth {
    pub node_id: String,
    pub uptime_secs: u64,
    /// Unix milliseconds of the last report.
    pub last_seen: u64,
    pub block_height: u64,
    pub peer_count: u32,
    pub sync_status: SyncStatus,
    pub health_score: u32,
}

/// Partial report; absent fields keep their previous value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthUpdate {
    pub uptime_secs: Option<u64>,
    pub block_height: Option<u64>,
    pub peer_count: Option<u32>,
    pub sync_status: Option<SyncStatus>,
    /// Overrides the computed score.
    pub health_score: Option<u32>,
}

impl HealthUpdate {
    pub fn synced(block_height: u64, peer_count: u32) -> Self {
        HealthUpdate {
            block_height: Some(block_height),
            peer_count: Some(peer_count),
            sync_status: Some(SyncStatus::Synced),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkPartition {
    pub id: String,
    pub nodes: Vec<String>,
    pub start_time: u64,
    pub end_time: Option<u64>,
    pub resolved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkHealth {
    pub total_nodes: usize,
    pub online_nodes: usize,
    pub synced_nodes: usize,
    pub active_partitions: usize,
    pub average_health_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PartitionStats {
    pub total: usize,
    pub active: usize,
    pub resolved: usize,
}

#[derive(Debug, Clone)]
pub struct NetworkPartitionHandler {
    threshold_ms: u64,
    health: BTreeMap<String, NodeHealth>,
    partitions: BTreeMap<String, NetworkPartition>,
}

impl Default for NetworkPartitionHandler {
    fn default() -> Self {
        Self::new(DEFAULT_PARTITION_THRESHOLD_MS)
    }
}

impl NetworkPartitionHandler {
    pub fn new(threshold_ms: u64) -> Self {
        NetworkPartitionHandler {
            threshold_ms,
            health: BTreeMap::new(),
            partitions: BTreeMap::new(),
        }
    }

    pub fn threshold_ms(&self) -> u64 {
        self.threshold_ms
    }

    pub fn update_node_health(&mut self, node_id: &str, update: HealthUpdate) -> &NodeHealth {
        self.update_node_health_at(node_id, update, now_millis())
    }

    pub fn update_node_health_at(&mut self, node_id: &str, update: HealthUpdate, now: u64) -> &NodeHealth {
        let previous = self.health.get(node_id);
        let peer_count = update
            .peer_count
            .or(previous.map(|h| h.peer_count))
            .unwrap_or(0);
        let sync_status = update
            .sync_status
            .or(previous.map(|h| h.sync_status))
            .unwrap_or_default();
        let record = NodeHealth {
            node_id: node_id.to_string(),
            uptime_secs: update
                .uptime_secs
                .or(previous.map(|h| h.uptime_secs))
                .unwrap_or(0),
            last_seen: now,
            block_height: update
                .block_height
                .or(previous.map(|h| h.block_height))
                .unwrap_or(0),
            peer_count,
            sync_status,
            health_score: update
                .health_score
                .unwrap_or_else(|| health_score(peer_count, sync_status)),
        };
        self.health.insert(node_id.to_string(), record);
        &self.health[node_id]
    }

    pub fn node_health(&self, node_id: &str) -> Option<&NodeHealth> {
        self.health.get(node_id)
    }

    pub fn detect_partition(&mut self, nodes: &[String]) -> Option<NetworkPartition> {
        self.detect_partition_at(nodes, now_millis())
    }

    /// Isolate every listed node with a record older than the threshold.
    /// Nodes never seen are ignored.
    pub fn detect_partition_at(&mut self, nodes: &[String], now: u64) -> Option<NetworkPartition> {
        let isolated: Vec<String> = nodes
            .iter()
            .filter(|id| {
                self.health
                    .get(id.as_str())
                    .is_some_and(|h| now.saturating_sub(h.last_seen) > self.threshold_ms)
            })
            .cloned()
            .collect();
        if isolated.is_empty() {
            return None;
        }

        let id = partition_id(&isolated);
        if let Some(open) = self.partitions.get(&id).filter(|p| !p.resolved) {
            return Some(open.clone());
        }
        warn!("network partition {}: {} nodes isolated", &id[..16], isolated.len());
        let partition = NetworkPartition {
            id: id.clone(),
            nodes: isolated,
            start_time: now,
            end_time: None,
            resolved: false,
        };
        self.partitions.insert(id, partition.clone());
        Some(partition)
    }

    /// `Ok(true)` once every isolated node is SYNCED; the partition then
    /// stays closed.
    pub fn resolve_partition(&mut self, id: &str) -> HealingResult<bool> {
        let partition = self
            .partitions
            .get_mut(id)
            .ok_or_else(|| HealingError::UnknownPartition(id.to_string()))?;
        if partition.resolved {
            return Ok(true);
        }
        let all_synced = partition.nodes.iter().all(|n| {
            self.health
                .get(n)
                .is_some_and(|h| h.sync_status == SyncStatus::Synced)
        });
        if all_synced {
            partition.resolved = true;
            partition.end_time = Some(now_millis());
            info!("partition {} healed", &id[..id.len().min(16)]);
        }
        Ok(all_synced)
    }

    pub fn get_partition(&self, id: &str) -> Option<&NetworkPartition> {
        self.partitions.get(id)
    }

    pub fn active_partitions(&self) -> Vec<&NetworkPartition> {
        self.partitions.values().filter(|p| !p.resolved).collect()
    }

    pub fn network_health(&self) -> NetworkHealth {
        let total = self.health.len();
        let score_sum: u64 = self.health.values().map(|h| h.health_score as u64).sum();
        NetworkHealth {
            total_nodes: total,
            online_nodes: self
                .health
                .values()
                .filter(|h| h.sync_status != SyncStatus::Offline)
                .count(),
            synced_nodes: self
                .health
                .values()
                .filter(|h| h.sync_status == SyncStatus::Synced)
                .count(),
            active_partitions: self.active_partitions().len(),
            average_health_score: if total > 0 {
                score_sum as f64 / total as f64
            } else {
                0.0
            },
        }
    }

    pub fn stats(&self) -> PartitionStats {
        let resolved = self.partitions.values().filter(|p| p.resolved).count();
        PartitionStats {
            total: self.partitions.len(),
            active: self.partitions.len() - resolved,
            resolved,
        }
    }
}

/// Hash of the length-prefixed member ids.
fn partition_id(nodes: &[String]) -> String {
    let mut buf = Vec::new();
    for id in nodes {
        buf.extend_from_slice(&(id.len() as u64).to_be_bytes());
        buf.extend_from_slice(id.as_bytes());
    }
    sha3_hex(&buf)
}
