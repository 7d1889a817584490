// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - BLOCK PROPAGATION
//
// Bounded-parallel fan-out of one block to a shard's members.
// - offline targets fail immediately, no task is spawned
// - at most `concurrency` deliveries in flight (Semaphore)
// - each delivery races its simulated latency against a per-node timeout
// - the join barrier waits for every task; one slow node never stalls others
//
// No lock may be held while this runs. Collect targets, drop the guard,
// await, then lock again and settle.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTarget {
    pub node_id: String,
    pub latency_ms: u64,
    pub online: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PropagationReport {
    pub block_hash: String,
    pub shard_id: u32,
    pub delivered: Vec<String>,
    pub timed_out: Vec<String>,
    /// Offline at send time.
    pub failed: Vec<String>,
}

impl PropagationReport {
    pub fn new(block_hash: &str, shard_id: u32) -> Self {
        PropagationReport {
            block_hash: block_hash.to_string(),
            shard_id,
            ..Default::default()
        }
    }

    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.timed_out.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.timed_out.is_empty() && self.failed.is_empty()
    }
}

pub async fn fan_out(
    block_hash: &str,
    shard_id: u32,
    targets: Vec<DeliveryTarget>,
    timeout: Duration,
    concurrency: usize,
) -> PropagationReport {
    let mut report = PropagationReport::new(block_hash, shard_id);
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut deliveries = JoinSet::new();

    for target in targets {
        if !target.online {
            report.failed.push(target.node_id);
            continue;
        }
        let permits = Arc::clone(&permits);
        deliveries.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return (target.node_id, false);
            };
            let latency = Duration::from_millis(target.latency_ms);
            let arrived = tokio::time::timeout(timeout, tokio::time::sleep(latency))
                .await
                .is_ok();
            (target.node_id, arrived)
        });
    }

    while let Some(joined) = deliveries.join_next().await {
        match joined {
            Ok((node_id, true)) => report.delivered.push(node_id),
            Ok((node_id, false)) => report.timed_out.push(node_id),
            Err(e) => warn!("delivery task for block {} aborted: {}", block_hash, e),
        }
    }

    report.delivered.sort();
    report.timed_out.sort();
    report.failed.sort();
    report
}
