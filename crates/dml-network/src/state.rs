// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - SHARED NETWORK HANDLE
//
// The network sits behind a std mutex that is never held across an await.
// Async operations here split into lock → collect, unlocked await, lock →
// settle.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::cross_shard::{CrossShardCoordinator, TransferState};
use crate::errors::{NetworkError, NetworkResult};
use crate::network::MultiDimensionalNetwork;
use crate::propagation::{fan_out, PropagationReport};
use dml_core::{Block, Transaction};
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CrossShardOutcome {
    /// Sender and recipient share a shard; queued directly.
    SameShard(u32),
    Committed { source: u32, destination: u32 },
}

#[derive(Debug, Clone)]
pub struct NetworkState {
    network: Arc<Mutex<MultiDimensionalNetwork>>,
    coordinator: Arc<CrossShardCoordinator>,
}

impl NetworkState {
    pub fn new(network: MultiDimensionalNetwork) -> Self {
        let config = network.config();
        let coordinator = CrossShardCoordinator::new(
            Duration::from_millis(config.lock_timeout_ms),
            Duration::from_millis(config.lock_lease_ms),
        );
        NetworkState {
            network: Arc::new(Mutex::new(network)),
            coordinator: Arc::new(coordinator),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, MultiDimensionalNetwork> {
        match self.network.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("network lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn snapshot(&self) -> MultiDimensionalNetwork {
        self.lock().clone()
    }

    pub fn coordinator(&self) -> &CrossShardCoordinator {
        &self.coordinator
    }

    pub async fn propagate(&self, block: &Block) -> NetworkResult<PropagationReport> {
        let (targets, timeout, concurrency) = {
            let net = self.lock();
            (
                net.propagation_targets(block.shard_id)?,
                net.propagation_timeout(),
                net.config().max_concurrent_deliveries,
            )
        };
        let report = fan_out(&block.hash, block.shard_id, targets, timeout, concurrency).await;
        self.lock().finish_propagation(block, &report)?;
        Ok(report)
    }

    /// Route `tx` through two-phase commit when sender and recipient live on
    /// different shards.
    pub async fn process_cross_shard_transaction(&self, tx: Transaction) -> NetworkResult<CrossShardOutcome> {
        let shard_count = {
            let mut net = self.lock();
            if !net.config().cross_shard_enabled {
                return Err(NetworkError::CrossShardDisabled);
            }
            let source = net.route_address(&tx.from);
            let destination = net.route_transaction(&tx);
            if source == destination {
                net.add_transaction(tx)?;
                return Ok(CrossShardOutcome::SameShard(destination));
            }
            net.shard_count()
        };

        let transfer = self.coordinator.begin(tx, shard_count)?;
        self.coordinator.lock(&transfer.id).await?;
        self.coordinator.commit(&transfer.id, &mut self.lock())?;
        Ok(CrossShardOutcome::Committed {
            source: transfer.source_shard,
            destination: transfer.destination_shard,
        })
    }

    pub fn transfer_state(&self, id: &str) -> Option<TransferState> {
        self.coordinator.get(id).map(|t| t.state)
    }
}
