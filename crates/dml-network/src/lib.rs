// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - NETWORK
//
// - node:        simulated participant (membership, reputation, health)
// - network:     shards, routing, per-shard pools, throughput, simulation
// - propagation: bounded-parallel block fan-out with per-node timeout
// - cross_shard: two-phase commit over leased (shard, account) locks
// - state:       mutex-guarded shared network plus its 2PC coordinator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod cross_shard;
pub mod errors;
pub mod network;
pub mod node;
pub mod propagation;
pub mod state;

pub use cross_shard::{CrossShardCoordinator, CrossShardTransfer, TransferState};
pub use errors::{NetworkError, NetworkResult};
pub use network::{MultiDimensionalNetwork, NetworkConfig, NetworkStats, Shard};
pub use node::{Position, VirtualNode};
pub use propagation::{fan_out, DeliveryTarget, PropagationReport};
pub use state::{CrossShardOutcome, NetworkState};
