// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - SELF-HEALING
//
// - fork:      fork detection and one-shot resolution strategies
// - recovery:  signed checkpoints with bounded retention
// - partition: node liveness, partition detection and healing
// - bft:       fault threshold and quorum accounting
// - system:    the composed, switchable self-healing system
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod bft;
pub mod errors;
pub mod fork;
pub mod partition;
pub mod recovery;
pub mod system;

pub use bft::{BftStats, ByzantineFaultTolerance};
pub use errors::{HealingError, HealingResult};
pub use fork::{Branch, CommonAncestor, Fork, ForkResolver, ForkStats, ForkStrategy};
pub use partition::{
    HealthUpdate, NetworkHealth, NetworkPartition, NetworkPartitionHandler, NodeHealth,
    PartitionStats, SyncStatus,
};
pub use recovery::{Checkpoint, CheckpointStats, StateRecoveryManager};
pub use system::{ForkHandling, HealingConfig, HealingStats, SelfHealingSystem, SystemHealth};
