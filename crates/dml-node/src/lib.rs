// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - NODE
//
// Process-level orchestration: TOML configuration, the LedgerNode composing
// chain, consensus, network and self-healing, its background tasks, and a
// seeded traffic simulator for driving it.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod config;
pub mod errors;
pub mod node;
pub mod simulation;
pub mod tasks;

pub use config::{LedgerConfig, NodeSettings, ValidatorEntry};
pub use errors::{NodeError, NodeResult};
pub use node::{checkpoint_root, BlockProduction, BlockReceipt, LedgerNode, NodeStatus};
pub use simulation::{simulated_validators, TrafficGenerator, Wallet};
pub use tasks::BackgroundTasks;
