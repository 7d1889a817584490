// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - CONSENSUS
//
// - validator: stake, reputation, reward/slash state machine
// - engine:    registry, weighted proposer selection, block validation, finality
// - proof:     modular-exponentiation proof scheme
// - state:     mutex-guarded shared engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod engine;
pub mod errors;
pub mod proof;
pub mod state;
pub mod validator;

pub use engine::{ConsensusConfig, ConsensusEngine, ConsensusStats, SlashEvent};
pub use errors::{ConsensusError, ConsensusResult};
pub use proof::ModExpProofScheme;
pub use state::ConsensusState;
pub use validator::Validator;
