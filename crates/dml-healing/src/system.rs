// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - SELF-HEALING SYSTEM
//
// Composes fork resolution, checkpoint recovery, partition handling and BFT
// accounting behind one switch. While disabled, detection and recovery are
// no-ops; health reports and checkpoint creation keep working.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::bft::{BftStats, ByzantineFaultTolerance};
use crate::errors::{HealingError, HealingResult};
use crate::fork::{Branch, Fork, ForkResolver, ForkStats, ForkStrategy};
use crate::partition::{
    HealthUpdate, NetworkHealth, NetworkPartition, NetworkPartitionHandler, PartitionStats,
    DEFAULT_PARTITION_THRESHOLD_MS,
};
use crate::recovery::{
    Checkpoint, CheckpointStats, StateRecoveryManager, DEFAULT_CHECKPOINT_INTERVAL,
    DEFAULT_MAX_CHECKPOINTS,
};
use dml_core::Block;
use dml_crypto::KeyPair;
use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HealingConfig {
    pub enabled: bool,
    /// Participants assumed by BFT accounting.
    pub total_nodes: usize,
    pub fork_strategy: ForkStrategy,
    pub checkpoint_interval: u64,
    pub max_checkpoints: usize,
    pub partition_threshold_ms: u64,
}

impl Default for HealingConfig {
    fn default() -> Self {
        HealingConfig {
            enabled: true,
            total_nodes: 10,
            fork_strategy: ForkStrategy::LongestChain,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            max_checkpoints: DEFAULT_MAX_CHECKPOINTS,
            partition_threshold_ms: DEFAULT_PARTITION_THRESHOLD_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ForkHandling {
    pub detected: bool,
    pub resolved: bool,
    pub winner: Option<Branch>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemHealth {
    pub healthy: bool,
    pub active_forks: usize,
    pub active_partitions: usize,
    pub bft_ok: bool,
    pub network: NetworkHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealingStats {
    pub enabled: bool,
    pub forks: ForkStats,
    pub checkpoints: CheckpointStats,
    pub partitions: PartitionStats,
    pub bft: BftStats,
    pub network: NetworkHealth,
}

#[derive(Debug)]
pub struct SelfHealingSystem {
    forks: ForkResolver,
    recovery: StateRecoveryManager,
    partitions: NetworkPartitionHandler,
    bft: ByzantineFaultTolerance,
    enabled: bool,
}

impl Default for SelfHealingSystem {
    fn default() -> Self {
        Self::new(HealingConfig::default())
    }
}

impl SelfHealingSystem {
    pub fn new(config: HealingConfig) -> Self {
        let recovery = StateRecoveryManager::new(config.checkpoint_interval, config.max_checkpoints);
        Self::assemble(config, recovery)
    }

    /// Checkpoints are signed with `keypair` instead of a fresh key.
    pub fn with_keypair(config: HealingConfig, keypair: KeyPair) -> Self {
        let recovery =
            StateRecoveryManager::with_keypair(config.checkpoint_interval, config.max_checkpoints, keypair);
        Self::assemble(config, recovery)
    }

    fn assemble(config: HealingConfig, recovery: StateRecoveryManager) -> Self {
        SelfHealingSystem {
            forks: ForkResolver::new(config.fork_strategy),
            recovery,
            partitions: NetworkPartitionHandler::new(config.partition_threshold_ms),
            bft: ByzantineFaultTolerance::new(config.total_nodes),
            enabled: config.enabled,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            info!("self-healing {}", if enabled { "enabled" } else { "disabled" });
        }
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    // ── Forks ────────────────────────────────────────────────────────────────

    fn settle(&mut self, fork: Option<Fork>) -> ForkHandling {
        let Some(fork) = fork else {
            return ForkHandling::default();
        };
        if let Some(winner) = fork.resolution {
            return ForkHandling {
                detected: true,
                resolved: true,
                winner: Some(winner),
            };
        }
        match self.forks.resolve_fork(&fork.id) {
            Ok(winner) => ForkHandling {
                detected: true,
                resolved: true,
                winner: Some(winner),
            },
            Err(e) => {
                warn!("fork {} left unresolved: {}", fork.id, e);
                ForkHandling {
                    detected: true,
                    ..Default::default()
                }
            }
        }
    }

    /// Detect and immediately resolve a fork between two blocks.
    pub fn handle_fork(&mut self, first: &Block, second: &Block) -> ForkHandling {
        if !self.enabled {
            return ForkHandling::default();
        }
        let fork = self.forks.detect_fork(first, second);
        self.settle(fork)
    }

    /// Same as [`Self::handle_fork`] over two whole chains.
    pub fn handle_chain_fork(&mut self, chain_a: &[Block], chain_b: &[Block]) -> ForkHandling {
        if !self.enabled {
            return ForkHandling::default();
        }
        let fork = self.forks.detect_fork_between(chain_a, chain_b);
        self.settle(fork)
    }

    // ── Checkpoints ──────────────────────────────────────────────────────────

    pub fn should_checkpoint(&self, height: u64) -> bool {
        self.recovery.should_checkpoint(height)
    }

    pub fn create_auto_checkpoint(
        &mut self,
        block_number: u64,
        state_root: &str,
        validators: Vec<String>,
    ) -> HealingResult<Checkpoint> {
        self.recovery.create_checkpoint(block_number, state_root, validators)
    }

    /// Nearest verified checkpoint at or below `height`, or the latest.
    pub fn recover_from_failure(&self, height: Option<u64>) -> HealingResult<Checkpoint> {
        if !self.enabled {
            return Err(HealingError::Disabled);
        }
        self.recovery.recover(height)
    }

    // ── Partitions & BFT ─────────────────────────────────────────────────────

    pub fn handle_network_partition(&mut self, nodes: &[String]) -> Option<NetworkPartition> {
        if !self.enabled {
            return None;
        }
        self.partitions.detect_partition(nodes)
    }

    pub fn update_node_health(&mut self, node_id: &str, update: HealthUpdate) {
        self.partitions.update_node_health(node_id, update);
    }

    pub fn report_byzantine_node(&mut self, node_id: &str, reason: &str) {
        self.bft.report_suspicious_node(node_id, reason);
    }

    pub fn check_system_health(&self) -> SystemHealth {
        let active_forks = self.forks.stats().active;
        let active_partitions = self.partitions.stats().active;
        let bft_ok = self.bft.can_tolerate_current_faults();
        SystemHealth {
            healthy: active_forks == 0 && active_partitions == 0 && bft_ok,
            active_forks,
            active_partitions,
            bft_ok,
            network: self.partitions.network_health(),
        }
    }

    pub fn stats(&self) -> HealingStats {
        HealingStats {
            enabled: self.enabled,
            forks: self.forks.stats(),
            checkpoints: self.recovery.stats(),
            partitions: self.partitions.stats(),
            bft: self.bft.stats(),
            network: self.partitions.network_health(),
        }
    }

    // ── Components ───────────────────────────────────────────────────────────

    pub fn fork_resolver(&self) -> &ForkResolver {
        &self.forks
    }

    pub fn fork_resolver_mut(&mut self) -> &mut ForkResolver {
        &mut self.forks
    }

    pub fn state_recovery(&self) -> &StateRecoveryManager {
        &self.recovery
    }

    pub fn state_recovery_mut(&mut self) -> &mut StateRecoveryManager {
        &mut self.recovery
    }

    pub fn partition_handler(&self) -> &NetworkPartitionHandler {
        &self.partitions
    }

    pub fn partition_handler_mut(&mut self) -> &mut NetworkPartitionHandler {
        &mut self.partitions
    }

    pub fn bft(&self) -> &ByzantineFaultTolerance {
        &self.bft
    }

    pub fn bft_mut(&mut self) -> &mut ByzantineFaultTolerance {
        &mut self.bft
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn competing() -> (Block, Block) {
        let prev = "ab".repeat(32);
        (
            Block::new(5, prev.clone(), "0xvalidator-0001", 0, 30_000_000, 100),
            Block::new(5, prev, "0xvalidator-0002", 0, 30_000_000, 100),
        )
    }

    #[test]
    fn test_fork_handled_once_and_health_stays_green() {
        let mut sys = SelfHealingSystem::default();
        let (a, b) = competing();
        let first = sys.handle_fork(&a, &b);
        assert_eq!(
            first,
            ForkHandling { detected: true, resolved: true, winner: Some(Branch::First) }
        );
        // Re-reporting the same pair reports the existing resolution.
        assert_eq!(sys.handle_fork(&a, &b), first);
        assert_eq!(sys.stats().forks.total, 1);
        assert!(sys.check_system_health().healthy);
        assert_eq!(sys.handle_fork(&a, &a), ForkHandling::default());
    }

    #[test]
    fn test_disabled_system_is_inert() {
        let mut sys = SelfHealingSystem::new(HealingConfig {
            enabled: false,
            ..HealingConfig::default()
        });
        let (a, b) = competing();
        assert_eq!(sys.handle_fork(&a, &b), ForkHandling::default());
        sys.create_auto_checkpoint(1_000, "root", vec![]).unwrap();
        assert_eq!(sys.recover_from_failure(None), Err(HealingError::Disabled));
        assert!(sys.handle_network_partition(&["n".to_string()]).is_none());

        sys.set_enabled(true);
        assert_eq!(sys.recover_from_failure(None).unwrap().block_number, 1_000);
    }

    #[test]
    fn test_byzantine_reports_degrade_health() {
        let mut sys = SelfHealingSystem::default();
        for i in 0..4 {
            sys.report_byzantine_node(&format!("0xbad-{i}"), "double sign");
        }
        let health = sys.check_system_health();
        assert!(!health.bft_ok);
        assert!(!health.healthy);
    }

    #[test]
    fn test_unresolved_partition_degrades_health() {
        let mut sys = SelfHealingSystem::new(HealingConfig {
            partition_threshold_ms: 0,
            ..HealingConfig::default()
        });
        sys.partition_handler_mut()
            .update_node_health_at("n1", HealthUpdate::default(), 0);
        let p = sys.handle_network_partition(&["n1".to_string()]).unwrap();
        assert_eq!(sys.check_system_health().active_partitions, 1);
        assert!(!sys.check_system_health().healthy);

        sys.update_node_health("n1", HealthUpdate::synced(1, 3));
        assert_eq!(sys.partition_handler_mut().resolve_partition(&p.id), Ok(true));
        assert!(sys.check_system_health().healthy);
    }
}
