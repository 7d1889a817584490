// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - NODE CONFIGURATION
//
// One TOML file, one section per component. Every section and field has a
// default, so an empty file is a valid configuration. Amounts are decimal
// strings (integers are accepted too).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::errors::{NodeError, NodeResult};
use dml_consensus::ConsensusConfig;
use dml_core::{codec, ChainConfig};
use dml_crypto::{generate_keypair_from_seed, KeyPair};
use dml_healing::HealingConfig;
use dml_network::NetworkConfig;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Validator registered when the node starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatorEntry {
    pub address: String,
    #[serde(with = "codec::decimal")]
    pub stake: BigUint,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NodeSettings {
    pub node_id: String,
    /// Seed for the simulated network topology and traffic.
    pub simulation_seed: u64,
    pub checkpoint_poll_ms: u64,
    pub fork_monitor_ms: u64,
    /// Hex seed (≥ 32 bytes) of the checkpoint signing key. A fresh key is
    /// generated when absent.
    pub signing_seed: Option<String>,
    pub validators: Vec<ValidatorEntry>,
}

impl Default for NodeSettings {
    fn default() -> Self {
        NodeSettings {
            node_id: "dml-node-0".to_string(),
            simulation_seed: 42,
            checkpoint_poll_ms: 1_000,
            fork_monitor_ms: 2_000,
            signing_seed: None,
            validators: Vec::new(),
        }
    }
}

impl NodeSettings {
    /// Checkpoint signing key from `signing_seed`, if one is configured.
    pub fn signing_keypair(&self) -> NodeResult<Option<KeyPair>> {
        let Some(seed) = &self.signing_seed else {
            return Ok(None);
        };
        let bytes = hex::decode(seed).map_err(|e| NodeError::Config(format!("signing_seed: {e}")))?;
        let keypair =
            generate_keypair_from_seed(&bytes).map_err(|e| NodeError::Config(format!("signing_seed: {e}")))?;
        Ok(Some(keypair))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LedgerConfig {
    pub chain: ChainConfig,
    pub consensus: ConsensusConfig,
    pub network: NetworkConfig,
    pub healing: HealingConfig,
    pub node: NodeSettings,
}

impl LedgerConfig {
    pub fn load_from_file(path: &Path) -> NodeResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: LedgerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> NodeResult<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Cross-section consistency. Section-local values are checked by the
    /// components themselves.
    pub fn validate(&self) -> NodeResult<()> {
        if self.chain.shard_count == 0 {
            return Err(NodeError::Config("chain.shard_count must be positive".to_string()));
        }
        if self.chain.shard_count != self.network.shard_count {
            return Err(NodeError::Config(format!(
                "chain.shard_count ({}) differs from network.shard_count ({})",
                self.chain.shard_count, self.network.shard_count
            )));
        }
        if self.node.node_id.is_empty() {
            return Err(NodeError::Config("node.node_id cannot be empty".to_string()));
        }
        if self.node.checkpoint_poll_ms == 0 || self.node.fork_monitor_ms == 0 {
            return Err(NodeError::Config("background task intervals must be positive".to_string()));
        }
        for v in &self.node.validators {
            if v.stake < self.consensus.min_stake {
                return Err(NodeError::Config(format!(
                    "validator {} stakes {} below consensus.min_stake {}",
                    v.address, v.stake, self.consensus.min_stake
                )));
            }
        }
        self.node.signing_keypair()?;
        Ok(())
    }
}
