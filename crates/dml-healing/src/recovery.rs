// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - STATE RECOVERY
//
// Signed checkpoints indexed by block height. The manager signs with its own
// Ed25519 key over (height, state root, timestamp, validator set) and only
// recovers from a checkpoint whose signature verifies against that key.
// Retention keeps the newest `max_checkpoints` heights.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::errors::{HealingError, HealingResult};
use dml_core::now_millis;
use dml_crypto::{generate_keypair, sha3_hex_parts, sign_message, verify_signature, KeyPair};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 1_000;
pub const DEFAULT_MAX_CHECKPOINTS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    pub id: String,
    pub block_number: u64,
    pub state_root: String,
    pub timestamp: u64,
    pub validators: Vec<String>,
    /// Hex Ed25519 signature over [`Checkpoint::signing_message`].
    pub signature: String,
}

impl Checkpoint {
    pub fn signing_message(&self) -> Vec<u8> {
        let mut msg = Vec::new();
        msg.extend_from_slice(&(self.id.len() as u64).to_be_bytes());
        msg.extend_from_slice(self.id.as_bytes());
        msg.extend_from_slice(&self.block_number.to_be_bytes());
        msg.extend_from_slice(&(self.state_root.len() as u64).to_be_bytes());
        msg.extend_from_slice(self.state_root.as_bytes());
        msg.extend_from_slice(&self.timestamp.to_be_bytes());
        msg.extend_from_slice(&(self.validators.len() as u64).to_be_bytes());
        for v in &self.validators {
            msg.extend_from_slice(&(v.len() as u64).to_be_bytes());
            msg.extend_from_slice(v.as_bytes());
        }
        msg
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CheckpointStats {
    pub total: usize,
    pub latest_block: Option<u64>,
    pub oldest_block: Option<u64>,
}

#[derive(Debug)]
pub struct StateRecoveryManager {
    keypair: KeyPair,
    checkpoints: BTreeMap<u64, Checkpoint>,
    interval: u64,
    max_checkpoints: usize,
}

impl StateRecoveryManager {
    /// Signs with a freshly generated key.
    pub fn new(interval: u64, max_checkpoints: usize) -> Self {
        Self::with_keypair(interval, max_checkpoints, generate_keypair())
    }

    pub fn with_keypair(interval: u64, max_checkpoints: usize, keypair: KeyPair) -> Self {
        StateRecoveryManager {
            keypair,
            checkpoints: BTreeMap::new(),
            interval,
            max_checkpoints: max_checkpoints.max(1),
        }
    }

    pub fn public_key(&self) -> &[u8] {
        &self.keypair.public_key
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// True at every non-zero multiple of the interval.
    pub fn should_checkpoint(&self, height: u64) -> bool {
        self.interval > 0 && height > 0 && height % self.interval == 0
    }

    /// Sign and retain a checkpoint. A second checkpoint at the same height
    /// replaces the first.
    pub fn create_checkpoint(
        &mut self,
        block_number: u64,
        state_root: &str,
        validators: Vec<String>,
    ) -> HealingResult<Checkpoint> {
        let mut checkpoint = Checkpoint {
            id: sha3_hex_parts(&[&block_number.to_be_bytes()[..], state_root.as_bytes()]),
            block_number,
            state_root: state_root.to_string(),
            timestamp: now_millis(),
            validators,
            signature: String::new(),
        };
        let signature = sign_message(&checkpoint.signing_message(), &self.keypair.secret_key)?;
        checkpoint.signature = hex::encode(signature);

        self.checkpoints.insert(block_number, checkpoint.clone());
        self.prune();
        info!("checkpoint {} at height {}", &checkpoint.id[..16], block_number);
        Ok(checkpoint)
    }

    /// Retain a checkpoint produced elsewhere. It is verified only on recovery.
    pub fn import_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.checkpoints.insert(checkpoint.block_number, checkpoint);
        self.prune();
    }

    fn prune(&mut self) {
        while self.checkpoints.len() > self.max_checkpoints {
            if let Some((height, _)) = self.checkpoints.pop_first() {
                debug!("pruned checkpoint at height {}", height);
            }
        }
    }

    pub fn verify_checkpoint(&self, checkpoint: &Checkpoint) -> bool {
        match hex::decode(&checkpoint.signature) {
            Ok(sig) => verify_signature(&checkpoint.signing_message(), &sig, &self.keypair.public_key),
            Err(_) => false,
        }
    }

    pub fn get_checkpoint(&self, id: &str) -> Option<&Checkpoint> {
        self.checkpoints.values().find(|c| c.id == id)
    }

    pub fn latest_checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoints.values().next_back()
    }

    /// Greatest retained height ≤ `height`.
    pub fn find_nearest_checkpoint(&self, height: u64) -> Option<&Checkpoint> {
        self.checkpoints.range(..=height).next_back().map(|(_, c)| c)
    }

    pub fn checkpoints(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.values()
    }

    pub fn recover_from_checkpoint(&self, id: &str) -> HealingResult<Checkpoint> {
        let checkpoint = self
            .get_checkpoint(id)
            .ok_or_else(|| HealingError::RecoveryUnavailable(format!("checkpoint {id} not found")))?;
        if !self.verify_checkpoint(checkpoint) {
            warn!("checkpoint {} failed signature verification", id);
            return Err(HealingError::RecoveryUnavailable(format!(
                "checkpoint {id} has an invalid signature"
            )));
        }
        Ok(checkpoint.clone())
    }

    /// Nearest checkpoint at or below `height`, or the latest when `None`.
    pub fn recover(&self, height: Option<u64>) -> HealingResult<Checkpoint> {
        let candidate = match height {
            Some(h) => self.find_nearest_checkpoint(h),
            None => self.latest_checkpoint(),
        }
        .ok_or_else(|| HealingError::RecoveryUnavailable("no checkpoint available".to_string()))?;
        self.recover_from_checkpoint(&candidate.id)
    }

    pub fn stats(&self) -> CheckpointStats {
        CheckpointStats {
            total: self.checkpoints.len(),
            latest_block: self.checkpoints.keys().next_back().copied(),
            oldest_block: self.checkpoints.keys().next().copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dml_crypto::generate_keypair_from_seed;

    fn manager(max: usize) -> StateRecoveryManager {
        StateRecoveryManager::with_keypair(100, max, generate_keypair_from_seed(&[3u8; 32]).unwrap())
    }

    fn validators() -> Vec<String> {
        vec!["0xvalidator-0001".into(), "0xvalidator-0002".into()]
    }

    #[test]
    fn test_nearest_checkpoint() {
        let mut m = manager(10);
        for h in [100, 200, 300] {
            m.create_checkpoint(h, &format!("root-{h}"), validators()).unwrap();
        }
        assert_eq!(m.find_nearest_checkpoint(250).unwrap().block_number, 200);
        assert_eq!(m.find_nearest_checkpoint(300).unwrap().block_number, 300);
        assert!(m.find_nearest_checkpoint(99).is_none());
        assert_eq!(m.latest_checkpoint().unwrap().block_number, 300);
        assert_eq!(m.recover(Some(250)).unwrap().state_root, "root-200");
    }

    #[test]
    fn test_tampered_checkpoint_rejected() {
        let mut m = manager(10);
        let cp = m.create_checkpoint(100, "root", validators()).unwrap();
        assert!(m.recover_from_checkpoint(&cp.id).is_ok());

        let mut forged = cp.clone();
        forged.validators.push("0xintruder-0001".into());
        m.import_checkpoint(forged);
        assert!(matches!(
            m.recover_from_checkpoint(&cp.id),
            Err(HealingError::RecoveryUnavailable(_))
        ));

        let mut bad_sig = cp.clone();
        bad_sig.signature = "zz".into();
        assert!(!m.verify_checkpoint(&bad_sig));
    }

    #[test]
    fn test_relabelled_checkpoint_rejected() {
        let mut m = manager(10);
        let cp = m.create_checkpoint(100, "root", validators()).unwrap();
        let mut relabelled = cp.clone();
        relabelled.id = "ab".repeat(32);
        assert!(m.verify_checkpoint(&cp));
        assert!(!m.verify_checkpoint(&relabelled));
    }

    #[test]
    fn test_foreign_key_rejected() {
        let mut ours = manager(10);
        let mut theirs =
            StateRecoveryManager::with_keypair(100, 10, generate_keypair_from_seed(&[8u8; 32]).unwrap());
        let cp = theirs.create_checkpoint(500, "root", validators()).unwrap();
        ours.import_checkpoint(cp.clone());
        assert!(ours.recover_from_checkpoint(&cp.id).is_err());
    }

    #[test]
    fn test_retention_keeps_newest() {
        let mut m = manager(3);
        for h in [500, 100, 400, 200, 300] {
            m.create_checkpoint(h, "r", validators()).unwrap();
        }
        let heights: Vec<u64> = m.checkpoints().map(|c| c.block_number).collect();
        assert_eq!(heights, vec![300, 400, 500]);
        assert_eq!(
            m.stats(),
            CheckpointStats { total: 3, latest_block: Some(500), oldest_block: Some(300) }
        );
    }

    #[test]
    fn test_interval_predicate() {
        let m = manager(10);
        assert!(!m.should_checkpoint(0));
        assert!(!m.should_checkpoint(150));
        assert!(m.should_checkpoint(200));
        assert!(!StateRecoveryManager::new(0, 1).should_checkpoint(10));
    }

    #[test]
    fn test_empty_manager() {
        let m = manager(10);
        assert_eq!(
            m.recover(None),
            Err(HealingError::RecoveryUnavailable("no checkpoint available".into()))
        );
        assert!(m.recover_from_checkpoint("missing").is_err());
        assert_eq!(m.stats(), CheckpointStats::default());
    }
}
