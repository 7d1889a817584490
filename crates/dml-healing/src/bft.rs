// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - BYZANTINE FAULT TOLERANCE
//
// n participants tolerate f = ⌊(n − 1) / 3⌋ faulty ones; agreement needs a
// quorum of 2f + 1 votes. Suspects reported while still within f are marked
// for recovery.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BftStats {
    pub total_nodes: usize,
    pub max_faulty: usize,
    pub quorum: usize,
    pub suspected: usize,
    pub recovered: usize,
    pub can_tolerate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ByzantineFaultTolerance {
    total_nodes: usize,
    max_faulty: usize,
    /// node id → first reported reason
    suspects: BTreeMap<String, String>,
    recovered: BTreeSet<String>,
}

pub fn max_faulty(total_nodes: usize) -> usize {
    total_nodes.saturating_sub(1) / 3
}

impl ByzantineFaultTolerance {
    pub fn new(total_nodes: usize) -> Self {
        ByzantineFaultTolerance {
            total_nodes,
            max_faulty: max_faulty(total_nodes),
            suspects: BTreeMap::new(),
            recovered: BTreeSet::new(),
        }
    }

    /// Resize the participant set; suspects are kept.
    pub fn set_total_nodes(&mut self, total_nodes: usize) {
        self.total_nodes = total_nodes;
        self.max_faulty = max_faulty(total_nodes);
    }

    pub fn total_nodes(&self) -> usize {
        self.total_nodes
    }

    pub fn max_faulty(&self) -> usize {
        self.max_faulty
    }

    pub fn quorum_threshold(&self) -> usize {
        2 * self.max_faulty + 1
    }

    pub fn has_quorum(&self, votes: usize) -> bool {
        votes >= self.quorum_threshold()
    }

    pub fn report_suspicious_node(&mut self, node_id: &str, reason: &str) {
        self.suspects
            .entry(node_id.to_string())
            .or_insert_with(|| reason.to_string());
        if self.suspects.len() <= self.max_faulty {
            self.recovered.insert(node_id.to_string());
        } else {
            warn!(
                "{} suspected nodes exceed the tolerated {} (latest: {}, {})",
                self.suspects.len(),
                self.max_faulty,
                node_id,
                reason
            );
        }
    }

    /// Drop a suspect after it has been dealt with (e.g. slashed out).
    pub fn clear_suspect(&mut self, node_id: &str) -> bool {
        self.recovered.remove(node_id);
        self.suspects.remove(node_id).is_some()
    }

    pub fn is_suspected(&self, node_id: &str) -> bool {
        self.suspects.contains_key(node_id)
    }

    pub fn suspects(&self) -> impl Iterator<Item = (&String, &String)> {
        self.suspects.iter()
    }

    pub fn can_tolerate_current_faults(&self) -> bool {
        self.suspects.len() <= self.max_faulty
    }

    pub fn stats(&self) -> BftStats {
        BftStats {
            total_nodes: self.total_nodes,
            max_faulty: self.max_faulty,
            quorum: self.quorum_threshold(),
            suspected: self.suspects.len(),
            recovered: self.recovered.len(),
            can_tolerate: self.can_tolerate_current_faults(),
        }
    }
}
