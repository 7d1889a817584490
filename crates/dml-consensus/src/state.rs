use crate::engine::ConsensusEngine;
use log::warn;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared handle on the validator registry.
///
/// A production round holds the guard across select → mine → reward, so
/// registrations and slashes cannot interleave with proposer selection.
/// Lock order: consensus before chain.
#[derive(Debug, Clone)]
pub struct ConsensusState {
    inner: Arc<Mutex<ConsensusEngine>>,
}

impl ConsensusState {
    pub fn new(engine: ConsensusEngine) -> Self {
        ConsensusState {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, ConsensusEngine> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("consensus lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn snapshot(&self) -> ConsensusEngine {
        self.lock().clone()
    }
}
