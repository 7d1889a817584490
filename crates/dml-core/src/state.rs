// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - SHARED CHAIN HANDLE
//
// Single writer, many readers. Appends and mining go through `write()`;
// checkpointing, fork monitoring and queries take `snapshot()` so they never
// observe a half-applied block.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::block::Block;
use crate::chain::Blockchain;
use log::warn;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone)]
pub struct ChainState {
    inner: Arc<RwLock<Blockchain>>,
}

impl ChainState {
    pub fn new(chain: Blockchain) -> Self {
        ChainState {
            inner: Arc::new(RwLock::new(chain)),
        }
    }

    /// Read guard; a poisoned lock is recovered, never propagated.
    pub fn read(&self) -> RwLockReadGuard<'_, Blockchain> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("chain lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Blockchain> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("chain lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Owned copy of the whole chain at one instant.
    pub fn snapshot(&self) -> Blockchain {
        self.read().clone()
    }

    pub fn head(&self) -> Block {
        self.read().head().clone()
    }

    pub fn height(&self) -> u64 {
        self.read().height()
    }
}
