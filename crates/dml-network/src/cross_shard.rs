// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - CROSS-SHARD TWO-PHASE COMMIT
//
//   Pending ──lock──▶ Locked ──commit──▶ Committed
//      │                 │
//      └──timeout──▶ Aborted ◀──abort / lease expiry
//
// Phase 1 leases (source shard, sender) and (destination shard, recipient)
// together or not at all, retrying until the lock timeout. Phase 2 only
// commits while both leases are still held: the transaction is queued in the
// destination pool and the transfer is recorded as outbound on the source
// shard. Every exit from Locked releases both leases.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::errors::{NetworkError, NetworkResult};
use crate::network::MultiDimensionalNetwork;
use dml_core::{now_millis, shard_of, Transaction};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Pause between lock attempts while an account is contended.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// Committed or aborted transfers kept for lookup; older ones are dropped.
pub const DEFAULT_SETTLED_TRANSFER_CAP: usize = 1024;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TransferState {
    Pending,
    Locked,
    Committed,
    Aborted,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferState::Committed | TransferState::Aborted)
    }
}

/// (shard, account)
pub type LockKey = (u32, String);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrossShardTransfer {
    /// Transaction hash.
    pub id: String,
    pub transaction: Transaction,
    pub source_shard: u32,
    pub destination_shard: u32,
    pub state: TransferState,
    pub created_at: u64,
    pub updated_at: u64,
    pub abort_reason: Option<String>,
}

impl CrossShardTransfer {
    fn source_key(&self) -> LockKey {
        (self.source_shard, self.transaction.from.clone())
    }

    fn destination_key(&self) -> LockKey {
        (self.destination_shard, self.transaction.to.clone())
    }

    fn keys(&self) -> [LockKey; 2] {
        [self.source_key(), self.destination_key()]
    }

    fn transition(&mut self, state: TransferState) {
        self.state = state;
        self.updated_at = now_millis();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LEASE TABLE
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Lease {
    holder: String,
    expires: Instant,
}

#[derive(Debug, Default)]
struct LockTable {
    leases: HashMap<LockKey, Lease>,
}

impl LockTable {
    /// All keys or none. Expired leases are dropped first.
    fn try_acquire(&mut self, holder: &str, keys: &[LockKey], lease: Duration, now: Instant) -> bool {
        self.leases.retain(|_, l| l.expires > now);
        let contended = keys
            .iter()
            .any(|k| self.leases.get(k).is_some_and(|l| l.holder != holder));
        if contended {
            return false;
        }
        for key in keys {
            self.leases.insert(
                key.clone(),
                Lease {
                    holder: holder.to_string(),
                    expires: now + lease,
                },
            );
        }
        true
    }

    fn holds(&self, holder: &str, key: &LockKey, now: Instant) -> bool {
        self.leases
            .get(key)
            .is_some_and(|l| l.holder == holder && l.expires > now)
    }

    fn release(&mut self, holder: &str) -> usize {
        let before = self.leases.len();
        self.leases.retain(|_, l| l.holder != holder);
        before - self.leases.len()
    }

    fn live(&self, now: Instant) -> usize {
        self.leases.values().filter(|l| l.expires > now).count()
    }
}

fn guard<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            warn!("{} lock was poisoned, recovering", what);
            poisoned.into_inner()
        }
    }
}

/// Drop the oldest settled transfers beyond `cap`.
fn prune_settled(transfers: &mut BTreeMap<String, CrossShardTransfer>, cap: usize) {
    let mut settled: Vec<(u64, String)> = transfers
        .values()
        .filter(|t| t.state.is_terminal())
        .map(|t| (t.updated_at, t.id.clone()))
        .collect();
    if settled.len() <= cap {
        return;
    }
    settled.sort();
    let excess = settled.len() - cap;
    for (_, id) in settled.into_iter().take(excess) {
        transfers.remove(&id);
    }
    debug!("pruned {} settled transfers", excess);
}

// ─────────────────────────────────────────────────────────────────────────────
// COORDINATOR
// ─────────────────────────────────────────────────────────────────────────────

/// Shared by reference across tasks; every method takes `&self`.
/// Internal lock order: transfers before leases.
#[derive(Debug)]
pub struct CrossShardCoordinator {
    lock_timeout: Duration,
    lease: Duration,
    settled_cap: usize,
    transfers: Mutex<BTreeMap<String, CrossShardTransfer>>,
    locks: Mutex<LockTable>,
}

impl CrossShardCoordinator {
    pub fn new(lock_timeout: Duration, lease: Duration) -> Self {
        CrossShardCoordinator {
            lock_timeout,
            lease,
            settled_cap: DEFAULT_SETTLED_TRANSFER_CAP,
            transfers: Mutex::new(BTreeMap::new()),
            locks: Mutex::new(LockTable::default()),
        }
    }

    pub fn with_settled_capacity(mut self, cap: usize) -> Self {
        self.settled_cap = cap;
        self
    }

    pub fn get(&self, id: &str) -> Option<CrossShardTransfer> {
        guard(&self.transfers, "transfers").get(id).cloned()
    }

    pub fn transfers(&self) -> Vec<CrossShardTransfer> {
        guard(&self.transfers, "transfers").values().cloned().collect()
    }

    /// Leases currently in force.
    pub fn held_locks(&self) -> usize {
        guard(&self.locks, "lease").live(Instant::now())
    }

    /// Register `tx` as a Pending transfer between the sender's and the
    /// recipient's shards.
    pub fn begin(&self, tx: Transaction, shard_count: u32) -> NetworkResult<CrossShardTransfer> {
        let errors = tx.validate();
        if !errors.is_empty() {
            return Err(NetworkError::InvalidTransaction(errors));
        }
        let source_shard = shard_of(&tx.from, shard_count);
        let destination_shard = shard_of(&tx.to, shard_count);

        let mut transfers = guard(&self.transfers, "transfers");
        if transfers.get(&tx.hash).is_some_and(|t| !t.state.is_terminal()) {
            return Err(NetworkError::DuplicateTransaction(tx.hash, source_shard));
        }
        let now = now_millis();
        let transfer = CrossShardTransfer {
            id: tx.hash.clone(),
            transaction: tx,
            source_shard,
            destination_shard,
            state: TransferState::Pending,
            created_at: now,
            updated_at: now,
            abort_reason: None,
        };
        transfers.insert(transfer.id.clone(), transfer.clone());
        Ok(transfer)
    }

    fn expect_state(&self, id: &str, expected: TransferState) -> NetworkResult<CrossShardTransfer> {
        let transfers = guard(&self.transfers, "transfers");
        let t = transfers
            .get(id)
            .ok_or_else(|| NetworkError::UnknownTransfer(id.to_string()))?;
        if t.state != expected {
            return Err(NetworkError::InvalidTransferState {
                id: id.to_string(),
                state: t.state,
                expected,
            });
        }
        Ok(t.clone())
    }

    /// Phase 1. Retries until both accounts are leased or the lock timeout
    /// passes; a timeout aborts the transfer.
    pub async fn lock(&self, id: &str) -> NetworkResult<()> {
        let transfer = self.expect_state(id, TransferState::Pending)?;
        let keys = transfer.keys();
        let deadline = Instant::now() + self.lock_timeout;

        loop {
            let now = Instant::now();
            let acquired = guard(&self.locks, "lease").try_acquire(id, &keys, self.lease, now);
            if acquired {
                break;
            }
            if now >= deadline {
                self.abort(id, "lock timeout")?;
                return Err(NetworkError::LockTimeout(id.to_string()));
            }
            tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
        }

        let mut transfers = guard(&self.transfers, "transfers");
        match transfers.get_mut(id) {
            Some(t) if t.state == TransferState::Pending => {
                t.transition(TransferState::Locked);
                debug!("transfer {} locked {:?}", id, keys);
                Ok(())
            }
            Some(t) => {
                let state = t.state;
                guard(&self.locks, "lease").release(id);
                Err(NetworkError::InvalidTransferState {
                    id: id.to_string(),
                    state,
                    expected: TransferState::Pending,
                })
            }
            None => {
                guard(&self.locks, "lease").release(id);
                Err(NetworkError::UnknownTransfer(id.to_string()))
            }
        }
    }

    /// Phase 2. Fails and rolls back to Aborted if either lease lapsed or
    /// the destination shard rejects the transaction.
    pub fn commit(&self, id: &str, network: &mut MultiDimensionalNetwork) -> NetworkResult<()> {
        let mut transfers = guard(&self.transfers, "transfers");
        let transfer = transfers
            .get_mut(id)
            .ok_or_else(|| NetworkError::UnknownTransfer(id.to_string()))?;
        if transfer.state != TransferState::Locked {
            return Err(NetworkError::InvalidTransferState {
                id: id.to_string(),
                state: transfer.state,
                expected: TransferState::Locked,
            });
        }

        let mut locks = guard(&self.locks, "lease");
        let now = Instant::now();
        let still_held = transfer.keys().iter().all(|k| locks.holds(id, k, now));
        if !still_held {
            locks.release(id);
            transfer.transition(TransferState::Aborted);
            transfer.abort_reason = Some("lease expired".to_string());
            warn!("transfer {} aborted: lease expired before commit", id);
            prune_settled(&mut transfers, self.settled_cap);
            return Err(NetworkError::LeaseExpired(id.to_string()));
        }

        let mut tx = transfer.transaction.clone();
        tx.shard_id = Some(transfer.destination_shard);
        let (source, destination) = (transfer.source_shard, transfer.destination_shard);
        // Both shards must exist before either is touched.
        let applied = [source, destination]
            .into_iter()
            .find(|s| network.get_shard(*s).is_none())
            .map_or(Ok(()), |missing| Err(NetworkError::UnknownShard(missing)))
            .and_then(|()| network.add_transaction_to_shard(destination, tx))
            .and_then(|()| network.shard_mut(source))
            .map(|shard| shard.outbound_transfers.push(id.to_string()));

        locks.release(id);
        let result = match applied {
            Ok(()) => {
                transfer.transition(TransferState::Committed);
                info!("transfer {} committed: shard {} → shard {}", id, source, destination);
                Ok(())
            }
            Err(e) => {
                transfer.transition(TransferState::Aborted);
                transfer.abort_reason = Some(e.to_string());
                warn!("transfer {} rolled back: {}", id, e);
                Err(e)
            }
        };
        prune_settled(&mut transfers, self.settled_cap);
        result
    }

    /// Abort a transfer that has not committed. Releases its leases.
    pub fn abort(&self, id: &str, reason: &str) -> NetworkResult<()> {
        let mut transfers = guard(&self.transfers, "transfers");
        let transfer = transfers
            .get_mut(id)
            .ok_or_else(|| NetworkError::UnknownTransfer(id.to_string()))?;
        if transfer.state == TransferState::Committed {
            return Err(NetworkError::InvalidTransferState {
                id: id.to_string(),
                state: TransferState::Committed,
                expected: TransferState::Locked,
            });
        }
        guard(&self.locks, "lease").release(id);
        if transfer.state != TransferState::Aborted {
            transfer.transition(TransferState::Aborted);
            transfer.abort_reason = Some(reason.to_string());
            warn!("transfer {} aborted: {}", id, reason);
        }
        prune_settled(&mut transfers, self.settled_cap);
        Ok(())
    }

    /// Abort every Locked transfer whose leases have lapsed.
    pub fn expire_stale(&self) -> Vec<String> {
        let mut transfers = guard(&self.transfers, "transfers");
        let mut locks = guard(&self.locks, "lease");
        let now = Instant::now();
        let mut expired = Vec::new();

        for t in transfers.values_mut() {
            if t.state != TransferState::Locked {
                continue;
            }
            if t.keys().iter().all(|k| locks.holds(&t.id, k, now)) {
                continue;
            }
            locks.release(&t.id);
            t.transition(TransferState::Aborted);
            t.abort_reason = Some("lease expired".to_string());
            expired.push(t.id.clone());
        }
        if !expired.is_empty() {
            warn!("expired {} stale cross-shard transfers", expired.len());
            prune_settled(&mut transfers, self.settled_cap);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkConfig;
    use dml_crypto::generate_keypair_from_seed;
    use num_bigint::BigUint;

    const SHARDS: u32 = 8;

    fn tx(from: &str, to: &str) -> Transaction {
        let kp = generate_keypair_from_seed(&[9u8; 32]).unwrap();
        let mut tx = Transaction::new(from, to, BigUint::from(5u32), BigUint::from(1u32), 21_000, 0, None)
            .with_timestamp(1_000);
        tx.sign(&kp.secret_key, &kp.public_key).unwrap();
        tx
    }

    /// An address on a different shard than `from`.
    fn other_shard_address(from: &str, tag: &str) -> String {
        let home = shard_of(from, SHARDS);
        (0..)
            .map(|i| format!("0x{tag}-account-{i:04}"))
            .find(|a| shard_of(a, SHARDS) != home)
            .unwrap()
    }

    fn network() -> MultiDimensionalNetwork {
        MultiDimensionalNetwork::new(NetworkConfig {
            shard_count: SHARDS,
            ..NetworkConfig::default()
        })
    }

    fn coordinator(timeout_ms: u64, lease_ms: u64) -> CrossShardCoordinator {
        CrossShardCoordinator::new(Duration::from_millis(timeout_ms), Duration::from_millis(lease_ms))
    }

    #[tokio::test]
    async fn test_happy_path_commits() {
        let from = "0xalice-account-0001";
        let to = other_shard_address(from, "bob");
        let c = coordinator(100, 5_000);
        let mut net = network();

        let t = c.begin(tx(from, &to), SHARDS).unwrap();
        assert_ne!(t.source_shard, t.destination_shard);
        c.lock(&t.id).await.unwrap();
        assert_eq!(c.get(&t.id).unwrap().state, TransferState::Locked);
        assert_eq!(c.held_locks(), 2);

        c.commit(&t.id, &mut net).unwrap();
        assert_eq!(c.get(&t.id).unwrap().state, TransferState::Committed);
        assert_eq!(c.held_locks(), 0);
        assert_eq!(net.pending_transactions(t.destination_shard).len(), 1);
        assert_eq!(
            net.get_shard(t.source_shard).unwrap().outbound_transfers,
            vec![t.id.clone()]
        );
        assert!(c.abort(&t.id, "late").is_err());
    }

    #[tokio::test]
    async fn test_contention_times_out_and_aborts() {
        let from = "0xalice-account-0001";
        let to_a = other_shard_address(from, "bob");
        let to_b = other_shard_address(from, "carol");
        let c = coordinator(50, 5_000);

        let first = c.begin(tx(from, &to_a), SHARDS).unwrap();
        c.lock(&first.id).await.unwrap();

        let second = c.begin(tx(from, &to_b), SHARDS).unwrap();
        let started = Instant::now();
        let err = c.lock(&second.id).await.unwrap_err();
        assert_eq!(err, NetworkError::LockTimeout(second.id.clone()));
        assert!(started.elapsed() >= Duration::from_millis(50));

        let aborted = c.get(&second.id).unwrap();
        assert_eq!(aborted.state, TransferState::Aborted);
        assert_eq!(aborted.abort_reason.as_deref(), Some("lock timeout"));
        // Only the winner's leases remain.
        assert_eq!(c.held_locks(), 2);

        c.abort(&first.id, "operator").unwrap();
        assert_eq!(c.held_locks(), 0);
    }

    #[tokio::test]
    async fn test_expired_lease_blocks_commit() {
        let from = "0xalice-account-0001";
        let to = other_shard_address(from, "bob");
        let c = coordinator(50, 20);
        let mut net = network();

        let t = c.begin(tx(from, &to), SHARDS).unwrap();
        c.lock(&t.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(c.commit(&t.id, &mut net), Err(NetworkError::LeaseExpired(t.id.clone())));
        assert_eq!(c.get(&t.id).unwrap().state, TransferState::Aborted);
        assert_eq!(net.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_source_shard_leaves_destination_untouched() {
        let from = (0..)
            .map(|i| format!("0xalice-account-{i:04}"))
            .find(|a| shard_of(a, SHARDS) == SHARDS - 1)
            .unwrap();
        let to = (0..)
            .map(|i| format!("0xbob-account-{i:04}"))
            .find(|a| shard_of(a, SHARDS) == 0)
            .unwrap();
        let c = coordinator(100, 5_000);
        let mut net = MultiDimensionalNetwork::new(NetworkConfig {
            shard_count: 1,
            ..NetworkConfig::default()
        });

        let t = c.begin(tx(&from, &to), SHARDS).unwrap();
        c.lock(&t.id).await.unwrap();
        assert_eq!(c.commit(&t.id, &mut net), Err(NetworkError::UnknownShard(SHARDS - 1)));
        assert_eq!(c.get(&t.id).unwrap().state, TransferState::Aborted);
        assert_eq!(net.pending_count(), 0);
        assert_eq!(c.held_locks(), 0);
    }

    #[tokio::test]
    async fn test_settled_transfers_are_bounded() {
        let from = "0xalice-account-0001";
        let c = coordinator(100, 5_000).with_settled_capacity(2);
        let open = c.begin(tx(from, &other_shard_address(from, "dave")), SHARDS).unwrap();

        for tag in ["bob", "carol", "erin", "frank"] {
            let to = other_shard_address(from, tag);
            let t = c.begin(tx(from, &to), SHARDS).unwrap();
            c.abort(&t.id, "operator").unwrap();
        }
        let settled = c.transfers().iter().filter(|t| t.state.is_terminal()).count();
        assert_eq!(settled, 2);
        assert_eq!(c.transfers().len(), 3);
        assert_eq!(c.get(&open.id).unwrap().state, TransferState::Pending);
    }

    #[tokio::test]
    async fn test_expire_stale_sweeps_locked() {
        let from = "0xalice-account-0001";
        let to = other_shard_address(from, "bob");
        let c = coordinator(50, 20);

        let t = c.begin(tx(from, &to), SHARDS).unwrap();
        c.lock(&t.id).await.unwrap();
        assert!(c.expire_stale().is_empty());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(c.expire_stale(), vec![t.id.clone()]);
        assert_eq!(c.get(&t.id).unwrap().state, TransferState::Aborted);
        assert_eq!(c.held_locks(), 0);
    }

    #[tokio::test]
    async fn test_destination_duplicate_rolls_back() {
        let from = "0xalice-account-0001";
        let to = other_shard_address(from, "bob");
        let c = coordinator(50, 5_000);
        let mut net = network();
        let transaction = tx(from, &to);
        net.add_transaction(transaction.clone()).unwrap();

        let t = c.begin(transaction, SHARDS).unwrap();
        c.lock(&t.id).await.unwrap();
        assert!(matches!(
            c.commit(&t.id, &mut net),
            Err(NetworkError::DuplicateTransaction(..))
        ));
        assert_eq!(c.get(&t.id).unwrap().state, TransferState::Aborted);
        assert!(net.get_shard(t.source_shard).unwrap().outbound_transfers.is_empty());
        assert_eq!(c.held_locks(), 0);
    }

    #[test]
    fn test_state_guards() {
        let c = coordinator(10, 10);
        let mut net = network();
        let from = "0xalice-account-0001";
        let to = other_shard_address(from, "bob");
        let t = c.begin(tx(from, &to), SHARDS).unwrap();

        assert!(matches!(
            c.commit(&t.id, &mut net),
            Err(NetworkError::InvalidTransferState { state: TransferState::Pending, .. })
        ));
        assert!(matches!(
            c.begin(tx(from, &to), SHARDS),
            Err(NetworkError::DuplicateTransaction(..))
        ));
        assert_eq!(c.commit("missing", &mut net), Err(NetworkError::UnknownTransfer("missing".into())));

        let mut unsigned = tx(from, &to);
        unsigned.signature = None;
        assert!(matches!(c.begin(unsigned, SHARDS), Err(NetworkError::InvalidTransaction(_))));
    }
}
