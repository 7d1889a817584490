// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - SIMULATED TRAFFIC
//
// Deterministic wallets and signed transfers for driving a node without real
// clients. Keys, recipients and amounts all come from one seeded StdRng, so
// a seed reproduces the same traffic (timestamps aside).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::config::ValidatorEntry;
use crate::errors::{NodeError, NodeResult};
use dml_core::Transaction;
use dml_crypto::{generate_keypair_from_seed, public_key_to_address, KeyPair};
use num_bigint::BigUint;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Gas of a plain transfer.
pub const TRANSFER_GAS: u64 = 21_000;

pub struct Wallet {
    pub address: String,
    keypair: KeyPair,
    next_nonce: u64,
}

impl Wallet {
    fn from_rng(rng: &mut StdRng) -> NodeResult<Self> {
        let mut seed = [0u8; 32];
        rng.fill(&mut seed);
        let keypair = generate_keypair_from_seed(&seed).map_err(|e| NodeError::Config(e.to_string()))?;
        Ok(Wallet {
            address: public_key_to_address(&keypair.public_key),
            keypair,
            next_nonce: 0,
        })
    }

    pub fn next_nonce(&self) -> u64 {
        self.next_nonce
    }

    /// Signed transfer to `to`; consumes a nonce.
    pub fn transfer(&mut self, to: &str, value: BigUint, gas_price: BigUint) -> NodeResult<Transaction> {
        let mut tx = Transaction::new(
            self.address.clone(),
            to,
            value,
            gas_price,
            TRANSFER_GAS,
            self.next_nonce,
            None,
        );
        tx.sign(&self.keypair.secret_key, &self.keypair.public_key)
            .map_err(|e| NodeError::Config(format!("signing failed: {e}")))?;
        self.next_nonce += 1;
        Ok(tx)
    }
}

pub struct TrafficGenerator {
    rng: StdRng,
    wallets: Vec<Wallet>,
}

impl TrafficGenerator {
    pub fn new(wallet_count: usize, seed: u64) -> NodeResult<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let wallets = (0..wallet_count.max(2))
            .map(|_| Wallet::from_rng(&mut rng))
            .collect::<NodeResult<Vec<_>>>()?;
        Ok(TrafficGenerator { rng, wallets })
    }

    pub fn wallets(&self) -> &[Wallet] {
        &self.wallets
    }

    /// Random transfer between two distinct wallets.
    pub fn next_transaction(&mut self) -> NodeResult<Transaction> {
        let n = self.wallets.len();
        let from = self.rng.gen_range(0..n);
        let to = (from + self.rng.gen_range(1..n)) % n;
        let value = BigUint::from(self.rng.gen_range(1u64..1_000_000));
        let gas_price = BigUint::from(self.rng.gen_range(1u64..100));
        let recipient = self.wallets[to].address.clone();
        self.wallets[from].transfer(&recipient, value, gas_price)
    }

    pub fn batch(&mut self, count: usize) -> NodeResult<Vec<Transaction>> {
        (0..count).map(|_| self.next_transaction()).collect()
    }
}

/// `count` validators with addresses derived from seeded keys. Validator `i`
/// stakes `min_stake × (i + 1)`.
pub fn simulated_validators(count: usize, min_stake: &BigUint, seed: u64) -> NodeResult<Vec<ValidatorEntry>> {
    let mut rng = StdRng::seed_from_u64(seed ^ 0x5641_4c49_4441_544f);
    (0..count)
        .map(|i| {
            let wallet = Wallet::from_rng(&mut rng)?;
            Ok(ValidatorEntry {
                address: wallet.address,
                stake: min_stake * BigUint::from(i as u64 + 1),
            })
        })
        .collect()
}
