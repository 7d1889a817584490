// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - TRANSACTIONS
//
// Value transfers and contract calls with a canonical SHA3-256 identity.
// - Hash covers: from, to, value, gas price, gas limit, nonce, payload, timestamp
// - Lifecycle: Pending → Confirmed | Failed
// - Shard routing: SHA-256(recipient)[0..8] big-endian mod shard count
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::codec;
use crate::{now_millis, MIN_ADDRESS_LEN};
use dml_crypto::CryptoError;
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

/// Base cost of any transaction.
pub const TX_BASE_GAS: u64 = 21_000;
/// Cost per payload byte.
pub const TX_DATA_GAS_PER_BYTE: u64 = 68;
/// Surcharge when `to` is empty (contract creation).
pub const TX_CREATE_GAS: u64 = 32_000;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SignatureScheme {
    /// Verified cryptographically against the transaction hash.
    Ed25519,
    /// Structural check only (non-empty hex key and signature).
    Lattice,
    HashBased,
    Multivariate,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TransactionSignature {
    pub scheme: SignatureScheme,
    /// Hex-encoded public key.
    pub public_key: String,
    /// Hex-encoded signature bytes.
    pub signature: String,
}

impl TransactionSignature {
    fn is_well_formed(&self) -> bool {
        let hex_ok = |s: &str| !s.is_empty() && hex::decode(s).is_ok();
        hex_ok(&self.public_key) && hex_ok(&self.signature)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Transaction {
    pub hash: String,
    pub from: String,
    pub to: String,
    #[serde(with = "codec::decimal")]
    pub value: BigUint,
    #[serde(with = "codec::decimal")]
    pub gas_price: BigUint,
    pub gas_limit: u64,
    #[serde(default)]
    pub gas_used: u64,
    pub nonce: u64,
    #[serde(with = "codec::hex_bytes_opt", default)]
    pub payload: Option<Vec<u8>>,
    /// Unix milliseconds.
    pub timestamp: u64,
    #[serde(default)]
    pub signature: Option<TransactionSignature>,
    pub status: TxStatus,
    /// Set by routing; not part of the hash.
    #[serde(default)]
    pub shard_id: Option<u32>,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub contract_address: Option<String>,
}

/// Length-prefixed field feed, so `("ab","c")` and `("a","bc")` hash apart.
fn put(hasher: &mut Sha3_256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

/// Shard owning `address` among `shard_count` shards.
///
/// Pure function of the address: SHA-256, first 8 bytes big-endian, modulo.
pub fn shard_of(address: &str, shard_count: u32) -> u32 {
    if shard_count == 0 {
        return 0;
    }
    let digest = dml_crypto::sha256_bytes(address.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(head) % shard_count as u64) as u32
}

impl Transaction {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        value: BigUint,
        gas_price: BigUint,
        gas_limit: u64,
        nonce: u64,
        payload: Option<Vec<u8>>,
    ) -> Self {
        let mut tx = Transaction {
            hash: String::new(),
            from: from.into(),
            to: to.into(),
            value,
            gas_price,
            gas_limit,
            gas_used: 0,
            nonce,
            payload,
            timestamp: now_millis(),
            signature: None,
            status: TxStatus::Pending,
            shard_id: None,
            block_number: None,
            block_hash: None,
            contract_address: None,
        };
        tx.hash = tx.calculate_hash();
        tx
    }

    /// Pin the creation time (replay, fixtures) and refresh the hash.
    /// Any existing signature no longer covers the new hash.
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self.hash = self.calculate_hash();
        self
    }

    pub fn calculate_hash(&self) -> String {
        let mut hasher = Sha3_256::new();
        put(&mut hasher, self.from.as_bytes());
        put(&mut hasher, self.to.as_bytes());
        put(&mut hasher, &self.value.to_bytes_be());
        put(&mut hasher, &self.gas_price.to_bytes_be());
        hasher.update(self.gas_limit.to_be_bytes());
        hasher.update(self.nonce.to_be_bytes());
        put(&mut hasher, self.payload.as_deref().unwrap_or_default());
        hasher.update(self.timestamp.to_be_bytes());
        hex::encode(hasher.finalize())
    }

    /// Sign the canonical hash with an Ed25519 secret key.
    pub fn sign(&mut self, secret_key: &[u8], public_key: &[u8]) -> Result<(), CryptoError> {
        let sig = dml_crypto::sign_message(self.hash.as_bytes(), secret_key)?;
        self.signature = Some(TransactionSignature {
            scheme: SignatureScheme::Ed25519,
            public_key: hex::encode(public_key),
            signature: hex::encode(sig),
        });
        Ok(())
    }

    /// Attach a signature produced elsewhere (any scheme).
    pub fn attach_signature(&mut self, signature: TransactionSignature) {
        self.signature = Some(signature);
    }

    pub fn verify_signature(&self) -> bool {
        let Some(sig) = &self.signature else {
            return false;
        };
        if !sig.is_well_formed() {
            return false;
        }
        match sig.scheme {
            SignatureScheme::Ed25519 => {
                let pk = hex::decode(&sig.public_key).unwrap_or_default();
                let raw = hex::decode(&sig.signature).unwrap_or_default();
                dml_crypto::verify_signature(self.hash.as_bytes(), &raw, &pk)
            }
            SignatureScheme::Lattice | SignatureScheme::HashBased | SignatureScheme::Multivariate => {
                true
            }
        }
    }

    /// Every violated invariant, in check order. Empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.hash != self.calculate_hash() {
            errors.push("Hash does not match transaction contents".to_string());
        }
        if self.from.len() < MIN_ADDRESS_LEN {
            errors.push("Invalid sender address".to_string());
        }
        if self.to.len() < MIN_ADDRESS_LEN {
            errors.push("Invalid recipient address".to_string());
        }
        if self.gas_price.is_zero() {
            errors.push("Gas price must be positive".to_string());
        }
        if self.gas_limit == 0 {
            errors.push("Gas limit must be positive".to_string());
        }
        let intrinsic = self.intrinsic_gas();
        if self.gas_limit > 0 && intrinsic > self.gas_limit {
            errors.push(format!(
                "Intrinsic gas {} exceeds gas limit {}",
                intrinsic, self.gas_limit
            ));
        }
        if self.gas_used > self.gas_limit {
            errors.push(format!(
                "Gas used {} exceeds gas limit {}",
                self.gas_used, self.gas_limit
            ));
        }
        match &self.signature {
            None => errors.push("Missing signature".to_string()),
            Some(_) if !self.verify_signature() => errors.push("Invalid signature".to_string()),
            Some(_) => {}
        }

        errors
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// gas used × gas price.
    pub fn fee(&self) -> BigUint {
        &self.gas_price * BigUint::from(self.gas_used)
    }

    /// Intrinsic gas: base + per payload byte, plus creation surcharge when `to` is empty.
    pub fn intrinsic_gas(&self) -> u64 {
        let data_len = self.payload.as_ref().map_or(0, |p| p.len() as u64);
        let mut gas = TX_BASE_GAS.saturating_add(data_len.saturating_mul(TX_DATA_GAS_PER_BYTE));
        if self.to.is_empty() {
            gas = gas.saturating_add(TX_CREATE_GAS);
        }
        gas
    }

    pub fn shard_id_for(&self, shard_count: u32) -> u32 {
        shard_of(&self.to, shard_count)
    }

    pub fn is_cross_shard(&self, shard_count: u32) -> bool {
        shard_of(&self.from, shard_count) != shard_of(&self.to, shard_count)
    }

    pub fn confirm(&mut self, block_number: u64, block_hash: &str) {
        self.status = TxStatus::Confirmed;
        self.block_number = Some(block_number);
        self.block_hash = Some(block_hash.to_string());
    }

    pub fn mark_failed(&mut self) {
        self.status = TxStatus::Failed;
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
