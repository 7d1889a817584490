// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - CRYPTOGRAPHY MODULE
//
// Hashing and signature primitives shared by every ledger crate.
// - SHA3-256 canonical hashes (blocks, transactions, Merkle nodes, checkpoints)
// - SHA-256 seeds (shard routing, validator selection)
// - Ed25519 key generation (random and deterministic from seed)
// - Message signing and verification
// - Address derivation (0x + 20 bytes of SHA3-256(pubkey))
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sha3::{Digest, Sha3_256};
use thiserror::Error;
use zeroize::Zeroize;

/// Ed25519 public key length in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Ed25519 signature length in bytes.
pub const SIGNATURE_LEN: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid key format")]
    InvalidKey,
    #[error("Seed must be at least 32 bytes, got {0}")]
    SeedTooShort(usize),
    #[error("Signature verification failed")]
    VerificationFailed,
}

// ─────────────────────────────────────────────────────────────────
// HASHING
// ─────────────────────────────────────────────────────────────────

/// SHA3-256 of `data`, lowercase hex.
pub fn sha3_hex(data: &[u8]) -> String {
    hex::encode(Sha3_256::digest(data))
}

/// SHA3-256 over several parts fed in order, lowercase hex.
pub fn sha3_hex_parts(parts: &[&[u8]]) -> String {
    let mut hasher = Sha3_256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// Raw SHA-256 digest.
pub fn sha256_bytes(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256_bytes(data))
}

// ─────────────────────────────────────────────────────────────────
// KEYS & SIGNATURES
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KeyPair {
    pub public_key: Vec<u8>,
    pub secret_key: Vec<u8>,
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

impl KeyPair {
    fn from_signing_key(sk: &SigningKey) -> Self {
        KeyPair {
            public_key: sk.verifying_key().to_bytes().to_vec(),
            secret_key: sk.to_bytes().to_vec(),
        }
    }

    pub fn address(&self) -> String {
        public_key_to_address(&self.public_key)
    }
}

/// Generate a fresh Ed25519 key pair from OS randomness.
pub fn generate_keypair() -> KeyPair {
    let mut secret: [u8; 32] = rand::random();
    let sk = SigningKey::from_bytes(&secret);
    secret.zeroize();
    KeyPair::from_signing_key(&sk)
}

/// Deterministic key pair from seed material.
///
/// derived = SHA-256(SHA-256("dml-ed25519-keygen-v1") || seed)
///
/// Same seed always yields the same key pair and address. Seeds shorter than
/// 32 bytes are rejected.
pub fn generate_keypair_from_seed(seed: &[u8]) -> Result<KeyPair, CryptoError> {
    if seed.len() < 32 {
        return Err(CryptoError::SeedTooShort(seed.len()));
    }

    let salt = Sha256::digest(b"dml-ed25519-keygen-v1");
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(seed);
    let mut derived: [u8; 32] = hasher.finalize().into();

    let sk = SigningKey::from_bytes(&derived);
    derived.zeroize();
    Ok(KeyPair::from_signing_key(&sk))
}

/// Rebuild a key pair from a 32-byte Ed25519 secret.
pub fn keypair_from_secret(secret_bytes: &[u8]) -> Result<KeyPair, CryptoError> {
    let secret: [u8; 32] = secret_bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey)?;
    Ok(KeyPair::from_signing_key(&SigningKey::from_bytes(&secret)))
}

pub fn sign_message(message: &[u8], secret_key_bytes: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let secret: [u8; 32] = secret_key_bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey)?;
    let sk = SigningKey::from_bytes(&secret);
    Ok(sk.sign(message).to_bytes().to_vec())
}

/// Verify an Ed25519 signature. Malformed keys or signatures verify as false.
pub fn verify_signature(message: &[u8], signature_bytes: &[u8], public_key_bytes: &[u8]) -> bool {
    let pk_array: [u8; PUBLIC_KEY_LEN] = match public_key_bytes.try_into() {
        Ok(a) => a,
        Err(_) => return false,
    };
    let vk = match VerifyingKey::from_bytes(&pk_array) {
        Ok(k) => k,
        Err(_) => return false,
    };
    let sig = match Signature::from_slice(signature_bytes) {
        Ok(s) => s,
        Err(_) => return false,
    };

    vk.verify(message, &sig).is_ok()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ADDRESS DERIVATION
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `0x` followed by the last 20 bytes of SHA3-256(public key), hex.
pub fn public_key_to_address(public_key_bytes: &[u8]) -> String {
    let digest = Sha3_256::digest(public_key_bytes);
    format!("0x{}", hex::encode(&digest[12..]))
}

/// Checks the `0x` + 40 hex character shape. There is no checksum.
pub fn validate_address(address: &str) -> bool {
    match address.strip_prefix("0x") {
        Some(body) => body.len() == 40 && body.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}
