// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DIMENSIONAL LEDGER (DML) - MODULAR EXPONENTIATION PROOF
//
// Discrete-log flavoured placeholder proof. Everything is derived from public
// data, so it binds a block to its proposer but proves nothing about work or
// secrets.
//
// How it works:
// 1. challenge = H(block hash ‖ validator ‖ timestamp ‖ difficulty)
// 2. p = first probable prime at or above a seed H(challenge ‖ validator),
//    sized by difficulty (Miller–Rabin, bounded search)
// 3. g = 2 + challenge mod (p − 3),  x = H(block hash ‖ validator) mod (p − 1)
// 4. commitment = g^x mod p
// 5. response = H(challenge ‖ commitment ‖ validator)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use dml_core::proof::proof_challenge;
use dml_core::{Block, ConsensusProof, ProofAlgorithm, ProofError, ProofScheme};
use dml_crypto::sha3_hex_parts;
use num_bigint::BigUint;
use num_traits::{One, Zero};
use std::collections::BTreeMap;

/// Candidates tried before giving up on a prime.
pub const MAX_PRIME_SEARCH: u32 = 20_000;

const MR_BASES: [u32; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
const SMALL_PRIMES: [u32; 24] = [
    3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
];

/// Modulus size in bits for a difficulty level.
pub fn modulus_bits(difficulty: u32) -> u64 {
    (64 + 16 * difficulty as u64).min(256)
}

fn hex_to_int(hex_digest: &str) -> BigUint {
    BigUint::parse_bytes(hex_digest.as_bytes(), 16).unwrap_or_default()
}

/// Deterministic Miller–Rabin over fixed bases.
pub fn is_probable_prime(n: &BigUint) -> bool {
    let two = BigUint::from(2u32);
    if *n < two {
        return false;
    }
    for p in SMALL_PRIMES.iter().chain(std::iter::once(&2u32)) {
        let p = BigUint::from(*p);
        if *n == p {
            return true;
        }
        if (n % &p).is_zero() {
            return false;
        }
    }

    let n_minus_one = n - 1u32;
    let s = n_minus_one.trailing_zeros().unwrap_or(0);
    let d = &n_minus_one >> s;

    'bases: for a in MR_BASES {
        let a = BigUint::from(a);
        let mut x = a.modpow(&d, n);
        if x.is_one() || x == n_minus_one {
            continue;
        }
        for _ in 1..s {
            x = x.modpow(&two, n);
            if x == n_minus_one {
                continue 'bases;
            }
        }
        return false;
    }
    true
}

/// First probable prime ≥ the seed, forced to exactly `bits` bits and odd.
fn find_prime(seed: &BigUint, bits: u64) -> Result<BigUint, ProofError> {
    let mask = (BigUint::one() << bits) - 1u32;
    let top = BigUint::one() << (bits - 1);
    let mut candidate = (seed & &mask) | &top | BigUint::one();

    for _ in 0..MAX_PRIME_SEARCH {
        if is_probable_prime(&candidate) {
            return Ok(candidate);
        }
        candidate += 2u32;
    }
    Err(ProofError::SearchExhausted(MAX_PRIME_SEARCH))
}

#[derive(Debug, Clone)]
pub struct ModExpProofScheme {
    /// Minimum accepted difficulty, also the difficulty of generated proofs.
    pub difficulty: u32,
}

struct Witness {
    challenge: String,
    modulus: BigUint,
    generator: BigUint,
    commitment: BigUint,
    response: String,
}

impl ModExpProofScheme {
    pub fn new(difficulty: u32) -> Self {
        ModExpProofScheme { difficulty }
    }

    fn derive(&self, block: &Block, validator: &str, difficulty: u32) -> Result<Witness, ProofError> {
        if block.hash.is_empty() {
            return Err(ProofError::MissingBlockHash);
        }
        let challenge = proof_challenge(block, validator, difficulty);
        let seed = hex_to_int(&sha3_hex_parts(&[challenge.as_bytes(), validator.as_bytes()]));
        let modulus = find_prime(&seed, modulus_bits(difficulty))?;

        let generator = BigUint::from(2u32) + hex_to_int(&challenge) % (&modulus - 3u32);
        let exponent =
            hex_to_int(&sha3_hex_parts(&[block.hash.as_bytes(), validator.as_bytes()])) % (&modulus - 1u32);
        let commitment = generator.modpow(&exponent, &modulus);
        let response = sha3_hex_parts(&[
            challenge.as_bytes(),
            commitment.to_str_radix(10).as_bytes(),
            validator.as_bytes(),
        ]);

        Ok(Witness {
            challenge,
            modulus,
            generator,
            commitment,
            response,
        })
    }
}

impl ProofScheme for ModExpProofScheme {
    fn generate(&self, block: &Block, validator: &str) -> Result<ConsensusProof, ProofError> {
        let w = self.derive(block, validator, self.difficulty)?;
        let mut verification_data = BTreeMap::new();
        verification_data.insert("modulus".to_string(), w.modulus.to_str_radix(10));
        verification_data.insert("generator".to_string(), w.generator.to_str_radix(10));
        verification_data.insert("commitment".to_string(), w.commitment.to_str_radix(10));

        Ok(ConsensusProof {
            algorithm: ProofAlgorithm::DiscreteLog,
            challenge: w.challenge,
            response: w.response,
            verification_data,
            difficulty: self.difficulty,
        })
    }

    fn verify(&self, block: &Block, proof: &ConsensusProof, validator: &str) -> bool {
        if proof.algorithm != ProofAlgorithm::DiscreteLog || proof.difficulty < self.difficulty {
            return false;
        }
        let parse = |key: &str| {
            proof
                .verification_data
                .get(key)
                .and_then(|v| BigUint::parse_bytes(v.as_bytes(), 10))
        };
        let (Some(modulus), Some(commitment)) = (parse("modulus"), parse("commitment")) else {
            return false;
        };
        if commitment.is_zero() || commitment >= modulus {
            return false;
        }

        match self.derive(block, validator, proof.difficulty) {
            Ok(w) => {
                w.challenge == proof.challenge
                    && w.response == proof.response
                    && w.modulus == modulus
                    && w.commitment == commitment
                    && parse("generator").as_ref() == Some(&w.generator)
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> Block {
        Block::new(7, "ab".repeat(32), "0xvalidator-0001", 0, 30_000_000, 5_000)
    }

    #[test]
    fn test_miller_rabin_known_values() {
        for p in [2u64, 3, 5, 97, 7919, 1_000_000_007, 18_446_744_073_709_551_557] {
            assert!(is_probable_prime(&BigUint::from(p)), "{p}");
        }
        for c in [0u64, 1, 4, 91, 561, 1_000_000_008, 3_215_031_751] {
            assert!(!is_probable_prime(&BigUint::from(c)), "{c}");
        }
    }

    #[test]
    fn test_proof_round_trip() {
        let scheme = ModExpProofScheme::new(1);
        let b = block();
        let proof = scheme.generate(&b, "0xvalidator-0001").unwrap();
        assert_eq!(proof.algorithm, ProofAlgorithm::DiscreteLog);
        assert!(scheme.verify(&b, &proof, "0xvalidator-0001"));

        let modulus = BigUint::parse_bytes(proof.verification_data["modulus"].as_bytes(), 10).unwrap();
        assert_eq!(modulus.bits(), modulus_bits(1));
        assert!(is_probable_prime(&modulus));
    }

    #[test]
    fn test_proof_is_deterministic() {
        let scheme = ModExpProofScheme::new(2);
        let b = block();
        assert_eq!(
            scheme.generate(&b, "0xvalidator-0001").unwrap(),
            scheme.generate(&b, "0xvalidator-0001").unwrap()
        );
    }

    #[test]
    fn test_wrong_validator_or_block_rejected() {
        let scheme = ModExpProofScheme::new(1);
        let b = block();
        let proof = scheme.generate(&b, "0xvalidator-0001").unwrap();
        assert!(!scheme.verify(&b, &proof, "0xvalidator-0002"));

        let mut other = b.clone();
        other.timestamp += 1;
        other.hash = other.calculate_hash();
        assert!(!scheme.verify(&other, &proof, "0xvalidator-0001"));
    }

    #[test]
    fn test_tampered_witness_rejected() {
        let scheme = ModExpProofScheme::new(1);
        let b = block();
        let good = scheme.generate(&b, "0xvalidator-0001").unwrap();

        let mut forged = good.clone();
        forged.verification_data.insert("commitment".into(), "1".into());
        assert!(!scheme.verify(&b, &forged, "0xvalidator-0001"));

        let mut out_of_range = good.clone();
        let m = out_of_range.verification_data["modulus"].clone();
        out_of_range.verification_data.insert("commitment".into(), m);
        assert!(!scheme.verify(&b, &out_of_range, "0xvalidator-0001"));

        let mut no_data = good;
        no_data.verification_data.clear();
        assert!(!scheme.verify(&b, &no_data, "0xvalidator-0001"));
    }

    #[test]
    fn test_difficulty_floor() {
        let weak = ModExpProofScheme::new(1);
        let strict = ModExpProofScheme::new(2);
        let b = block();
        let proof = weak.generate(&b, "0xvalidator-0001").unwrap();
        assert!(!strict.verify(&b, &proof, "0xvalidator-0001"));
        // Stronger proofs satisfy weaker verifiers.
        let strong = strict.generate(&b, "0xvalidator-0001").unwrap();
        assert!(weak.verify(&b, &strong, "0xvalidator-0001"));
    }
}
