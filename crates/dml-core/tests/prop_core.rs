// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PROPERTY-BASED TESTS — dml-core
//
// Invariants that must hold for every input proptest can think of:
// hash determinism, Merkle inclusion, chain linkage, exact amount encoding.
// Run: cargo test --release -p dml-core --test prop_core
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use dml_core::merkle::hash_leaf;
use dml_core::{shard_of, Blockchain, ChainConfig, MerkleTree, Transaction};
use dml_crypto::generate_keypair_from_seed;
use num_bigint::BigUint;
use proptest::prelude::*;

fn arb_value() -> impl Strategy<Value = BigUint> {
    proptest::collection::vec(any::<u8>(), 0..40).prop_map(|b| BigUint::from_bytes_be(&b))
}

fn arb_tx() -> impl Strategy<Value = Transaction> {
    (
        "0x[a-f0-9]{10,40}",
        "0x[a-f0-9]{10,40}",
        arb_value(),
        1u64..1_000_000,
        21_000u64..100_000,
        any::<u64>(),
        proptest::option::of(proptest::collection::vec(any::<u8>(), 0..64)),
        1_600_000_000_000u64..2_000_000_000_000,
    )
        .prop_map(|(from, to, value, price, limit, nonce, payload, ts)| {
            Transaction::new(from, to, value, BigUint::from(price), limit, nonce, payload)
                .with_timestamp(ts)
        })
}

// ─────────────────────────────────────────────────────────────────
// TRANSACTION PROPERTIES
// ─────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Hash is a pure function of the canonical fields.
    #[test]
    fn prop_tx_hash_deterministic(tx in arb_tx()) {
        prop_assert_eq!(tx.calculate_hash(), tx.hash.clone());
        prop_assert_eq!(tx.clone().with_timestamp(tx.timestamp).hash, tx.hash);
    }

    /// Changing the nonce always changes the hash.
    #[test]
    fn prop_tx_nonce_changes_hash(tx in arb_tx()) {
        let mut other = tx.clone();
        other.nonce = tx.nonce.wrapping_add(1);
        prop_assert_ne!(other.calculate_hash(), tx.hash);
    }

    /// Big values survive JSON exactly.
    #[test]
    fn prop_tx_json_exact(tx in arb_tx()) {
        let back = Transaction::from_json(&tx.to_json().unwrap()).unwrap();
        prop_assert_eq!(back, tx);
    }

    /// Routing is always within range.
    #[test]
    fn prop_shard_in_range(addr in ".{0,64}", shards in 1u32..64) {
        prop_assert!(shard_of(&addr, shards) < shards);
    }
}

// ─────────────────────────────────────────────────────────────────
// MERKLE PROPERTIES
// ─────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Every leaf of every non-empty list proves inclusion.
    #[test]
    fn prop_merkle_inclusion(
        items in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..16), 1..40),
        pick in any::<usize>(),
    ) {
        let tree = MerkleTree::new(&items);
        let i = pick % items.len();
        let proof = tree.proof(i).unwrap();
        prop_assert!(MerkleTree::verify_proof(&hash_leaf(&items[i]), &proof, tree.root(), i));
    }

    /// Changing one item changes the root and breaks its old proof.
    #[test]
    fn prop_merkle_mutation_detected(
        items in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 1..16), 1..40),
        pick in any::<usize>(),
    ) {
        let tree = MerkleTree::new(&items);
        let i = pick % items.len();
        let proof = tree.proof(i).unwrap();

        let mut mutated = items.clone();
        mutated[i].push(0xFF);
        let mutated_tree = MerkleTree::new(&mutated);
        prop_assert_ne!(mutated_tree.root(), tree.root());
        prop_assert!(!MerkleTree::verify_proof(&hash_leaf(&mutated[i]), &proof, tree.root(), i));
    }
}

// ─────────────────────────────────────────────────────────────────
// CHAIN PROPERTIES
// ─────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// N mined blocks → valid chain of N+1 with matching account views.
    #[test]
    fn prop_chain_grows_valid(values in proptest::collection::vec(1u64..1_000, 1..8)) {
        let kp = generate_keypair_from_seed(&[5u8; 32]).unwrap();
        let mut chain = Blockchain::new(ChainConfig {
            shard_count: 1,
            genesis_timestamp: Some(1),
            ..ChainConfig::default()
        });
        for (n, v) in values.iter().enumerate() {
            let mut tx = Transaction::new(
                "0xsender-prop-0001",
                "0xrecipient-prop-02",
                BigUint::from(*v),
                BigUint::from(1u32),
                21_000,
                n as u64,
                None,
            );
            tx.sign(&kp.secret_key, &kp.public_key).unwrap();
            chain.add_transaction(tx).unwrap();
            prop_assert!(chain.mine_next("0xvalidator-prop", 0).unwrap().is_some());
        }
        prop_assert_eq!(chain.len(), values.len() + 1);
        prop_assert!(chain.is_valid());
        prop_assert_eq!(chain.balance("0xrecipient-prop-02"), chain.balance_by_replay("0xrecipient-prop-02"));
        prop_assert_eq!(chain.nonce("0xsender-prop-0001"), values.len() as u64);
    }
}
