// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PROPERTY-BASED TESTS — dml-healing
//
// BFT arithmetic, checkpoint lookup and fork resolution over arbitrary inputs.
// Run: cargo test --release -p dml-healing --test prop_healing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use dml_core::Block;
use dml_crypto::generate_keypair_from_seed;
use dml_healing::{Branch, ByzantineFaultTolerance, ForkResolver, ForkStrategy, StateRecoveryManager};
use proptest::prelude::*;

fn branch(genesis: &Block, len: usize, validator: &str, salt: u64) -> Vec<Block> {
    let mut out = vec![genesis.clone()];
    for i in 0..len {
        let prev = out[i].hash.clone();
        out.push(Block::new(i as u64 + 1, prev, validator, 0, 30_000_000, 10 + i as u64 + salt));
    }
    out
}

proptest! {
    /// f is the largest value with 3f < n, and a quorum never exceeds n.
    #[test]
    fn prop_bft_bounds(n in 1usize..10_000) {
        let bft = ByzantineFaultTolerance::new(n);
        let f = bft.max_faulty();
        prop_assert!(3 * f < n);
        prop_assert!(3 * (f + 1) >= n);
        prop_assert!(bft.quorum_threshold() <= n);
    }

    /// The nearest checkpoint is the greatest retained height ≤ h.
    #[test]
    fn prop_nearest_checkpoint(
        heights in prop::collection::btree_set(1u64..10_000, 1..12),
        query in 0u64..12_000,
    ) {
        let kp = generate_keypair_from_seed(&[1u8; 32]).unwrap();
        let mut m = StateRecoveryManager::with_keypair(100, 64, kp);
        for h in &heights {
            m.create_checkpoint(*h, "root", vec![]).unwrap();
        }
        let expected = heights.range(..=query).next_back().copied();
        prop_assert_eq!(m.find_nearest_checkpoint(query).map(|c| c.block_number), expected);
    }

    /// Longest chain always picks the branch with more blocks, ties to the first.
    #[test]
    fn prop_longest_chain(a in 1usize..12, b in 1usize..12) {
        let genesis = Block::new(0, "0".repeat(64), "0xgenesis-valid", 0, 30_000_000, 1);
        let mut r = ForkResolver::new(ForkStrategy::LongestChain);
        let fork = r
            .detect_fork_between(&branch(&genesis, a, "0xvalidator-aaaa", 0), &branch(&genesis, b, "0xvalidator-bbbb", 1))
            .unwrap();
        let expected = if a >= b { Branch::First } else { Branch::Second };
        prop_assert_eq!(r.resolve_fork(&fork.id).unwrap(), expected);
    }
}
