// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PROPERTY-BASED TESTS — dml-consensus
//
// Selection, voting power and slashing invariants over arbitrary registries.
// Run: cargo test --release -p dml-consensus --test prop_consensus
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use dml_consensus::{ConsensusConfig, ConsensusEngine, Validator};
use num_bigint::BigUint;
use num_traits::Zero;
use proptest::prelude::*;

fn engine_from(stakes: &[u64]) -> ConsensusEngine {
    let mut e = ConsensusEngine::new(ConsensusConfig {
        min_stake: BigUint::from(1u32),
        ..ConsensusConfig::default()
    });
    for (i, s) in stakes.iter().enumerate() {
        e.register_validator(Validator::new(format!("0xvalidator-{i:04}"), BigUint::from(*s)))
            .unwrap();
    }
    e
}

// ─────────────────────────────────────────────────────────────────
// VOTING POWER
// ─────────────────────────────────────────────────────────────────

proptest! {
    /// Voting power never exceeds 2× stake and is zero below reputation 50.
    #[test]
    fn prop_voting_power_bounds(stake in 0u64..u64::MAX, rep in 0u32..=200) {
        let v = Validator::new("0xvalidator-x", BigUint::from(stake)).with_reputation(rep);
        let vp = v.voting_power();
        prop_assert!(vp <= BigUint::from(stake) * 2u32);
        if rep < 50 {
            prop_assert!(vp.is_zero());
        }
    }

    /// Voting power is monotone in reputation for a fixed stake.
    #[test]
    fn prop_voting_power_monotone(stake in 1u64..1_000_000_000, rep in 50u32..200) {
        let lo = Validator::new("0xv", BigUint::from(stake)).with_reputation(rep).voting_power();
        let hi = Validator::new("0xv", BigUint::from(stake)).with_reputation(rep + 1).voting_power();
        prop_assert!(hi >= lo);
    }
}

// ─────────────────────────────────────────────────────────────────
// SELECTION
// ─────────────────────────────────────────────────────────────────

proptest! {
    /// Same inputs → same proposer; the proposer is always eligible.
    #[test]
    fn prop_selection_deterministic(
        stakes in proptest::collection::vec(1u64..1_000_000, 1..12),
        prev in "[0-9a-f]{64}",
        height in any::<u64>(),
    ) {
        let e = engine_from(&stakes);
        let a = e.select_validator(&prev, height).unwrap().address.clone();
        let b = e.select_validator(&prev, height).unwrap().address.clone();
        prop_assert_eq!(&a, &b);
        prop_assert!(e.get_validator(&a).unwrap().can_propose());
    }

    /// Slashed-out validators are never selected.
    #[test]
    fn prop_slashed_out_never_selected(
        stakes in proptest::collection::vec(10u64..1_000_000, 2..8),
        height in 0u64..1_000,
    ) {
        let mut e = engine_from(&stakes);
        for _ in 0..3 {
            e.slash_validator("0xvalidator-0000", "prop").unwrap();
        }
        let chosen = e.select_validator("prev", height).unwrap();
        prop_assert_ne!(chosen.address.as_str(), "0xvalidator-0000");
    }

    /// Each slash removes exactly a tenth of stake (rounded down).
    #[test]
    fn prop_slash_removes_tenth(stake in 1u64..u64::MAX) {
        let mut e = engine_from(&[stake]);
        let removed = e.slash_validator("0xvalidator-0000", "prop").unwrap();
        prop_assert_eq!(removed, BigUint::from(stake / 10));
        prop_assert_eq!(
            e.get_validator("0xvalidator-0000").unwrap().stake.clone(),
            BigUint::from(stake - stake / 10)
        );
    }
}
