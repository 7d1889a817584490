// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PROPERTY-BASED TESTS — dml-crypto
//
// Run: cargo test --release -p dml-crypto --test prop_crypto
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use dml_crypto::{
    generate_keypair_from_seed, public_key_to_address, sha3_hex, sign_message, validate_address,
    verify_signature,
};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Same seed → same key pair, always.
    #[test]
    fn prop_seeded_keygen_deterministic(seed in proptest::collection::vec(any::<u8>(), 32..96)) {
        let a = generate_keypair_from_seed(&seed).unwrap();
        let b = generate_keypair_from_seed(&seed).unwrap();
        prop_assert_eq!(&a.public_key, &b.public_key);
        prop_assert!(validate_address(&public_key_to_address(&a.public_key)));
    }

    /// A signature only verifies for the exact message it was made over.
    #[test]
    fn prop_signature_binds_message(
        msg in proptest::collection::vec(any::<u8>(), 1..256),
        flip in any::<usize>(),
    ) {
        let kp = generate_keypair_from_seed(&[3u8; 32]).unwrap();
        let sig = sign_message(&msg, &kp.secret_key).unwrap();
        prop_assert!(verify_signature(&msg, &sig, &kp.public_key));

        let mut tampered = msg.clone();
        let i = flip % tampered.len();
        tampered[i] ^= 0x01;
        prop_assert!(!verify_signature(&tampered, &sig, &kp.public_key));
    }

    /// SHA3 output is always 64 lowercase hex chars.
    #[test]
    fn prop_sha3_shape(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let h = sha3_hex(&data);
        prop_assert_eq!(h.len(), 64);
        prop_assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
