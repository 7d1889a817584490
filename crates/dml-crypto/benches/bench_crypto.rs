// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BENCHMARK SUITE — dml-crypto
//
// Every transaction and checkpoint goes through sign+verify, every block and
// Merkle node through SHA3-256.
// Run: cargo bench -p dml-crypto
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dml_crypto::{generate_keypair, generate_keypair_from_seed, sha3_hex, sign_message, verify_signature};

// ─────────────────────────────────────────────────────────────────
// KEY GENERATION
// ─────────────────────────────────────────────────────────────────

fn bench_keygen(c: &mut Criterion) {
    c.bench_function("crypto/generate_keypair", |b| {
        b.iter(|| black_box(generate_keypair()))
    });
    let seed = [42u8; 64];
    c.bench_function("crypto/generate_keypair_from_seed", |b| {
        b.iter(|| black_box(generate_keypair_from_seed(&seed)))
    });
}

// ─────────────────────────────────────────────────────────────────
// SIGNATURES
// ─────────────────────────────────────────────────────────────────

fn bench_sign_verify(c: &mut Criterion) {
    let kp = generate_keypair();
    let mut group = c.benchmark_group("crypto/sign_verify");
    for size in [32usize, 256, 4096] {
        let msg = vec![0xABu8; size];
        let sig = sign_message(&msg, &kp.secret_key).unwrap();
        group.bench_with_input(BenchmarkId::new("sign", size), &msg, |b, m| {
            b.iter(|| black_box(sign_message(m, &kp.secret_key)))
        });
        group.bench_with_input(BenchmarkId::new("verify", size), &msg, |b, m| {
            b.iter(|| black_box(verify_signature(m, &sig, &kp.public_key)))
        });
    }
    group.finish();
}

fn bench_sha3(c: &mut Criterion) {
    let data = vec![7u8; 1024];
    c.bench_function("crypto/sha3_hex 1KiB", |b| b.iter(|| black_box(sha3_hex(&data))));
}

criterion_group!(benches, bench_keygen, bench_sign_verify, bench_sha3);
criterion_main!(benches);
