//! Criterion benchmarks for the hot paths of chainkit-wallet.
//!
//! Covers: coin selection over small and large UTXO pools, low-S
//! normalization and DER encoding.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chainkit_wallet::signature::{to_der, to_compact};
use chainkit_wallet::{select_utxos, UnspentOutput};

/// Deterministic pool of `n` outputs with spread-out amounts.
fn make_pool(n: usize) -> Vec<UnspentOutput> {
    (0..n)
        .map(|i| UnspentOutput {
            txid: format!("{i:064x}"),
            vout: (i % 4) as u32,
            amount: 1_000 + (i as u64 * 7_919) % 5_000_000,
            script_pubkey: vec![0x00, 0x14],
        })
        .collect()
}

fn bench_select_utxos(c: &mut Criterion) {
    let pool_10 = make_pool(10);
    let pool_1000 = make_pool(1000);

    c.bench_function("select_utxos_10_outputs", |b| {
        b.iter(|| select_utxos(black_box(&pool_10), 2_500_000, 1_500, Some(546)))
    });

    c.bench_function("select_utxos_1000_outputs", |b| {
        b.iter(|| select_utxos(black_box(&pool_1000), 250_000_000, 12_000, Some(546)))
    });

    c.bench_function("select_utxos_insufficient_1000_outputs", |b| {
        b.iter(|| select_utxos(black_box(&pool_1000), u64::MAX / 2, 0, None))
    });
}

fn bench_signature_normalization(c: &mut Criterion) {
    let high_s = hex::decode(
        "28ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276\
         98341627668089e51348fccfb4c7ff31c55912f2d2e47ef09652acf665fad3be",
    )
    .expect("valid hex");

    c.bench_function("signature_to_compact_low_s", |b| {
        b.iter(|| to_compact(black_box(&high_s)))
    });

    c.bench_function("signature_to_der", |b| b.iter(|| to_der(black_box(&high_s))));
}

criterion_group!(benches, bench_select_utxos, bench_signature_normalization);
criterion_main!(benches);
