//! Benchmarks for the NDEF Text codec.
//!
//! The decode path runs on every tag arrival, so it is worth keeping an eye
//! on; encode only runs in write mode.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tapdeck_ndef::{decode_text, encode_text, Alignment};

fn bench_decode(c: &mut Criterion) {
    let short = encode_text("system:snes", Alignment::Page).unwrap();
    let long = encode_text(&"x".repeat(250), Alignment::Block).unwrap();

    // Worst case: a full Mifare data area with no message at all
    let empty = vec![0x00u8; 720];

    c.bench_function("decode_short", |b| {
        b.iter(|| decode_text(black_box(&short)))
    });
    c.bench_function("decode_long", |b| b.iter(|| decode_text(black_box(&long))));
    c.bench_function("decode_empty_memory", |b| {
        b.iter(|| decode_text(black_box(&empty)))
    });
}

fn bench_encode(c: &mut Criterion) {
    c.bench_function("encode_short", |b| {
        b.iter(|| encode_text(black_box("system:snes"), Alignment::Page))
    });
}

criterion_group!(benches, bench_decode, bench_encode);
criterion_main!(benches);
