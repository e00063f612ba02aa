use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rencfs::{crypto, VolumeKeys};

fn bench_block_decode(c: &mut Criterion) {
    let keys = VolumeKeys {
        cipher_key: [7u8; 32],
        iv_seed: [3u8; 16],
        mac_key: [9u8; 20],
    };
    let iv = [0u8; crypto::IV_LEN];
    let cipher_block = vec![0u8; 1024];

    c.bench_function("block_decode_1024b", |b| {
        b.iter(|| crypto::block_decode(&keys, black_box(&iv), black_box(&cipher_block)))
    });
    c.bench_function("mac64_1016b_payload", |b| {
        b.iter(|| crypto::mac64(&keys, black_box(&cipher_block[8..]), 0))
    });
}

criterion_group!(benches, bench_block_decode);
criterion_main!(benches);
