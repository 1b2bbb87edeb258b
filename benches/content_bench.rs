use binedit::BinaryContent;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

fn bench_typing(c: &mut Criterion) {
    let mut group = c.benchmark_group("binary_content_typing");
    group.bench_function("sequential_insert", |b| {
        b.iter_batched(
            || BinaryContent::from_bytes(vec![0u8; 64 * 1024]),
            |mut content| {
                for i in 0..1024u64 {
                    content.insert((i % 256) as u8, 32 * 1024 + i).unwrap();
                }
                content.end_action();
            },
            BatchSize::SmallInput,
        );
    });
    group.bench_function("hex_overwrite", |b| {
        b.iter_batched(
            || BinaryContent::from_bytes(vec![0u8; 64 * 1024]),
            |mut content| {
                for i in 0..1024u64 {
                    content.overwrite_bits(0xA, 0, 4, i).unwrap();
                    content.overwrite_bits(0x5, 4, 4, i).unwrap();
                }
                content.end_action();
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

fn bench_fragmented_read(c: &mut Criterion) {
    let mut content = BinaryContent::from_bytes(vec![0u8; 1024 * 1024]);
    for i in 0..2048u64 {
        content.insert(vec![0xFF; 3], i * 512).unwrap();
    }
    let mut buffer = vec![0u8; 64 * 1024];

    c.bench_function("fragmented_read_64k", |b| {
        b.iter(|| content.get(&mut buffer, 128 * 1024).unwrap());
    });
}

criterion_group!(benches, bench_typing, bench_fragmented_read);
criterion_main!(benches);
