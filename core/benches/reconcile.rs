use accel_gzip_core::crc::{crc32, CrcReconciler};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn bench_reconcile(c: &mut Criterion) {
    // Length chosen so the tail is non-empty for every block size below.
    let data: Vec<u8> = (0..(4 * 1024 * 1024 + 13))
        .map(|i: usize| ((i * 17 + 31) % 256) as u8)
        .collect();

    let mut group = c.benchmark_group("crc");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("single-pass", |b| b.iter(|| crc32(black_box(&data))));

    for block in [16usize, 4096] {
        let r = CrcReconciler::new(block);
        let partial = crc32(&data[..r.aligned_len(data.len())]);
        group.bench_function(format!("reconcile-tail-{block}"), |b| {
            b.iter(|| r.reconcile(black_box(partial), black_box(&data)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reconcile);
criterion_main!(benches);
