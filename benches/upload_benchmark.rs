//! Upload benchmarks

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use simhub_client::upload::{ChunkedReader, PartPlan, ProgressTracker};

const MIB: usize = 1024 * 1024;

fn benchmark_chunked_reader(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("chunked_reader");

    let data = Bytes::from(vec![0u8; 32 * MIB]);
    for part_size in [MIB, 5 * MIB, 16 * MIB] {
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_function(format!("{}_mib_parts", part_size / MIB), |b| {
            b.to_async(&runtime).iter(|| async {
                let plan = PartPlan::new(data.len() as u64, part_size as u64).unwrap();
                let mut reader = ChunkedReader::new(&data[..], plan);
                while let Some(part) = reader.next_part().await.unwrap() {
                    black_box(part.data.len());
                }
            });
        });
    }

    group.finish();
}

fn benchmark_progress_tracker(c: &mut Criterion) {
    c.bench_function("progress_advance", |b| {
        let tracker = ProgressTracker::new(u64::MAX, None);
        b.iter(|| black_box(tracker.advance(black_box(1))));
    });
}

criterion_group!(benches, benchmark_chunked_reader, benchmark_progress_tracker);
criterion_main!(benches);
