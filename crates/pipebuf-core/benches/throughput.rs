use std::io;

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use pipebuf_core::{Chunk, ChunkQueue, NoopSink, PipeBuffer, PipeBufferConfig};

const INPUT_LEN: usize = 32 * 1024 * 1024;

fn bench_pipeline(c: &mut Criterion) {
    let input = vec![0x5Au8; INPUT_LEN];
    let mut group = c.benchmark_group("pipe_buffer");
    group.sample_size(10);
    group.throughput(Throughput::Bytes(input.len() as u64));

    for (label, chunk_size, max_chunks) in [
        ("memory_64k_x4", 64 * 1024, 4),
        ("memory_1m_x16", 1024 * 1024, 16),
    ] {
        group.bench_function(label, |b| {
            b.iter(|| -> pipebuf_core::Result<u64> {
                let buffer =
                    PipeBuffer::new(PipeBufferConfig::memory_with(chunk_size, max_chunks))?;
                let (_sink, report) = buffer.run(black_box(&input[..]), io::sink(), NoopSink)?;
                Ok(report.bytes_written)
            })
        });
    }

    let spill_dir = std::env::temp_dir();
    group.bench_function("spill_4m", |b| {
        b.iter(|| -> pipebuf_core::Result<u64> {
            let buffer =
                PipeBuffer::new(PipeBufferConfig::spill_with(4 * 1024 * 1024, &spill_dir))?;
            let (_sink, report) = buffer.run(black_box(&input[..]), io::sink(), NoopSink)?;
            Ok(report.bytes_written)
        })
    });

    group.finish();
}

fn bench_queue_round_trip(c: &mut Criterion) {
    let pending = ChunkQueue::new("pending");
    let free = ChunkQueue::new("free");
    let mut group = c.benchmark_group("chunk_queue");

    group.bench_function("pending_to_free_round_trip", |b| {
        b.iter(|| -> pipebuf_core::Result<()> {
            let chunk = Chunk::in_memory(black_box(64))?;
            pending.enqueue(chunk);
            let chunk = pending.dequeue_blocking()?;
            free.enqueue(chunk);
            black_box(free.dequeue_blocking()?);
            Ok(())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_pipeline, bench_queue_round_trip);
criterion_main!(benches);
