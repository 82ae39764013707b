use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crate::buffer::queue::FREE_QUEUE;
use crate::buffer::{Chunk, ChunkQueue};
use crate::error::PipeBufError;
use crate::store::BackingStore;
use crate::telemetry;
use crate::telemetry::profile;
use crate::telemetry::tags;
use crate::types::{BackingMode, Disposition, Result};

#[cfg(feature = "profiling")]
const PROFILE_TAG_STACK_POOL: [&str; 2] = [tags::TAG_SYSTEM, tags::TAG_POOL];

/// Memory-resident chunks, at most `max_chunks` of them, recycled through a
/// free queue.
///
/// Acquisition reuses a recycled chunk when one is ready, grows the pool while
/// it is below the cap, and otherwise blocks until the writer recycles one.
#[derive(Debug)]
pub struct MemoryStore {
    free: ChunkQueue,
    chunk_capacity: usize,
    max_chunks: usize,
    allocated: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store. Payload blocks are allocated lazily on acquire.
    pub fn new(chunk_capacity: usize, max_chunks: usize) -> Self {
        Self {
            free: ChunkQueue::new(FREE_QUEUE),
            chunk_capacity,
            max_chunks,
            allocated: AtomicUsize::new(0),
        }
    }

    /// Upper bound on concurrently allocated chunks.
    pub fn max_chunks(&self) -> usize {
        self.max_chunks
    }

    /// Queue of recycled chunks waiting to be refilled.
    pub fn free_queue(&self) -> &ChunkQueue {
        &self.free
    }

    fn try_allocate(&self) -> Result<Option<Chunk>> {
        let max_chunks = self.max_chunks;
        let reserved = self
            .allocated
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < max_chunks).then_some(count + 1)
            });
        let Ok(previous) = reserved else {
            return Ok(None);
        };

        match Chunk::in_memory(self.chunk_capacity) {
            Ok(chunk) => {
                telemetry::set_gauge(
                    tags::METRIC_POOL_ALLOCATED_CHUNKS,
                    (previous + 1) as u64,
                    &[("subsystem", "pool"), ("op", "allocate")],
                );
                Ok(Some(chunk))
            }
            Err(error) => {
                self.allocated.fetch_sub(1, Ordering::AcqRel);
                Err(error)
            }
        }
    }

    fn record_acquire(&self, result: &'static str, started_at: Instant) {
        let metric = match result {
            "created" => tags::METRIC_POOL_ACQUIRE_CREATED_COUNT,
            _ => tags::METRIC_POOL_ACQUIRE_RECYCLED_COUNT,
        };
        telemetry::increment_counter(
            metric,
            1,
            &[("subsystem", "pool"), ("op", "acquire"), ("result", result)],
        );
        let elapsed_us = profile::elapsed_us(started_at);
        telemetry::record_histogram(
            tags::METRIC_POOL_ACQUIRE_LATENCY_US,
            elapsed_us,
            &[("subsystem", "pool"), ("op", "acquire")],
        );
        #[cfg(feature = "profiling")]
        profile::event(
            tags::PROFILE_POOL,
            &PROFILE_TAG_STACK_POOL,
            "acquire",
            result,
            elapsed_us,
            "chunk acquire completed",
        );
    }
}

impl BackingStore for MemoryStore {
    fn mode(&self) -> BackingMode {
        BackingMode::Memory
    }

    fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    fn acquire(&self) -> Result<Chunk> {
        let started_at = Instant::now();

        if let Some(mut chunk) = self.free.try_dequeue()? {
            chunk.reset();
            self.record_acquire("recycled", started_at);
            return Ok(chunk);
        }

        if let Some(chunk) = self.try_allocate()? {
            self.record_acquire("created", started_at);
            return Ok(chunk);
        }

        telemetry::increment_counter(
            tags::METRIC_POOL_ACQUIRE_BLOCKED_COUNT,
            1,
            &[("subsystem", "pool"), ("op", "acquire"), ("result", "blocked")],
        );
        tracing::trace!(
            allocated = self.allocated(),
            max_chunks = self.max_chunks,
            "chunk pool exhausted; waiting for the writer to recycle"
        );
        let mut chunk = self.free.dequeue_blocking()?;
        chunk.reset();
        self.record_acquire("recycled", started_at);
        Ok(chunk)
    }

    fn fill(&self, chunk: &mut Chunk, input: &mut dyn Read) -> Result<bool> {
        chunk.fill_from(input)
    }

    fn drain(&self, chunk: &mut Chunk, output: &mut dyn Write) -> Result<u64> {
        let bytes = chunk.as_bytes().ok_or(PipeBufError::PayloadMismatch(
            "memory store received a spill chunk",
        ))?;
        output.write_all(bytes)?;
        Ok(bytes.len() as u64)
    }

    fn release(&self, chunk: Chunk) -> Result<Disposition> {
        if chunk.is_end_of_stream() {
            self.allocated.fetch_sub(1, Ordering::AcqRel);
            drop(chunk);
            telemetry::sub_gauge_saturating(
                tags::METRIC_POOL_ALLOCATED_CHUNKS,
                1,
                &[("subsystem", "pool"), ("op", "release"), ("result", "released")],
            );
            return Ok(Disposition::Released);
        }

        self.free.enqueue(chunk);
        telemetry::increment_counter(
            tags::METRIC_POOL_RELEASE_RECYCLED_COUNT,
            1,
            &[("subsystem", "pool"), ("op", "release"), ("result", "recycled")],
        );
        Ok(Disposition::Recycled)
    }

    fn buffered_bytes(&self) -> u64 {
        self.allocated() as u64 * self.chunk_capacity as u64
    }

    fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.free.close();
    }
}
