use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::buffer::Chunk;
use crate::pipeline::BackingConfig;
use crate::store::{BackingStore, MemoryStore, SpillStore};
use crate::telemetry;
use crate::telemetry::tags;
use crate::types::{BackingMode, Disposition, Result};

/// Governs the chunk lifecycle for one run.
///
/// The pool hands chunks to the producer, moves their bytes in and out of the
/// configured [`BackingStore`], and decides after each write whether a chunk is
/// recycled or retired.
///
/// # Example
/// ```
/// use pipebuf_core::ChunkPool;
///
/// # fn main() -> pipebuf_core::Result<()> {
/// let pool = ChunkPool::memory(4, 1);
/// let mut chunk = pool.acquire()?;
/// pool.fill(&mut chunk, &mut &b"ABCD"[..])?;
///
/// let mut out = Vec::new();
/// pool.drain(&mut chunk, &mut out)?;
/// pool.release(chunk)?;
/// assert_eq!(out, b"ABCD");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ChunkPool {
    store: Box<dyn BackingStore>,
    metrics: PoolMetricsInner,
}

impl ChunkPool {
    /// Wraps an arbitrary backing store.
    pub fn new(store: impl BackingStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            metrics: PoolMetricsInner::default(),
        }
    }

    /// Builds the store selected by `config`.
    pub fn from_config(config: &BackingConfig) -> Self {
        match config {
            BackingConfig::Memory {
                chunk_size,
                max_chunks,
            } => Self::memory(*chunk_size, *max_chunks),
            BackingConfig::Spill {
                chunk_size,
                spill_dir,
                file_prefix,
            } => Self::spill(spill_dir.clone(), file_prefix.clone(), *chunk_size),
        }
    }

    /// Memory-resident pool of at most `max_chunks` chunks.
    pub fn memory(chunk_size: usize, max_chunks: usize) -> Self {
        Self::new(MemoryStore::new(chunk_size, max_chunks))
    }

    /// Disk-spilled pool placing one file per chunk in `spill_dir`.
    pub fn spill(
        spill_dir: impl Into<std::path::PathBuf>,
        file_prefix: impl Into<String>,
        chunk_size: usize,
    ) -> Self {
        Self::new(SpillStore::new(spill_dir, file_prefix, chunk_size))
    }

    pub fn mode(&self) -> BackingMode {
        self.store.mode()
    }

    pub fn chunk_capacity(&self) -> usize {
        self.store.chunk_capacity()
    }

    pub fn store(&self) -> &dyn BackingStore {
        self.store.as_ref()
    }

    /// Returns an empty chunk, blocking while a memory pool is exhausted.
    pub fn acquire(&self) -> Result<Chunk> {
        let chunk = self.store.acquire()?;
        self.metrics.acquired.fetch_add(1, Ordering::Relaxed);
        let allocated = self.store.allocated();
        self.metrics
            .peak_allocated
            .fetch_max(allocated, Ordering::Relaxed);
        telemetry::set_gauge(
            tags::METRIC_POOL_BUFFERED_BYTES,
            self.store.buffered_bytes(),
            &[("subsystem", "pool"), ("op", "acquire")],
        );
        Ok(chunk)
    }

    /// Fills `chunk` from `input`; returns `true` at end of input.
    pub fn fill<R: Read>(&self, chunk: &mut Chunk, input: &mut R) -> Result<bool> {
        self.store.fill(chunk, input)
    }

    /// Writes the chunk's bytes to `output` and returns the count written.
    pub fn drain<W: Write>(&self, chunk: &mut Chunk, output: &mut W) -> Result<u64> {
        self.store.drain(chunk, output)
    }

    /// Recycles or retires a chunk after it has been written.
    pub fn release(&self, chunk: Chunk) -> Result<Disposition> {
        let disposition = self.store.release(chunk)?;
        let counter = match disposition {
            Disposition::Recycled => &self.metrics.recycled,
            Disposition::Released => &self.metrics.released,
            Disposition::Retired => &self.metrics.retired,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        telemetry::set_gauge(
            tags::METRIC_POOL_BUFFERED_BYTES,
            self.store.buffered_bytes(),
            &[("subsystem", "pool"), ("op", "release")],
        );
        Ok(disposition)
    }

    /// Bytes currently held by the store.
    pub fn buffered_bytes(&self) -> u64 {
        self.store.buffered_bytes()
    }

    /// Chunks currently allocated by the store.
    pub fn allocated(&self) -> usize {
        self.store.allocated()
    }

    /// Wakes a producer blocked in [`acquire`](Self::acquire) with an error.
    pub fn close(&self) {
        self.store.close();
    }

    /// Returns a snapshot of the pool counters.
    pub fn metrics(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            acquired: self.metrics.acquired.load(Ordering::Relaxed),
            recycled: self.metrics.recycled.load(Ordering::Relaxed),
            released: self.metrics.released.load(Ordering::Relaxed),
            retired: self.metrics.retired.load(Ordering::Relaxed),
            peak_allocated: self.metrics.peak_allocated.load(Ordering::Relaxed),
        }
    }
}

/// A snapshot of chunk pool counters at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolMetricsSnapshot {
    /// Chunks handed to the producer.
    pub acquired: usize,
    /// Chunks returned to the free queue.
    pub recycled: usize,
    /// Memory chunks freed at end of stream.
    pub released: usize,
    /// Spill chunks discarded after use.
    pub retired: usize,
    /// Highest number of chunks allocated at once.
    pub peak_allocated: usize,
}

#[derive(Debug, Default)]
struct PoolMetricsInner {
    acquired: AtomicUsize,
    recycled: AtomicUsize,
    released: AtomicUsize,
    retired: AtomicUsize,
    peak_allocated: AtomicUsize,
}
