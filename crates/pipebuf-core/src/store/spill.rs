use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use crate::buffer::queue::FREE_QUEUE;
use crate::buffer::{Chunk, read_until_full};
use crate::error::PipeBufError;
use crate::store::BackingStore;
use crate::sync::lock_unpoisoned;
use crate::telemetry;
use crate::telemetry::profile;
use crate::telemetry::tags;
use crate::types::{BackingMode, Disposition, Result};

// Shared by every store in the process so two runs spilling into the same
// directory never pick the same file name.
static NEXT_SPILL_SEQ: AtomicU64 = AtomicU64::new(0);

#[cfg(feature = "profiling")]
const PROFILE_TAG_STACK_SPILL: [&str; 2] = [tags::TAG_SYSTEM, tags::TAG_SPILL];

/// Disk-spilled chunks: every filled chunk is written to its own file and the
/// file is deleted as soon as the writer has read it back.
///
/// There is no cap and no reuse. Each store owns two staging blocks, one for
/// the producer and one for the writer, allocated on first use.
#[derive(Debug)]
pub struct SpillStore {
    dir: PathBuf,
    prefix: String,
    pid: u32,
    chunk_capacity: usize,
    created: AtomicU64,
    outstanding: AtomicUsize,
    closed: AtomicBool,
    ingest: Mutex<Vec<u8>>,
    egress: Mutex<Vec<u8>>,
}

impl SpillStore {
    /// Creates a store that places spill files named `<prefix>.<pid>.<seq>` in `dir`.
    ///
    /// `seq` is unique within the process, not just within this store.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, chunk_capacity: usize) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            pid: std::process::id(),
            chunk_capacity,
            created: AtomicU64::new(0),
            outstanding: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            ingest: Mutex::new(Vec::new()),
            egress: Mutex::new(Vec::new()),
        }
    }

    pub fn spill_dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the spill file for sequence number `seq`.
    pub fn spill_path(&self, seq: u64) -> PathBuf {
        self.dir.join(format!("{}.{}.{seq}", self.prefix, self.pid))
    }

    /// Number of spill chunks handed out by this store so far.
    pub fn chunks_created(&self) -> u64 {
        self.created.load(Ordering::Acquire)
    }
}

impl BackingStore for SpillStore {
    fn mode(&self) -> BackingMode {
        BackingMode::Spill
    }

    fn chunk_capacity(&self) -> usize {
        self.chunk_capacity
    }

    fn acquire(&self) -> Result<Chunk> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PipeBufError::QueueClosed { queue: FREE_QUEUE });
        }

        let seq = NEXT_SPILL_SEQ.fetch_add(1, Ordering::Relaxed);
        self.created.fetch_add(1, Ordering::AcqRel);
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        telemetry::add_gauge(
            tags::METRIC_POOL_ALLOCATED_CHUNKS,
            1,
            &[("subsystem", "spill"), ("op", "acquire")],
        );
        telemetry::increment_counter(
            tags::METRIC_POOL_ACQUIRE_CREATED_COUNT,
            1,
            &[("subsystem", "pool"), ("op", "acquire"), ("result", "created")],
        );
        Ok(Chunk::spilled(self.spill_path(seq), self.chunk_capacity))
    }

    fn fill(&self, chunk: &mut Chunk, input: &mut dyn Read) -> Result<bool> {
        let path = chunk
            .spill_path()
            .ok_or(PipeBufError::PayloadMismatch(
                "spill store received a memory chunk",
            ))?
            .to_path_buf();

        let mut staging = lock_unpoisoned(&self.ingest);
        let block = staging_block(&mut staging, self.chunk_capacity)?;
        let (filled, eof) = read_until_full(input, block)?;

        let started_at = Instant::now();
        write_spill_file(&path, &block[..filled]).map_err(|error| {
            PipeBufError::from(error)
                .with_context(format!("failed to write spill file {}", path.display()))
        })?;
        chunk.set_len(filled);

        let elapsed_us = profile::elapsed_us(started_at);
        telemetry::increment_counter(
            tags::METRIC_SPILL_WRITE_COUNT,
            1,
            &[("subsystem", "spill"), ("op", "write")],
        );
        telemetry::record_histogram(
            tags::METRIC_SPILL_WRITE_LATENCY_US,
            elapsed_us,
            &[("subsystem", "spill"), ("op", "write")],
        );
        #[cfg(feature = "profiling")]
        profile::event(
            tags::PROFILE_SPILL,
            &PROFILE_TAG_STACK_SPILL,
            "write",
            "ok",
            elapsed_us,
            "spill file written",
        );
        Ok(eof)
    }

    fn drain(&self, chunk: &mut Chunk, output: &mut dyn Write) -> Result<u64> {
        let path = chunk
            .spill_path()
            .ok_or(PipeBufError::PayloadMismatch(
                "spill store received a memory chunk",
            ))?
            .to_path_buf();

        let mut staging = lock_unpoisoned(&self.egress);
        let block = staging_block(&mut staging, self.chunk_capacity)?;

        let started_at = Instant::now();
        let read = read_spill_file(&path, block).map_err(|error| {
            PipeBufError::from(error)
                .with_context(format!("failed to read spill file {}", path.display()))
        })?;
        fs::remove_file(&path).map_err(|error| {
            PipeBufError::from(error)
                .with_context(format!("failed to remove spill file {}", path.display()))
        })?;

        let elapsed_us = profile::elapsed_us(started_at);
        telemetry::increment_counter(
            tags::METRIC_SPILL_READ_COUNT,
            1,
            &[("subsystem", "spill"), ("op", "read")],
        );
        telemetry::record_histogram(
            tags::METRIC_SPILL_READ_LATENCY_US,
            elapsed_us,
            &[("subsystem", "spill"), ("op", "read")],
        );
        #[cfg(feature = "profiling")]
        profile::event(
            tags::PROFILE_SPILL,
            &PROFILE_TAG_STACK_SPILL,
            "read",
            "ok",
            elapsed_us,
            "spill file read back and removed",
        );

        if read != chunk.len() {
            tracing::warn!(
                path = %path.display(),
                expected = chunk.len(),
                actual = read,
                "spill file length differs from recorded chunk length"
            );
        }

        output.write_all(&block[..read])?;
        Ok(read as u64)
    }

    fn release(&self, chunk: Chunk) -> Result<Disposition> {
        drop(chunk);
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        telemetry::sub_gauge_saturating(
            tags::METRIC_POOL_ALLOCATED_CHUNKS,
            1,
            &[("subsystem", "spill"), ("op", "release")],
        );
        telemetry::increment_counter(
            tags::METRIC_POOL_RELEASE_RETIRED_COUNT,
            1,
            &[("subsystem", "pool"), ("op", "release"), ("result", "retired")],
        );
        Ok(Disposition::Retired)
    }

    fn buffered_bytes(&self) -> u64 {
        self.allocated() as u64 * self.chunk_capacity as u64
    }

    fn allocated(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Grows `staging` to `capacity` bytes on first use and returns the block.
fn staging_block(staging: &mut Vec<u8>, capacity: usize) -> Result<&mut [u8]> {
    if staging.len() < capacity {
        staging
            .try_reserve_exact(capacity - staging.len())
            .map_err(|_| PipeBufError::Allocation { bytes: capacity })?;
        staging.resize(capacity, 0);
    }
    Ok(&mut staging[..capacity])
}

fn write_spill_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path)?;
    file.write_all(bytes)
}

fn read_spill_file(path: &Path, block: &mut [u8]) -> std::io::Result<usize> {
    let mut file = File::open(path)?;
    let (read, _eof) = read_until_full(&mut file, block)?;
    Ok(read)
}
