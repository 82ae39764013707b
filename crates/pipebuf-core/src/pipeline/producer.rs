use std::io::Read;
use std::time::Instant;

use crate::buffer::{ChunkPool, ChunkQueue, PENDING_QUEUE};
use crate::error::PipeBufError;
use crate::telemetry::{self, profile, tags};
use crate::types::Result;

#[cfg(feature = "profiling")]
const PROFILE_TAG_STACK_PRODUCER: [&str; 2] = [tags::TAG_SYSTEM, tags::TAG_PRODUCER];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ProducerStats {
    pub(crate) bytes_read: u64,
    pub(crate) data_chunks: u64,
    pub(crate) final_chunk_len: usize,
}

/// Fills chunks from the input and hands them to the pending queue in order.
pub(crate) struct Producer<'a> {
    pool: &'a ChunkPool,
    pending: &'a ChunkQueue,
}

impl<'a> Producer<'a> {
    pub(crate) fn new(pool: &'a ChunkPool, pending: &'a ChunkQueue) -> Self {
        Self { pool, pending }
    }

    /// Runs until the input is exhausted and the end-of-stream chunk is
    /// enqueued, or until the writer tears the pending queue down.
    pub(crate) fn run<R: Read>(&self, input: &mut R) -> Result<ProducerStats> {
        let mut stats = ProducerStats::default();
        loop {
            let started_at = Instant::now();
            let mut chunk = self.pool.acquire()?;
            let end_of_stream = self.pool.fill(&mut chunk, input)?;
            chunk.seal(end_of_stream);

            let len = chunk.len();
            stats.bytes_read += len as u64;
            self.record_fill(len, started_at);

            self.pending.enqueue(chunk);
            if end_of_stream {
                stats.final_chunk_len = len;
                tracing::debug!(
                    bytes_read = stats.bytes_read,
                    data_chunks = stats.data_chunks,
                    final_chunk_len = len,
                    "input exhausted; end-of-stream chunk queued"
                );
                return Ok(stats);
            }

            stats.data_chunks += 1;
            if self.pending.is_closed() {
                return Err(PipeBufError::QueueClosed {
                    queue: PENDING_QUEUE,
                });
            }
        }
    }

    fn record_fill(&self, len: usize, started_at: Instant) {
        let _elapsed_us = profile::elapsed_us(started_at);
        telemetry::increment_counter(
            tags::METRIC_PRODUCER_CHUNK_COUNT,
            1,
            &[("subsystem", "producer"), ("op", "fill")],
        );
        telemetry::increment_counter(
            tags::METRIC_PRODUCER_BYTES_READ,
            len as u64,
            &[("subsystem", "producer"), ("op", "fill")],
        );
        #[cfg(feature = "profiling")]
        profile::event(
            tags::PROFILE_PRODUCER,
            &PROFILE_TAG_STACK_PRODUCER,
            "fill",
            "ok",
            _elapsed_us,
            "chunk filled from input",
        );
    }
}
