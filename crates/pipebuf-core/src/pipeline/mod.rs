use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Instant;

use crate::buffer::{ChunkPool, ChunkQueue, PENDING_QUEUE};
use crate::core::{WriterOutput, spawn_writer};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::types::Result;

mod producer;
pub mod types;

use producer::Producer;
pub use types::{
    BackingConfig, DEFAULT_MAX_CHUNKS, DEFAULT_MEMORY_CHUNK_SIZE, DEFAULT_SPILL_CHUNK_SIZE,
    DEFAULT_SPILL_PREFIX, PipeBufferConfig, RunReport,
};

/// One buffered transfer from a reader to a writer.
///
/// The calling thread reads input into chunks and queues them; a dedicated
/// writer thread drains them to the output in the order they were read. The
/// pool decides whether a written chunk is recycled or retired, which bounds
/// memory in [`BackingMode::Memory`](crate::BackingMode::Memory) and keeps disk
/// usage proportional to the backlog in
/// [`BackingMode::Spill`](crate::BackingMode::Spill).
///
/// # Example
/// ```
/// use pipebuf_core::{NoopSink, PipeBuffer, PipeBufferConfig};
///
/// # fn main() -> pipebuf_core::Result<()> {
/// let buffer = PipeBuffer::new(PipeBufferConfig::memory_with(4, 2))?;
/// let (output, report) = buffer.run(&b"ABCDEFGH"[..], Vec::new(), NoopSink)?;
///
/// assert_eq!(output, b"ABCDEFGH");
/// assert_eq!(report.data_chunks, 2);
/// assert_eq!(report.final_chunk_len, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PipeBuffer {
    config: PipeBufferConfig,
    pool: Arc<ChunkPool>,
    pending: Arc<ChunkQueue>,
}

impl PipeBuffer {
    pub fn new(config: PipeBufferConfig) -> Result<Self> {
        config.validate()?;
        let pool = ChunkPool::from_config(&config.backing);
        Ok(Self {
            config,
            pool: Arc::new(pool),
            pending: Arc::new(ChunkQueue::new(PENDING_QUEUE)),
        })
    }

    pub fn config(&self) -> &PipeBufferConfig {
        &self.config
    }

    pub fn pool(&self) -> &ChunkPool {
        &self.pool
    }

    pub fn pending_queue(&self) -> &ChunkQueue {
        &self.pending
    }

    /// Copies `input` to `output` through the buffer and returns the output
    /// once the writer has flushed the end-of-stream chunk.
    ///
    /// `sink` lives on the writer thread and receives a progress event after
    /// every data chunk, then [`TelemetryEvent::Completed`] on success.
    ///
    /// # Errors
    /// A read failure stops the producer and lets the writer drain what was
    /// already queued. A write failure closes both queues and is reported to
    /// `sink` as [`TelemetryEvent::WriterFailed`] before it is returned. In
    /// either case the error returned is the root cause, not the queue
    /// teardown it triggered on the other thread.
    pub fn run<R, W, S>(self, mut input: R, output: W, sink: S) -> Result<(W, RunReport)>
    where
        R: Read,
        W: Write + Send + 'static,
        S: TelemetrySink + 'static,
    {
        let started_at = Instant::now();
        tracing::debug!(
            mode = self.config.mode().label(),
            chunk_capacity = self.pool.chunk_capacity(),
            "starting pipe buffer run"
        );

        let writer = spawn_writer(
            Arc::clone(&self.pool),
            Arc::clone(&self.pending),
            output,
            sink,
            started_at,
        )?;

        let produced = Producer::new(&self.pool, &self.pending).run(&mut input);
        if let Err(error) = &produced {
            if !error.is_queue_closed() {
                tracing::warn!(error = %error, "input failed; draining queued chunks");
            }
            self.pending.close();
        }

        let written = writer.join();
        let (produced, WriterOutput {
            output,
            mut sink,
            stats,
        }) = match (produced, written) {
            (Ok(produced), Ok(written)) => (produced, written),
            (Err(error), Ok(_)) | (Ok(_), Err(error)) => return Err(error),
            (Err(read_error), Err(write_error)) => {
                return Err(if read_error.is_queue_closed() {
                    write_error
                } else {
                    read_error
                });
            }
        };

        let pool_metrics = self.pool.metrics();
        let report = RunReport {
            mode: self.pool.mode(),
            chunk_capacity: self.pool.chunk_capacity(),
            bytes_read: produced.bytes_read,
            bytes_written: stats.bytes_written,
            data_chunks: produced.data_chunks,
            final_chunk_len: produced.final_chunk_len,
            peak_chunks_allocated: pool_metrics.peak_allocated,
            chunks_recycled: pool_metrics.recycled,
            chunks_retired: pool_metrics.retired,
            elapsed: started_at.elapsed(),
        };
        debug_assert_eq!(report.bytes_read, report.bytes_written);

        tracing::info!(
            mode = report.mode.label(),
            bytes = report.bytes_written,
            data_chunks = report.data_chunks,
            peak_chunks = report.peak_chunks_allocated,
            "pipe buffer run complete"
        );
        sink.on_event(TelemetryEvent::Completed(report.clone()));
        Ok((output, report))
    }
}
