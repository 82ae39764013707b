use std::io::Write;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::buffer::{ChunkPool, ChunkQueue};
use crate::error::PipeBufError;
use crate::telemetry::{
    self, TelemetryEvent, TelemetrySink, TransferProgressEvent, profile, tags,
};
use crate::types::{Disposition, Result};

#[cfg(feature = "profiling")]
const PROFILE_TAG_STACK_WRITER: [&str; 2] = [tags::TAG_SYSTEM, tags::TAG_WRITER];

/// Name given to the dedicated writer thread.
pub const WRITER_THREAD_NAME: &str = "pipebuf-writer";

/// Lifecycle of the writer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriterState {
    #[default]
    Running,
    /// End-of-stream chunk dequeued and being written.
    Draining,
    /// End-of-stream chunk written and released; the loop has exited.
    Terminated,
}

/// Counters collected by the writer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriterStats {
    pub state: WriterState,
    /// Chunks written, including the end-of-stream chunk.
    pub chunks_written: u64,
    pub data_chunks: u64,
    pub bytes_written: u64,
    pub final_chunk_len: usize,
}

/// What the writer thread hands back after a successful run.
pub struct WriterOutput<W, S> {
    pub output: W,
    pub sink: S,
    pub stats: WriterStats,
}

/// Handle to the spawned writer thread.
pub struct WriterHandle<W, S> {
    handle: JoinHandle<Result<WriterOutput<W, S>>>,
}

impl<W, S> WriterHandle<W, S> {
    /// Waits for the writer to reach its terminal state.
    pub fn join(self) -> Result<WriterOutput<W, S>> {
        match self.handle.join() {
            Ok(result) => result,
            Err(payload) => {
                let details = if let Some(message) = payload.downcast_ref::<&str>() {
                    (*message).to_string()
                } else if let Some(message) = payload.downcast_ref::<String>() {
                    message.clone()
                } else {
                    "unknown panic payload".to_string()
                };
                Err(PipeBufError::WriterPanicked(details))
            }
        }
    }
}

/// Spawns the writer thread that drains `pending` into `output`.
///
/// The thread runs until it writes an end-of-stream chunk or hits a fatal
/// error. On error it closes the pool and the pending queue so the producer
/// cannot block forever, and reports [`TelemetryEvent::WriterFailed`] unless the
/// failure was only the producer tearing the pending queue down.
pub fn spawn_writer<W, S>(
    pool: Arc<ChunkPool>,
    pending: Arc<ChunkQueue>,
    output: W,
    sink: S,
    started_at: Instant,
) -> Result<WriterHandle<W, S>>
where
    W: Write + Send + 'static,
    S: TelemetrySink + 'static,
{
    let handle = thread::Builder::new()
        .name(WRITER_THREAD_NAME.to_string())
        .spawn(move || {
            let mut writer = ChunkWriter {
                pool,
                pending,
                output,
                sink,
                started_at,
                stats: WriterStats::default(),
            };
            match writer.run() {
                Ok(()) => Ok(WriterOutput {
                    output: writer.output,
                    sink: writer.sink,
                    stats: writer.stats,
                }),
                Err(error) => {
                    writer.abort(&error);
                    Err(error)
                }
            }
        })
        .map_err(PipeBufError::ThreadSpawn)?;

    Ok(WriterHandle { handle })
}

struct ChunkWriter<W, S> {
    pool: Arc<ChunkPool>,
    pending: Arc<ChunkQueue>,
    output: W,
    sink: S,
    started_at: Instant,
    stats: WriterStats,
}

impl<W, S> ChunkWriter<W, S>
where
    W: Write,
    S: TelemetrySink,
{
    fn run(&mut self) -> Result<()> {
        loop {
            let mut chunk = self.pending.dequeue_blocking()?;
            let end_of_stream = chunk.is_end_of_stream();
            if end_of_stream {
                self.stats.state = WriterState::Draining;
            }

            let started_at = Instant::now();
            let written = self.pool.drain(&mut chunk, &mut self.output)?;
            self.record_drain(written, started_at);

            self.stats.chunks_written += 1;
            self.stats.bytes_written += written;
            if end_of_stream {
                self.stats.final_chunk_len = written as usize;
            } else {
                self.stats.data_chunks += 1;
            }

            let disposition = self.pool.release(chunk)?;
            if end_of_stream {
                self.output.flush()?;
                self.stats.state = WriterState::Terminated;
                tracing::debug!(
                    chunks_written = self.stats.chunks_written,
                    bytes_written = self.stats.bytes_written,
                    "writer reached end of stream"
                );
                return Ok(());
            }

            self.report_progress(disposition);
        }
    }

    fn record_drain(&self, written: u64, started_at: Instant) {
        let elapsed_us = profile::elapsed_us(started_at);
        telemetry::increment_counter(
            tags::METRIC_WRITER_CHUNK_COUNT,
            1,
            &[("subsystem", "writer"), ("op", "drain")],
        );
        telemetry::increment_counter(
            tags::METRIC_WRITER_BYTES_WRITTEN,
            written,
            &[("subsystem", "writer"), ("op", "drain")],
        );
        telemetry::record_histogram(
            tags::METRIC_WRITER_DRAIN_LATENCY_US,
            elapsed_us,
            &[("subsystem", "writer"), ("op", "drain")],
        );
        #[cfg(feature = "profiling")]
        profile::event(
            tags::PROFILE_WRITER,
            &PROFILE_TAG_STACK_WRITER,
            "drain",
            "ok",
            elapsed_us,
            "chunk written to output",
        );
    }

    fn report_progress(&mut self, disposition: Disposition) {
        let pending_chunks = self.pending.len();
        telemetry::set_gauge(
            tags::METRIC_PENDING_QUEUE_DEPTH,
            pending_chunks as u64,
            &[("subsystem", "writer"), ("op", "progress")],
        );
        self.sink
            .on_event(TelemetryEvent::Progress(TransferProgressEvent {
                mode: self.pool.mode(),
                elapsed: self.started_at.elapsed(),
                chunk_capacity: self.pool.chunk_capacity(),
                chunks_allocated: self.pool.allocated(),
                buffered_bytes: self.pool.buffered_bytes(),
                pending_chunks,
                chunks_written: self.stats.chunks_written,
                bytes_written: self.stats.bytes_written,
                disposition,
            }));
    }

    fn abort(&mut self, error: &PipeBufError) {
        self.pool.close();
        self.pending.close();
        if error.is_queue_closed() {
            tracing::debug!("pending queue closed by the producer; writer exiting");
            return;
        }

        tracing::error!(error = %error, "writer failed; tearing down the pipeline");
        self.sink.on_event(TelemetryEvent::WriterFailed {
            message: error.to_string(),
        });
    }
}
