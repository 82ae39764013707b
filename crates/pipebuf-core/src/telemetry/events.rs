use std::time::Duration;

use crate::pipeline::RunReport;
use crate::types::{BackingMode, Disposition};

/// Emitted by the writer after each data chunk has been written.
#[derive(Debug, Clone)]
pub struct TransferProgressEvent {
    pub mode: BackingMode,
    pub elapsed: Duration,
    pub chunk_capacity: usize,
    /// Chunks currently allocated (memory blocks or outstanding spill files).
    pub chunks_allocated: usize,
    /// Bytes held by the backing store.
    pub buffered_bytes: u64,
    /// Chunks queued behind the one just written.
    pub pending_chunks: usize,
    pub chunks_written: u64,
    pub bytes_written: u64,
    pub disposition: Disposition,
}

#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    Progress(TransferProgressEvent),
    Completed(RunReport),
    /// The writer hit a fatal error and is tearing the pipeline down.
    WriterFailed { message: String },
}

/// Receiver of pipeline events; the writer thread owns it for the whole run.
pub trait TelemetrySink: Send {
    fn on_event(&mut self, event: TelemetryEvent);
}

impl<F> TelemetrySink for F
where
    F: FnMut(TelemetryEvent) + Send,
{
    fn on_event(&mut self, event: TelemetryEvent) {
        self(event)
    }
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn on_event(&mut self, _event: TelemetryEvent) {}
}
