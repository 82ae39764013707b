pub mod buffer;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod store;
mod sync;
pub mod telemetry;
pub mod types;

pub use buffer::{
    Chunk, ChunkPool, ChunkQueue, FREE_QUEUE, PENDING_QUEUE, Payload, PoolMetricsSnapshot,
    QueueMetricsSnapshot,
};
pub use crate::core::{WriterState, WriterStats};
pub use error::PipeBufError;
pub use pipeline::{BackingConfig, PipeBuffer, PipeBufferConfig, RunReport};
pub use store::{BackingStore, MemoryStore, SpillStore};
pub use telemetry::{NoopSink, TelemetryEvent, TelemetrySink, TransferProgressEvent};
pub use types::{BackingMode, ChunkRole, Disposition, Result};
