pub mod chunk;
pub mod pool;
pub mod queue;

pub use chunk::{Chunk, Payload, read_until_full};
pub use pool::{ChunkPool, PoolMetricsSnapshot};
pub use queue::{ChunkQueue, FREE_QUEUE, PENDING_QUEUE, QueueMetricsSnapshot};
