/// Profiling target for chunk pool operations.
pub const PROFILE_POOL: &str = "pipebuf.profile.pool";
/// Profiling target for spill file operations.
pub const PROFILE_SPILL: &str = "pipebuf.profile.spill";
/// Profiling target for the writer thread.
pub const PROFILE_WRITER: &str = "pipebuf.profile.writer";
/// Profiling target for the producer loop.
pub const PROFILE_PRODUCER: &str = "pipebuf.profile.producer";

/// Global system-level tag shared by all profiling events.
pub const TAG_SYSTEM: &str = "system";
/// Logical tag for chunk pool events.
pub const TAG_POOL: &str = "pool";
/// Logical tag for spill file events.
pub const TAG_SPILL: &str = "spill";
/// Logical tag for writer thread events.
pub const TAG_WRITER: &str = "writer";
/// Logical tag for producer loop events.
pub const TAG_PRODUCER: &str = "producer";

pub const METRIC_POOL_ACQUIRE_CREATED_COUNT: &str = "pipebuf.pool.acquire.created.count";
pub const METRIC_POOL_ACQUIRE_RECYCLED_COUNT: &str = "pipebuf.pool.acquire.recycled.count";
pub const METRIC_POOL_ACQUIRE_BLOCKED_COUNT: &str = "pipebuf.pool.acquire.blocked.count";
pub const METRIC_POOL_RELEASE_RECYCLED_COUNT: &str = "pipebuf.pool.release.recycled.count";
pub const METRIC_POOL_RELEASE_RETIRED_COUNT: &str = "pipebuf.pool.release.retired.count";
pub const METRIC_SPILL_WRITE_COUNT: &str = "pipebuf.spill.write.count";
pub const METRIC_SPILL_READ_COUNT: &str = "pipebuf.spill.read.count";
pub const METRIC_PRODUCER_CHUNK_COUNT: &str = "pipebuf.producer.chunk.count";
pub const METRIC_WRITER_CHUNK_COUNT: &str = "pipebuf.writer.chunk.count";

pub const METRIC_PRODUCER_BYTES_READ: &str = "pipebuf.producer.bytes_read";
pub const METRIC_WRITER_BYTES_WRITTEN: &str = "pipebuf.writer.bytes_written";

pub const METRIC_POOL_ACQUIRE_LATENCY_US: &str = "pipebuf.pool.acquire.latency_us";
pub const METRIC_SPILL_WRITE_LATENCY_US: &str = "pipebuf.spill.write.latency_us";
pub const METRIC_SPILL_READ_LATENCY_US: &str = "pipebuf.spill.read.latency_us";
pub const METRIC_WRITER_DRAIN_LATENCY_US: &str = "pipebuf.writer.drain.latency_us";

pub const METRIC_POOL_ALLOCATED_CHUNKS: &str = "pipebuf.pool.allocated.chunks";
pub const METRIC_POOL_BUFFERED_BYTES: &str = "pipebuf.pool.buffered_bytes";
pub const METRIC_PENDING_QUEUE_DEPTH: &str = "pipebuf.pending.queue.depth";
