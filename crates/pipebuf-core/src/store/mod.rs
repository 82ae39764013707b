use std::fmt::Debug;
use std::io::{Read, Write};

use crate::buffer::Chunk;
use crate::types::{BackingMode, Disposition, Result};

pub mod memory;
pub mod spill;

pub use memory::MemoryStore;
pub use spill::SpillStore;

/// Strategy that owns where chunk payloads live.
///
/// The producer calls [`acquire`](BackingStore::acquire) and
/// [`fill`](BackingStore::fill); the writer calls
/// [`drain`](BackingStore::drain) and [`release`](BackingStore::release).
/// Each method is only ever called from one of the two pipeline threads, but
/// implementations must still be `Sync` because both threads share the store.
pub trait BackingStore: Send + Sync + Debug {
    fn mode(&self) -> BackingMode;

    /// Fixed payload size of every chunk handed out by this store.
    fn chunk_capacity(&self) -> usize;

    /// Returns an empty chunk owned by the caller, blocking if the store is
    /// at its limit and nothing has been recycled yet.
    fn acquire(&self) -> Result<Chunk>;

    /// Fills `chunk` from `input` until it is full or input ends, and makes
    /// the bytes durable in the chunk's payload. Returns `true` at end of input.
    fn fill(&self, chunk: &mut Chunk, input: &mut dyn Read) -> Result<bool>;

    /// Writes the chunk's bytes to `output` in full and returns how many were written.
    fn drain(&self, chunk: &mut Chunk, output: &mut dyn Write) -> Result<u64>;

    /// Recycles or retires a chunk the writer has finished with.
    fn release(&self, chunk: Chunk) -> Result<Disposition>;

    /// Bytes currently held by the store (resident blocks or outstanding spill files).
    fn buffered_bytes(&self) -> u64;

    /// Chunks currently allocated by the store.
    fn allocated(&self) -> usize;

    /// Wakes a producer blocked in [`acquire`](BackingStore::acquire) with an error.
    fn close(&self);
}
