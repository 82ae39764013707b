use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::buffer::queue::Node;
use crate::error::PipeBufError;
use crate::types::{ChunkRole, Result};

/// Backing storage for a chunk's bytes.
#[derive(Debug)]
pub enum Payload {
    /// Owned block of exactly `capacity` bytes.
    Memory(Box<[u8]>),
    /// Spill file holding up to `capacity` bytes.
    Spill(PathBuf),
}

/// A fixed-capacity unit of buffered data moving through the pipeline.
///
/// A chunk is always owned by exactly one party: the free queue, the pending
/// queue, the producer or the writer. Moving it between them is a plain Rust
/// move, so ownership can never be duplicated.
#[derive(Debug)]
pub struct Chunk {
    role: ChunkRole,
    capacity: usize,
    length: usize,
    payload: Payload,
    // Queue node detached together with this chunk. It becomes the next tail
    // sentinel of whichever queue the chunk enters, so steady-state recycling
    // allocates nothing.
    shell: Option<Arc<Node>>,
}

impl Chunk {
    /// Allocates a memory-backed chunk of `capacity` zeroed bytes.
    pub fn in_memory(capacity: usize) -> Result<Self> {
        let mut block = Vec::new();
        block
            .try_reserve_exact(capacity)
            .map_err(|_| PipeBufError::Allocation { bytes: capacity })?;
        block.resize(capacity, 0);
        Ok(Self {
            role: ChunkRole::Data,
            capacity,
            length: 0,
            payload: Payload::Memory(block.into_boxed_slice()),
            shell: None,
        })
    }

    /// Creates a spill-backed chunk whose bytes will live at `path`.
    pub fn spilled(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            role: ChunkRole::Data,
            capacity,
            length: 0,
            payload: Payload::Spill(path.into()),
            shell: None,
        }
    }

    pub fn role(&self) -> ChunkRole {
        self.role
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.role == ChunkRole::EndOfStream
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of valid bytes currently held.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn is_full(&self) -> bool {
        self.length == self.capacity
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Valid bytes of a memory-backed chunk.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Memory(block) => Some(&block[..self.length]),
            Payload::Spill(_) => None,
        }
    }

    /// Spill path of a file-backed chunk.
    pub fn spill_path(&self) -> Option<&Path> {
        match &self.payload {
            Payload::Memory(_) => None,
            Payload::Spill(path) => Some(path),
        }
    }

    /// Marks the chunk as the last one of the stream, or as ordinary data.
    pub fn seal(&mut self, end_of_stream: bool) {
        self.role = if end_of_stream {
            ChunkRole::EndOfStream
        } else {
            ChunkRole::Data
        };
    }

    /// Reads from `reader` into the unused tail of a memory payload until the
    /// chunk is full or the reader reports end of input.
    ///
    /// Returns `true` when end of input was reached.
    pub fn fill_from<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<bool> {
        let Payload::Memory(block) = &mut self.payload else {
            return Err(PipeBufError::PayloadMismatch(
                "fill_from requires a memory payload",
            ));
        };
        let (filled, eof) = read_until_full(reader, &mut block[self.length..])?;
        self.length += filled;
        Ok(eof)
    }

    /// Clears the valid length so the payload can be refilled.
    pub(crate) fn reset(&mut self) {
        self.length = 0;
        self.role = ChunkRole::Data;
    }

    pub(crate) fn set_len(&mut self, length: usize) {
        debug_assert!(length <= self.capacity);
        self.length = length.min(self.capacity);
    }

    pub(crate) fn take_shell(&mut self) -> Option<Arc<Node>> {
        self.shell.take()
    }

    pub(crate) fn attach_shell(&mut self, shell: Arc<Node>) {
        self.shell = Some(shell);
    }
}

/// Reads into `buf` until it is full or `reader` returns a zero-length read.
///
/// Partial reads simply advance the fill position and interrupted reads are
/// retried. Returns the number of bytes filled and whether end of input was hit.
pub fn read_until_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<(usize, bool)> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok((filled, true)),
            Ok(read) => filled += read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
    Ok((filled, false))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Hands out at most `step` bytes per read call.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let take = self.step.min(buf.len()).min(self.data.len());
            buf[..take].copy_from_slice(&self.data[..take]);
            self.data = &self.data[take..];
            Ok(take)
        }
    }

    #[test]
    fn partial_reads_accumulate_until_full() -> Result<()> {
        let mut chunk = Chunk::in_memory(4)?;
        let mut reader = Trickle {
            data: b"ABCDEF",
            step: 1,
        };

        let eof = chunk.fill_from(&mut reader)?;
        assert!(!eof);
        assert!(chunk.is_full());
        assert_eq!(chunk.as_bytes(), Some(&b"ABCD"[..]));
        Ok(())
    }

    #[test]
    fn short_input_reports_end_of_stream() -> Result<()> {
        let mut chunk = Chunk::in_memory(8)?;
        let eof = chunk.fill_from(&mut Cursor::new(b"EF".to_vec()))?;
        assert!(eof);
        assert_eq!(chunk.len(), 2);
        assert_eq!(chunk.as_bytes(), Some(&b"EF"[..]));
        Ok(())
    }

    #[test]
    fn reset_hides_previous_contents() -> Result<()> {
        let mut chunk = Chunk::in_memory(4)?;
        chunk.fill_from(&mut Cursor::new(b"WXYZ".to_vec()))?;
        chunk.seal(true);
        chunk.reset();

        assert_eq!(chunk.role(), ChunkRole::Data);
        assert!(chunk.is_empty());
        assert_eq!(chunk.as_bytes(), Some(&b""[..]));
        Ok(())
    }

    #[test]
    fn spill_chunk_rejects_direct_fill() {
        let mut chunk = Chunk::spilled("unused.buf", 4);
        let result = chunk.fill_from(&mut Cursor::new(b"AB".to_vec()));
        assert!(matches!(result, Err(PipeBufError::PayloadMismatch(_))));
        assert!(chunk.as_bytes().is_none());
        assert_eq!(chunk.spill_path(), Some(Path::new("unused.buf")));
    }

    #[test]
    fn interrupted_reads_are_retried() -> io::Result<()> {
        struct Flaky {
            interrupted: bool,
        }
        impl Read for Flaky {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if !self.interrupted {
                    self.interrupted = true;
                    return Err(io::Error::from(io::ErrorKind::Interrupted));
                }
                buf[0] = b'!';
                Ok(1)
            }
        }

        let mut buf = [0u8; 2];
        let (filled, eof) = read_until_full(&mut Flaky { interrupted: false }, &mut buf)?;
        assert_eq!((filled, eof), (2, false));
        assert_eq!(&buf, b"!!");
        Ok(())
    }
}
