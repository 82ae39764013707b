use serde::{Deserialize, Serialize};

use crate::error::PipeBufError;

pub type Result<T> = std::result::Result<T, PipeBufError>;

/// Where chunk payloads live while they wait for the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackingMode {
    /// Payloads are owned memory blocks, recycled through the free queue.
    Memory,
    /// Payloads are spill files, one per chunk, deleted after read-back.
    Spill,
}

impl BackingMode {
    /// Short label used by progress displays and metrics.
    pub fn label(self) -> &'static str {
        match self {
            Self::Memory => "mem",
            Self::Spill => "file",
        }
    }
}

/// Role of a node in a chunk queue.
///
/// Only `Data` and `EndOfStream` ever reach producer or writer code; the
/// sentinel roles are bookkeeping inside [`ChunkQueue`](crate::ChunkQueue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkRole {
    Data,
    EndOfStream,
    HeadSentinel,
    TailSentinel,
}

impl ChunkRole {
    /// Returns true for roles that carry a payload.
    pub fn carries_payload(self) -> bool {
        matches!(self, Self::Data | Self::EndOfStream)
    }
}

/// What the pool did with a chunk after the writer was done with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Payload went back to the free queue.
    Recycled,
    /// Payload was freed (memory mode end-of-stream chunk).
    Released,
    /// Spill chunk discarded after a single use.
    Retired,
}
