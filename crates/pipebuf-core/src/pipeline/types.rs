use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PipeBufError;
use crate::types::{BackingMode, Result};

const MIB: usize = 1024 * 1024;

/// Chunk size used by memory-resident pools.
pub const DEFAULT_MEMORY_CHUNK_SIZE: usize = 16 * MIB;
/// Maximum number of memory-resident chunks.
pub const DEFAULT_MAX_CHUNKS: usize = 128;
/// Chunk size used by disk-spilled pools.
pub const DEFAULT_SPILL_CHUNK_SIZE: usize = 512 * MIB;
/// File name prefix for spill files.
pub const DEFAULT_SPILL_PREFIX: &str = ".buf";

/// Backing-store selection and its fixed sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BackingConfig {
    /// Memory-resident chunks bounded by `max_chunks`.
    Memory { chunk_size: usize, max_chunks: usize },
    /// One spill file per chunk in `spill_dir`.
    Spill {
        chunk_size: usize,
        spill_dir: PathBuf,
        file_prefix: String,
    },
}

impl BackingConfig {
    pub fn mode(&self) -> BackingMode {
        match self {
            Self::Memory { .. } => BackingMode::Memory,
            Self::Spill { .. } => BackingMode::Spill,
        }
    }

    pub fn chunk_size(&self) -> usize {
        match self {
            Self::Memory { chunk_size, .. } | Self::Spill { chunk_size, .. } => *chunk_size,
        }
    }
}

/// Configuration for one [`PipeBuffer`](crate::PipeBuffer) run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipeBufferConfig {
    pub backing: BackingConfig,
}

impl PipeBufferConfig {
    /// Memory mode with the default 16 MiB × 128 budget.
    pub fn memory() -> Self {
        Self::memory_with(DEFAULT_MEMORY_CHUNK_SIZE, DEFAULT_MAX_CHUNKS)
    }

    pub fn memory_with(chunk_size: usize, max_chunks: usize) -> Self {
        Self {
            backing: BackingConfig::Memory {
                chunk_size,
                max_chunks,
            },
        }
    }

    /// File mode with 512 MiB chunks spilled into the working directory.
    pub fn spill() -> Self {
        Self::spill_with(DEFAULT_SPILL_CHUNK_SIZE, ".")
    }

    pub fn spill_with(chunk_size: usize, spill_dir: impl Into<PathBuf>) -> Self {
        Self {
            backing: BackingConfig::Spill {
                chunk_size,
                spill_dir: spill_dir.into(),
                file_prefix: DEFAULT_SPILL_PREFIX.to_string(),
            },
        }
    }

    /// Default configuration for `mode`.
    pub fn for_mode(mode: BackingMode) -> Self {
        match mode {
            BackingMode::Memory => Self::memory(),
            BackingMode::Spill => Self::spill(),
        }
    }

    pub fn mode(&self) -> BackingMode {
        self.backing.mode()
    }

    /// Rejects sizes that would make the pipeline unable to make progress.
    pub fn validate(&self) -> Result<()> {
        if self.backing.chunk_size() == 0 {
            return Err(PipeBufError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        match &self.backing {
            BackingConfig::Memory { max_chunks, .. } if *max_chunks == 0 => Err(
                PipeBufError::InvalidConfig("max_chunks must be greater than zero".to_string()),
            ),
            BackingConfig::Spill { file_prefix, .. } if file_prefix.is_empty() => Err(
                PipeBufError::InvalidConfig("file_prefix must not be empty".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

impl Default for PipeBufferConfig {
    fn default() -> Self {
        Self::memory()
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub mode: BackingMode,
    pub chunk_capacity: usize,
    pub bytes_read: u64,
    pub bytes_written: u64,
    /// Chunks enqueued before the end-of-stream chunk.
    pub data_chunks: u64,
    /// Length of the end-of-stream chunk.
    pub final_chunk_len: usize,
    pub peak_chunks_allocated: usize,
    pub chunks_recycled: usize,
    pub chunks_retired: usize,
    pub elapsed: Duration,
}

impl RunReport {
    /// Average output throughput in bytes per second.
    pub fn write_bps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.bytes_written as f64 / secs
        }
    }
}
