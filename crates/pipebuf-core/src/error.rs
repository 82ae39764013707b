use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipeBufError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to allocate {bytes} bytes for a chunk payload")]
    Allocation { bytes: usize },
    #[error("failed to spawn writer thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
    #[error("{queue} queue closed")]
    QueueClosed { queue: &'static str },
    #[error("{queue} queue corrupted: {detail}")]
    QueueCorrupted {
        queue: &'static str,
        detail: &'static str,
    },
    #[error("chunk payload mismatch: {0}")]
    PayloadMismatch(&'static str),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("writer thread panicked: {0}")]
    WriterPanicked(String),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<PipeBufError>,
    },
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl PipeBufError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True when the error only reports that the other half of the pipeline tore
    /// down a queue, as opposed to being a root cause.
    pub fn is_queue_closed(&self) -> bool {
        match self {
            Self::QueueClosed { .. } => true,
            Self::Context { source, .. } => source.is_queue_closed(),
            _ => false,
        }
    }
}
