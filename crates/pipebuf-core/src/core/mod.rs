pub mod writer;

pub use writer::{
    WRITER_THREAD_NAME, WriterHandle, WriterOutput, WriterState, WriterStats, spawn_writer,
};
